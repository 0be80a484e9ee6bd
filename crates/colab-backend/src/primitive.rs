//! Collaborative primitive capabilities.
//!
//! The realtime service is treated as opaque: it hands out collaborative
//! strings, lists and maps that are already consistent across sessions, and
//! reports every mutation (local or remote) through a native event. These
//! traits are the whole surface the model database relies on.

use crate::collaborator::{Collaborator, CollaboratorEvent};
use crate::error::Result;
use crate::signal::Subscription;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

pub type StringRef = Arc<dyn CollaborativeString>;
pub type ListRef = Arc<dyn CollaborativeList>;
pub type MapRef = Arc<dyn CollaborativeMap>;
pub type DocumentRef = Arc<dyn RealtimeDocument>;

/// Listener invoked synchronously for each native event.
pub type Listener<E> = Box<dyn Fn(&E) + Send + Sync>;

/// The kind of a collaborative primitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveKind {
    String,
    List,
    Map,
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveKind::String => write!(f, "String"),
            PrimitiveKind::List => write!(f, "List"),
            PrimitiveKind::Map => write!(f, "Map"),
        }
    }
}

/// Native event of a collaborative string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TextEvent {
    Inserted { index: usize, text: String },
    Deleted { index: usize, text: String },
    Replaced { old_text: String, new_text: String },
}

/// Native event of a collaborative list.
#[derive(Clone, Debug, PartialEq)]
pub enum ListEvent {
    ValuesAdded { index: usize, values: Vec<Value> },
    ValuesRemoved { index: usize, values: Vec<Value> },
    ValuesSet {
        index: usize,
        old_values: Vec<Value>,
        new_values: Vec<Value>,
    },
    /// One element moved so that it now sits at `to`.
    ValuesMoved {
        from: usize,
        to: usize,
        values: Vec<Value>,
    },
}

/// Native event of a collaborative map.
#[derive(Clone, Debug, PartialEq)]
pub struct ValueChanged {
    pub key: String,
    pub old_value: Option<Entry>,
    pub new_value: Option<Entry>,
}

/// A value stored in a collaborative map: plain JSON or a nested primitive.
#[derive(Clone, Debug)]
pub enum Entry {
    Json(Value),
    String(StringRef),
    List(ListRef),
    Map(MapRef),
}

impl Entry {
    /// The primitive kind, or `None` for plain JSON.
    pub fn kind(&self) -> Option<PrimitiveKind> {
        match self {
            Entry::Json(_) => None,
            Entry::String(_) => Some(PrimitiveKind::String),
            Entry::List(_) => Some(PrimitiveKind::List),
            Entry::Map(_) => Some(PrimitiveKind::Map),
        }
    }

    /// The primitive id, or `None` for plain JSON.
    pub fn primitive_id(&self) -> Option<&str> {
        match self {
            Entry::Json(_) => None,
            Entry::String(s) => Some(s.id()),
            Entry::List(l) => Some(l.id()),
            Entry::Map(m) => Some(m.id()),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Entry::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&StringRef> {
        match self {
            Entry::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListRef> {
        match self {
            Entry::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapRef> {
        match self {
            Entry::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl PartialEq for Entry {
    /// JSON compares structurally; primitives compare by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Entry::Json(a), Entry::Json(b)) => a == b,
            _ => self.kind() == other.kind() && self.primitive_id() == other.primitive_id(),
        }
    }
}

impl From<Value> for Entry {
    fn from(value: Value) -> Self {
        Entry::Json(value)
    }
}

/// Common surface of every collaborative primitive.
pub trait Primitive: Send + Sync + fmt::Debug {
    /// Identifier unique within the document.
    fn id(&self) -> &str;

    fn kind(&self) -> PrimitiveKind;
}

/// A collaborative string. Indices are character offsets.
pub trait CollaborativeString: Primitive {
    fn text(&self) -> String;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the whole text.
    fn set_text(&self, text: &str);

    /// Insert at `index` (clamped to the end).
    fn insert_string(&self, index: usize, text: &str);

    /// Remove `[start, end)` (clamped; empty ranges are ignored).
    fn remove_range(&self, start: usize, end: usize);

    fn observe(&self, listener: Listener<TextEvent>) -> Subscription;
}

/// A collaborative list of JSON values.
pub trait CollaborativeList: Primitive {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize) -> Option<Value>;

    fn to_vec(&self) -> Vec<Value>;

    /// Insert `values` before `index` (clamped to the end).
    fn insert_all(&self, index: usize, values: Vec<Value>);

    /// Replace the value at `index`, returning the old one.
    fn set(&self, index: usize, value: Value) -> Option<Value>;

    /// Remove `[start, end)` and return the removed values.
    fn remove_range(&self, start: usize, end: usize) -> Vec<Value>;

    /// Move the element at `from` so that it ends up at `to`.
    /// Returns false if either index is out of range.
    fn move_item(&self, from: usize, to: usize) -> bool;

    fn observe(&self, listener: Listener<ListEvent>) -> Subscription;
}

/// A collaborative map with string keys, in insertion order.
pub trait CollaborativeMap: Primitive {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, key: &str) -> Option<Entry>;

    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn keys(&self) -> Vec<String>;

    fn entries(&self) -> Vec<(String, Entry)>;

    /// Set a key, returning the previous entry.
    fn set(&self, key: &str, entry: Entry) -> Option<Entry>;

    /// Delete a key, returning the removed entry.
    fn delete(&self, key: &str) -> Option<Entry>;

    /// Remove every key; each removal is reported separately.
    fn clear(&self);

    fn observe(&self, listener: Listener<ValueChanged>) -> Subscription;
}

/// An open session on a shared realtime document.
pub trait RealtimeDocument: Send + Sync + fmt::Debug {
    /// The file path this document was loaded for.
    fn path(&self) -> &str;

    /// The root map every model is stored under.
    fn root(&self) -> MapRef;

    fn create_string(&self, initial: &str) -> StringRef;

    fn create_list(&self, initial: Vec<Value>) -> ListRef;

    fn create_map(&self) -> MapRef;

    /// The session this handle belongs to.
    fn local_collaborator(&self) -> Collaborator;

    /// Every session currently attached, including the local one.
    fn collaborators(&self) -> Vec<Collaborator>;

    fn observe_collaborators(&self, listener: Listener<CollaboratorEvent>) -> Subscription;

    /// Leave the document. Further calls on the handle have no effect on
    /// other sessions.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Loads (or creates) the realtime document backing a file.
#[async_trait]
pub trait DocumentLoader: Send + Sync + 'static {
    async fn load(&self, path: &str) -> Result<DocumentRef>;
}

#[async_trait]
impl<F, Fut> DocumentLoader for F
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<DocumentRef>> + Send + 'static,
{
    async fn load(&self, path: &str) -> Result<DocumentRef> {
        (self)(path.to_string()).await
    }
}
