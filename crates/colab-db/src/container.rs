//! The container capability shared by every model type.

use crate::error::{DbError, Result};
use crate::list::ListChange;
use crate::map::{MapChange, SharedMap};
use crate::string::{SharedString, StringChange};
use crate::undo::UndoableSharedList;
use crate::value::{SharedValue, ValueChange};
use colab_backend::{DocumentRef, Entry, PrimitiveKind, Subscription};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The type of a container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerType {
    String,
    List,
    Map,
    Value,
}

impl ContainerType {
    /// The backend primitive a container of this type wraps.
    pub fn primitive_kind(&self) -> PrimitiveKind {
        match self {
            ContainerType::String => PrimitiveKind::String,
            ContainerType::List => PrimitiveKind::List,
            ContainerType::Map | ContainerType::Value => PrimitiveKind::Map,
        }
    }
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerType::String => write!(f, "String"),
            ContainerType::List => write!(f, "List"),
            ContainerType::Map => write!(f, "Map"),
            ContainerType::Value => write!(f, "Value"),
        }
    }
}

/// A change reported by any container.
#[derive(Clone, Debug, PartialEq)]
pub enum ContainerChange {
    String(StringChange),
    List(ListChange<Value>),
    Map(MapChange<Value>),
    Value(ValueChange),
}

/// A container registered in a model database.
#[derive(Clone, Debug)]
pub enum Container {
    String(SharedString),
    List(UndoableSharedList<Value>),
    Map(SharedMap<Value>),
    Value(SharedValue),
}

fn entry_kind(entry: &Entry) -> String {
    entry
        .kind()
        .map(|kind| kind.to_string())
        .unwrap_or_else(|| "Json".to_string())
}

impl Container {
    /// A new, empty container whose primitive comes from `document`.
    pub(crate) fn fresh(
        document: &DocumentRef,
        container_type: ContainerType,
        max_undo_levels: usize,
    ) -> Self {
        match container_type {
            ContainerType::String => Container::String(SharedString::new(document.create_string(""))),
            ContainerType::List => Container::List(UndoableSharedList::with_max_undo_levels(
                document.create_list(Vec::new()),
                max_undo_levels,
            )),
            ContainerType::Map => Container::Map(SharedMap::new(document.create_map())),
            ContainerType::Value => Container::Value(SharedValue::new(document.create_map())),
        }
    }

    /// Wrap an existing root entry as a container of `container_type`.
    pub(crate) fn from_entry(
        path: &str,
        entry: Entry,
        container_type: ContainerType,
        max_undo_levels: usize,
    ) -> Result<Self> {
        match (container_type, entry) {
            (ContainerType::String, Entry::String(s)) => Ok(Container::String(SharedString::new(s))),
            (ContainerType::List, Entry::List(l)) => Ok(Container::List(
                UndoableSharedList::with_max_undo_levels(l, max_undo_levels),
            )),
            (ContainerType::Map, Entry::Map(m)) => Ok(Container::Map(SharedMap::new(m))),
            (ContainerType::Value, Entry::Map(m)) => Ok(Container::Value(SharedValue::new(m))),
            (expected, entry) => Err(DbError::TypeMismatch {
                path: path.to_string(),
                expected: expected.to_string(),
                found: entry_kind(&entry),
            }),
        }
    }

    pub fn container_type(&self) -> ContainerType {
        match self {
            Container::String(_) => ContainerType::String,
            Container::List(_) => ContainerType::List,
            Container::Map(_) => ContainerType::Map,
            Container::Value(_) => ContainerType::Value,
        }
    }

    /// The wrapped primitive as a root entry.
    pub fn entry(&self) -> Entry {
        match self {
            Container::String(s) => Entry::String(s.primitive()),
            Container::List(l) => Entry::List(l.primitive()),
            Container::Map(m) => Entry::Map(m.primitive()),
            Container::Value(v) => Entry::Map(v.primitive()),
        }
    }

    /// A fresh primitive from `document` holding this container's content.
    pub(crate) fn materialize(&self, document: &DocumentRef) -> Entry {
        match self {
            Container::String(s) => Entry::String(document.create_string(&s.text())),
            Container::List(l) => Entry::List(document.create_list(l.to_vec())),
            Container::Map(m) => {
                let map = document.create_map();
                for (key, entry) in m.primitive().entries() {
                    map.set(&key, entry);
                }
                Entry::Map(map)
            }
            Container::Value(v) => {
                let map = document.create_map();
                let value = v.get();
                if !value.is_null() {
                    map.set("value", Entry::Json(value));
                }
                Entry::Map(map)
            }
        }
    }

    /// Rebind to `entry`, which must hold a primitive of the matching kind.
    pub(crate) fn rebind(&self, path: &str, entry: Entry) -> Result<()> {
        let mismatch = |entry: &Entry| DbError::TypeMismatch {
            path: path.to_string(),
            expected: self.container_type().to_string(),
            found: entry_kind(entry),
        };
        match (self, entry) {
            (Container::String(s), Entry::String(p)) => s.rebind(p),
            (Container::List(l), Entry::List(p)) => l.rebind(p),
            (Container::Map(m), Entry::Map(p)) => m.rebind(p),
            (Container::Value(v), Entry::Map(p)) => v.rebind(p),
            (_, entry) => Err(mismatch(&entry)),
        }
    }

    /// Listen for changes of whatever kind this container reports.
    pub fn connect(&self, listener: impl Fn(&ContainerChange) + Send + Sync + 'static) -> Subscription {
        match self {
            Container::String(s) => s.connect(move |c| listener(&ContainerChange::String(c.clone()))),
            Container::List(l) => l.connect(move |c| listener(&ContainerChange::List(c.clone()))),
            Container::Map(m) => m.connect(move |c| listener(&ContainerChange::Map(c.clone()))),
            Container::Value(v) => v.connect(move |c| listener(&ContainerChange::Value(c.clone()))),
        }
    }

    pub fn as_string(&self) -> Option<&SharedString> {
        match self {
            Container::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&UndoableSharedList<Value>> {
        match self {
            Container::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&SharedMap<Value>> {
        match self {
            Container::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&SharedValue> {
        match self {
            Container::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn dispose(&self) {
        match self {
            Container::String(s) => s.dispose(),
            Container::List(l) => l.dispose(),
            Container::Map(m) => m.dispose(),
            Container::Value(v) => v.dispose(),
        }
    }

    pub fn is_disposed(&self) -> bool {
        match self {
            Container::String(s) => s.is_disposed(),
            Container::List(l) => l.is_disposed(),
            Container::Map(m) => m.is_disposed(),
            Container::Value(v) => v.is_disposed(),
        }
    }
}
