//! In-memory realtime backend.
//!
//! Documents live in a [`MemoryBackend`] keyed by path. Every load opens a new
//! session on the shared document, so two loaders over one backend behave like
//! two remote collaborators: a mutation made through one session's handles is
//! reported to listeners registered through the other.

use crate::collaborator::{Collaborator, CollaboratorEvent, UserProfile};
use crate::error::{BackendError, Result};
use crate::primitive::{
    CollaborativeList, CollaborativeMap, CollaborativeString, DocumentLoader, DocumentRef, Entry,
    ListEvent, ListRef, Listener, MapRef, Primitive, PrimitiveKind, RealtimeDocument, StringRef,
    TextEvent, ValueChanged,
};
use crate::signal::{Signal, Subscription};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use ulid::Ulid;

fn new_id() -> String {
    Ulid::new().to_string()
}

// === Primitives ===

/// In-memory collaborative string.
#[derive(Debug)]
pub struct MemoryString {
    id: String,
    chars: Mutex<Vec<char>>,
    signal: Signal<TextEvent>,
}

impl MemoryString {
    pub fn new(initial: &str) -> Self {
        Self {
            id: new_id(),
            chars: Mutex::new(initial.chars().collect()),
            signal: Signal::new(),
        }
    }
}

impl Primitive for MemoryString {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::String
    }
}

impl CollaborativeString for MemoryString {
    fn text(&self) -> String {
        self.chars.lock().iter().collect()
    }

    fn len(&self) -> usize {
        self.chars.lock().len()
    }

    fn set_text(&self, text: &str) {
        let old_text: String = {
            let mut chars = self.chars.lock();
            let old = chars.iter().collect();
            *chars = text.chars().collect();
            old
        };
        self.signal.emit(&TextEvent::Replaced {
            old_text,
            new_text: text.to_string(),
        });
    }

    fn insert_string(&self, index: usize, text: &str) {
        if text.is_empty() {
            return;
        }
        let index = {
            let mut chars = self.chars.lock();
            let index = index.min(chars.len());
            chars.splice(index..index, text.chars());
            index
        };
        self.signal.emit(&TextEvent::Inserted {
            index,
            text: text.to_string(),
        });
    }

    fn remove_range(&self, start: usize, end: usize) {
        let removed: String = {
            let mut chars = self.chars.lock();
            let end = end.min(chars.len());
            if start >= end {
                return;
            }
            chars.drain(start..end).collect()
        };
        self.signal.emit(&TextEvent::Deleted {
            index: start,
            text: removed,
        });
    }

    fn observe(&self, listener: Listener<TextEvent>) -> Subscription {
        self.signal.connect(listener)
    }
}

/// In-memory collaborative list.
#[derive(Debug)]
pub struct MemoryList {
    id: String,
    values: Mutex<Vec<Value>>,
    signal: Signal<ListEvent>,
}

impl MemoryList {
    pub fn new(initial: Vec<Value>) -> Self {
        Self {
            id: new_id(),
            values: Mutex::new(initial),
            signal: Signal::new(),
        }
    }
}

impl Primitive for MemoryList {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::List
    }
}

impl CollaborativeList for MemoryList {
    fn len(&self) -> usize {
        self.values.lock().len()
    }

    fn get(&self, index: usize) -> Option<Value> {
        self.values.lock().get(index).cloned()
    }

    fn to_vec(&self) -> Vec<Value> {
        self.values.lock().clone()
    }

    fn insert_all(&self, index: usize, values: Vec<Value>) {
        if values.is_empty() {
            return;
        }
        let index = {
            let mut list = self.values.lock();
            let index = index.min(list.len());
            list.splice(index..index, values.iter().cloned());
            index
        };
        self.signal.emit(&ListEvent::ValuesAdded { index, values });
    }

    fn set(&self, index: usize, value: Value) -> Option<Value> {
        let old = {
            let mut list = self.values.lock();
            let slot = list.get_mut(index)?;
            std::mem::replace(slot, value.clone())
        };
        self.signal.emit(&ListEvent::ValuesSet {
            index,
            old_values: vec![old.clone()],
            new_values: vec![value],
        });
        Some(old)
    }

    fn remove_range(&self, start: usize, end: usize) -> Vec<Value> {
        let removed: Vec<Value> = {
            let mut list = self.values.lock();
            let end = end.min(list.len());
            if start >= end {
                return Vec::new();
            }
            list.drain(start..end).collect()
        };
        self.signal.emit(&ListEvent::ValuesRemoved {
            index: start,
            values: removed.clone(),
        });
        removed
    }

    fn move_item(&self, from: usize, to: usize) -> bool {
        let moved = {
            let mut list = self.values.lock();
            if from >= list.len() || to >= list.len() {
                return false;
            }
            if from == to {
                return true;
            }
            let value = list.remove(from);
            list.insert(to, value.clone());
            value
        };
        self.signal.emit(&ListEvent::ValuesMoved {
            from,
            to,
            values: vec![moved],
        });
        true
    }

    fn observe(&self, listener: Listener<ListEvent>) -> Subscription {
        self.signal.connect(listener)
    }
}

/// In-memory collaborative map. Keys keep their insertion order.
#[derive(Debug)]
pub struct MemoryMap {
    id: String,
    entries: Mutex<Vec<(String, Entry)>>,
    signal: Signal<ValueChanged>,
}

impl MemoryMap {
    pub fn new() -> Self {
        Self {
            id: new_id(),
            entries: Mutex::new(Vec::new()),
            signal: Signal::new(),
        }
    }
}

impl Default for MemoryMap {
    fn default() -> Self {
        Self::new()
    }
}

impl Primitive for MemoryMap {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Map
    }
}

impl CollaborativeMap for MemoryMap {
    fn len(&self) -> usize {
        self.entries.lock().len()
    }

    fn get(&self, key: &str) -> Option<Entry> {
        self.entries
            .lock()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    fn keys(&self) -> Vec<String> {
        self.entries.lock().iter().map(|(k, _)| k.clone()).collect()
    }

    fn entries(&self) -> Vec<(String, Entry)> {
        self.entries.lock().clone()
    }

    fn set(&self, key: &str, entry: Entry) -> Option<Entry> {
        let old = {
            let mut entries = self.entries.lock();
            match entries.iter_mut().find(|(k, _)| k == key) {
                Some((_, slot)) => Some(std::mem::replace(slot, entry.clone())),
                None => {
                    entries.push((key.to_string(), entry.clone()));
                    None
                }
            }
        };
        self.signal.emit(&ValueChanged {
            key: key.to_string(),
            old_value: old.clone(),
            new_value: Some(entry),
        });
        old
    }

    fn delete(&self, key: &str) -> Option<Entry> {
        let old = {
            let mut entries = self.entries.lock();
            let position = entries.iter().position(|(k, _)| k == key)?;
            entries.remove(position).1
        };
        self.signal.emit(&ValueChanged {
            key: key.to_string(),
            old_value: Some(old.clone()),
            new_value: None,
        });
        Some(old)
    }

    fn clear(&self) {
        for key in self.keys() {
            self.delete(&key);
        }
    }

    fn observe(&self, listener: Listener<ValueChanged>) -> Subscription {
        self.signal.connect(listener)
    }
}

// === Documents ===

#[derive(Debug)]
struct DocumentState {
    path: String,
    root: Arc<MemoryMap>,
    sessions: Mutex<Vec<Collaborator>>,
    collaborator_events: Signal<CollaboratorEvent>,
}

impl DocumentState {
    fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            root: Arc::new(MemoryMap::new()),
            sessions: Mutex::new(Vec::new()),
            collaborator_events: Signal::new(),
        }
    }

    fn join(self: &Arc<Self>, profile: &UserProfile) -> MemoryDocument {
        let local = Collaborator::for_session(profile);
        self.sessions.lock().push(local.clone());
        debug!(path = %self.path, session = %local.session_id, "collaborator joined");
        self.collaborator_events
            .emit(&CollaboratorEvent::Joined(local.clone()));

        MemoryDocument {
            state: self.clone(),
            local,
            closed: AtomicBool::new(false),
        }
    }
}

/// One session on an in-memory document.
#[derive(Debug)]
pub struct MemoryDocument {
    state: Arc<DocumentState>,
    local: Collaborator,
    closed: AtomicBool,
}

impl RealtimeDocument for MemoryDocument {
    fn path(&self) -> &str {
        &self.state.path
    }

    fn root(&self) -> MapRef {
        self.state.root.clone()
    }

    fn create_string(&self, initial: &str) -> StringRef {
        Arc::new(MemoryString::new(initial))
    }

    fn create_list(&self, initial: Vec<Value>) -> ListRef {
        Arc::new(MemoryList::new(initial))
    }

    fn create_map(&self) -> MapRef {
        Arc::new(MemoryMap::new())
    }

    fn local_collaborator(&self) -> Collaborator {
        self.local.clone()
    }

    fn collaborators(&self) -> Vec<Collaborator> {
        self.state.sessions.lock().clone()
    }

    fn observe_collaborators(&self, listener: Listener<CollaboratorEvent>) -> Subscription {
        self.state.collaborator_events.connect(listener)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.state
            .sessions
            .lock()
            .retain(|c| c.session_id != self.local.session_id);
        debug!(path = %self.state.path, session = %self.local.session_id, "collaborator left");
        self.state
            .collaborator_events
            .emit(&CollaboratorEvent::Left(self.local.clone()));
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// A standalone document that is not shared with anyone.
///
/// Used to back containers before the real document has been loaded.
pub fn new_in_memory_document() -> DocumentRef {
    let state = Arc::new(DocumentState::new(""));
    Arc::new(state.join(&UserProfile::anonymous()))
}

// === Backend ===

#[derive(Debug, Default)]
struct BackendInner {
    documents: Mutex<HashMap<String, Arc<DocumentState>>>,
    failures: Mutex<HashMap<String, String>>,
    offline: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

/// An in-process realtime service.
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    inner: Arc<BackendInner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every load by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.inner.latency.lock() = Some(latency);
        self
    }

    /// Make loads of `path` fail with `reason`.
    pub fn fail_loads(&self, path: impl Into<String>, reason: impl Into<String>) {
        self.inner.failures.lock().insert(path.into(), reason.into());
    }

    pub fn clear_failure(&self, path: &str) {
        self.inner.failures.lock().remove(path);
    }

    /// Simulate the whole service being unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Open a new session on the document at `path`, creating it if needed.
    pub fn open(&self, path: &str, profile: &UserProfile) -> Result<DocumentRef> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable(
                "realtime service is offline".to_string(),
            ));
        }
        if let Some(reason) = self.inner.failures.lock().get(path) {
            return Err(BackendError::LoadFailed {
                path: path.to_string(),
                reason: reason.clone(),
            });
        }

        let state = self
            .inner
            .documents
            .lock()
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(DocumentState::new(path)))
            .clone();
        Ok(Arc::new(state.join(profile)))
    }

    /// A loader that opens sessions as `profile`.
    pub fn loader(&self, profile: UserProfile) -> MemoryLoader {
        MemoryLoader {
            backend: self.clone(),
            profile,
        }
    }

    pub fn has_document(&self, path: &str) -> bool {
        self.inner.documents.lock().contains_key(path)
    }

    /// Number of open sessions on a document.
    pub fn session_count(&self, path: &str) -> usize {
        self.inner
            .documents
            .lock()
            .get(path)
            .map(|state| state.sessions.lock().len())
            .unwrap_or(0)
    }

    fn latency(&self) -> Option<Duration> {
        *self.inner.latency.lock()
    }
}

/// [`DocumentLoader`] over a [`MemoryBackend`].
#[derive(Clone, Debug)]
pub struct MemoryLoader {
    backend: MemoryBackend,
    profile: UserProfile,
}

impl MemoryLoader {
    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }
}

#[async_trait]
impl DocumentLoader for MemoryLoader {
    async fn load(&self, path: &str) -> Result<DocumentRef> {
        if let Some(latency) = self.backend.latency() {
            tokio::time::sleep(latency).await;
        }
        self.backend.open(path, &self.profile)
    }
}
