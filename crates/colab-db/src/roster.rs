//! Collaborator roster - the synchronized set of sessions on a document.
//!
//! Stored in the document root as a map keyed by session id, kept in step
//! with the backend's joined/left notifications.

use crate::error::Result;
use crate::map::{MapChange, SharedMap};
use colab_backend::{
    Collaborator, CollaboratorEvent, DocumentRef, Entry, MapRef, Subscription,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Root key the roster is stored under.
pub const ROSTER_KEY: &str = "collaborators:map";

struct RosterInner {
    map: SharedMap<Collaborator>,
    local: Collaborator,
    presence: Mutex<Option<Subscription>>,
}

/// Every collaborator currently attached to a document, local session first.
#[derive(Clone)]
pub struct CollaboratorRoster {
    inner: Arc<RosterInner>,
}

impl CollaboratorRoster {
    /// Attach to (or create) the roster of `document` and register the local
    /// session in it.
    pub fn attach(document: &DocumentRef) -> Result<Self> {
        let map = SharedMap::new(Self::roster_map(document));
        let local = document.local_collaborator();
        map.set(&local.session_id, &local)?;

        let present = document.collaborators();
        for collaborator in &present {
            if !map.has(&collaborator.session_id) {
                map.set(&collaborator.session_id, collaborator)?;
            }
        }
        let live: HashSet<&str> = present.iter().map(|c| c.session_id.as_str()).collect();
        for key in map.keys() {
            if key != local.session_id && !live.contains(key.as_str()) {
                debug!(session = %key, "pruning stale collaborator");
                map.delete(&key)?;
            }
        }

        let follower = map.clone();
        let presence = document.observe_collaborators(Box::new(move |event: &CollaboratorEvent| {
            let result = match event {
                CollaboratorEvent::Joined(c) => follower.set(&c.session_id, c).map(|_| ()),
                CollaboratorEvent::Left(c) => follower.delete(&c.session_id).map(|_| ()),
            };
            if let Err(err) = result {
                debug!(error = %err, "ignoring presence event");
            }
        }));

        Ok(Self {
            inner: Arc::new(RosterInner {
                map,
                local,
                presence: Mutex::new(Some(presence)),
            }),
        })
    }

    fn roster_map(document: &DocumentRef) -> MapRef {
        let root = document.root();
        if let Some(Entry::Map(existing)) = root.get(ROSTER_KEY) {
            return existing;
        }
        let map = document.create_map();
        root.set(ROSTER_KEY, Entry::Map(map.clone()));
        map
    }

    /// The local session.
    pub fn local(&self) -> &Collaborator {
        &self.inner.local
    }

    pub fn len(&self) -> usize {
        self.inner.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.map.is_empty()
    }

    pub fn has(&self, session_id: &str) -> bool {
        self.inner.map.has(session_id)
    }

    pub fn get(&self, session_id: &str) -> Option<Collaborator> {
        self.inner.map.get(session_id)
    }

    /// Session ids, local session first.
    pub fn keys(&self) -> Vec<String> {
        let local = &self.inner.local.session_id;
        let mut keys = self.inner.map.keys();
        if let Some(position) = keys.iter().position(|k| k == local) {
            let key = keys.remove(position);
            keys.insert(0, key);
        }
        keys
    }

    /// Collaborators, local session first.
    pub fn values(&self) -> Vec<Collaborator> {
        let local = &self.inner.local.session_id;
        let (mut ordered, others): (Vec<_>, Vec<_>) = self
            .inner
            .map
            .values()
            .into_iter()
            .partition(|c| &c.session_id == local);
        ordered.extend(others);
        ordered
    }

    pub fn set(&self, session_id: &str, collaborator: &Collaborator) -> Result<Option<Collaborator>> {
        self.inner.map.set(session_id, collaborator)
    }

    pub fn delete(&self, session_id: &str) -> Result<Option<Collaborator>> {
        self.inner.map.delete(session_id)
    }

    /// Remove every collaborator except the local session.
    pub fn clear(&self) -> Result<()> {
        for key in self.inner.map.keys() {
            if key != self.inner.local.session_id {
                self.inner.map.delete(&key)?;
            }
        }
        Ok(())
    }

    pub fn connect(
        &self,
        listener: impl Fn(&MapChange<Collaborator>) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.map.connect(listener)
    }

    pub fn dispose(&self) {
        self.inner.presence.lock().take();
        self.inner.map.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.map.is_disposed()
    }
}

impl fmt::Debug for CollaboratorRoster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollaboratorRoster")
            .field("local", &self.inner.local.session_id)
            .field("sessions", &self.keys())
            .finish()
    }
}
