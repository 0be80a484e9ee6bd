//! Shared map - an observable, typed map over a collaborative map.

use crate::binding::{Binding, Lifecycle};
use crate::error::Result;
use colab_backend::{Entry, MapRef, Signal, Subscription, ValueChanged};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

/// The kind of a map change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MapChangeKind {
    Add,
    Remove,
    Set,
}

/// A change to one key of a shared map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapChange<V> {
    pub kind: MapChangeKind,
    pub key: String,
    pub old_value: Option<V>,
    pub new_value: Option<V>,
}

impl<V> MapChange<V> {
    fn between(key: String, old_value: Option<V>, new_value: Option<V>) -> Self {
        let kind = match (&old_value, &new_value) {
            (None, _) => MapChangeKind::Add,
            (_, None) => MapChangeKind::Remove,
            _ => MapChangeKind::Set,
        };
        Self {
            kind,
            key,
            old_value,
            new_value,
        }
    }
}

impl MapChange<Entry> {
    pub(crate) fn decode<V: DeserializeOwned>(&self) -> std::result::Result<MapChange<V>, String> {
        Ok(MapChange {
            kind: self.kind,
            key: self.key.clone(),
            old_value: self.old_value.as_ref().map(decode_entry).transpose()?,
            new_value: self.new_value.as_ref().map(decode_entry).transpose()?,
        })
    }
}

fn decode_entry<V: DeserializeOwned>(entry: &Entry) -> std::result::Result<V, String> {
    match entry {
        Entry::Json(value) => serde_json::from_value(value.clone()).map_err(|e| e.to_string()),
        other => Err(match other.kind() {
            Some(kind) => format!("{kind} entry is not a plain value"),
            None => "entry is not a plain value".to_string(),
        }),
    }
}

// === Untyped core ===

pub(crate) struct MapCore {
    binding: Mutex<Binding<MapRef>>,
    changed: Signal<MapChange<Entry>>,
    lifecycle: Lifecycle,
}

impl MapCore {
    pub(crate) fn new(primitive: MapRef, what: &'static str) -> Arc<Self> {
        let changed = Signal::new();
        let subscription = Self::forward(&primitive, &changed);
        Arc::new(Self {
            binding: Mutex::new(Binding::new(primitive, subscription)),
            changed,
            lifecycle: Lifecycle::new(what),
        })
    }

    fn forward(primitive: &MapRef, changed: &Signal<MapChange<Entry>>) -> Subscription {
        let changed = changed.clone();
        primitive.observe(Box::new(move |event: &ValueChanged| {
            changed.emit(&MapChange::between(
                event.key.clone(),
                event.old_value.clone(),
                event.new_value.clone(),
            ));
        }))
    }

    pub(crate) fn primitive(&self) -> MapRef {
        self.binding.lock().primitive()
    }

    pub(crate) fn changed(&self) -> &Signal<MapChange<Entry>> {
        &self.changed
    }

    pub(crate) fn ensure_live(&self) -> Result<()> {
        self.lifecycle.ensure_live()
    }

    pub(crate) fn set(&self, key: &str, value: Value) -> Result<Option<Entry>> {
        self.ensure_live()?;
        Ok(self.primitive().set(key, Entry::Json(value)))
    }

    pub(crate) fn delete(&self, key: &str) -> Result<Option<Entry>> {
        self.ensure_live()?;
        Ok(self.primitive().delete(key))
    }

    pub(crate) fn clear(&self) -> Result<()> {
        self.ensure_live()?;
        self.primitive().clear();
        Ok(())
    }

    /// Rebind, emitting one change per key whose entry differs.
    pub(crate) fn rebind(&self, primitive: MapRef) -> Result<()> {
        self.ensure_live()?;
        let new_entries = primitive.entries();
        let old = {
            let mut binding = self.binding.lock();
            let subscription = Self::forward(&primitive, &self.changed);
            binding.replace(primitive, subscription)
        };
        debug!(old = old.id(), "shared map rebound");

        let old_entries = old.entries();
        let lookup = |entries: &[(String, Entry)], key: &str| {
            entries
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, entry)| entry.clone())
        };

        for (key, old_entry) in &old_entries {
            let new_entry = lookup(&new_entries, key);
            if new_entry.as_ref() != Some(old_entry) {
                self.changed.emit(&MapChange::between(
                    key.clone(),
                    Some(old_entry.clone()),
                    new_entry,
                ));
            }
        }
        for (key, new_entry) in &new_entries {
            if lookup(&old_entries, key).is_none() {
                self.changed.emit(&MapChange::between(
                    key.clone(),
                    None,
                    Some(new_entry.clone()),
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn dispose(&self) {
        if self.lifecycle.dispose() {
            self.binding.lock().detach();
            self.changed.disconnect_all();
        }
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.lifecycle.is_disposed()
    }
}

// === Typed facade ===

/// An observable map from string keys to `V`, bound to a collaborative map.
pub struct SharedMap<V> {
    core: Arc<MapCore>,
    _marker: PhantomData<fn() -> V>,
}

impl<V> Clone for SharedMap<V> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            _marker: PhantomData,
        }
    }
}

impl<V> SharedMap<V>
where
    V: Serialize + DeserializeOwned,
{
    /// Wrap an existing collaborative map.
    pub fn new(primitive: MapRef) -> Self {
        Self {
            core: MapCore::new(primitive, "SharedMap"),
            _marker: PhantomData,
        }
    }

    pub fn cast<U: Serialize + DeserializeOwned>(&self) -> SharedMap<U> {
        SharedMap {
            core: self.core.clone(),
            _marker: PhantomData,
        }
    }

    pub fn primitive(&self) -> MapRef {
        self.core.primitive()
    }

    pub fn len(&self) -> usize {
        self.primitive().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has(&self, key: &str) -> bool {
        self.primitive().has(key)
    }

    /// Keys in backend enumeration order.
    pub fn keys(&self) -> Vec<String> {
        self.primitive().keys()
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let entry = self.primitive().get(key)?;
        match decode_entry(&entry) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, error = %err, "undecodable map value");
                None
            }
        }
    }

    pub fn values(&self) -> Vec<V> {
        self.entries().into_iter().map(|(_, value)| value).collect()
    }

    /// Decodable entries, in key order.
    pub fn entries(&self) -> Vec<(String, V)> {
        self.primitive()
            .entries()
            .into_iter()
            .filter_map(|(key, entry)| decode_entry(&entry).ok().map(|value| (key, value)))
            .collect()
    }

    /// Set `key`, returning the previous value.
    pub fn set(&self, key: &str, value: &V) -> Result<Option<V>> {
        let old = self.core.set(key, serde_json::to_value(value)?)?;
        Ok(old.and_then(|entry| decode_entry(&entry).ok()))
    }

    /// Delete `key`, returning the removed value.
    pub fn delete(&self, key: &str) -> Result<Option<V>> {
        let old = self.core.delete(key)?;
        Ok(old.and_then(|entry| decode_entry(&entry).ok()))
    }

    /// Remove every key; each removal is reported separately.
    pub fn clear(&self) -> Result<()> {
        self.core.clear()
    }

    pub fn connect(&self, listener: impl Fn(&MapChange<V>) + Send + Sync + 'static) -> Subscription
    where
        V: 'static,
    {
        self.core.changed().connect(move |change| match change.decode::<V>() {
            Ok(typed) => listener(&typed),
            Err(err) => warn!(key = %change.key, error = %err, "dropping undecodable map change"),
        })
    }

    pub fn rebind(&self, primitive: MapRef) -> Result<()> {
        self.core.rebind(primitive)
    }

    pub fn dispose(&self) {
        self.core.dispose()
    }

    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }
}

impl<V> fmt::Debug for SharedMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedMap")
            .field("keys", &self.core.primitive().keys())
            .field("disposed", &self.core.is_disposed())
            .finish()
    }
}
