//! Shared list - an observable, typed list over a collaborative list.
//!
//! Values are stored in the backend as JSON. [`SharedList<T>`] is a typed view
//! over an untyped core; several typed views (see [`SharedList::cast`]) may
//! share one core.

use crate::binding::{Binding, Lifecycle};
use crate::error::{DbError, Result};
use colab_backend::{ListEvent, ListRef, Signal, Subscription};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

/// The kind of a list change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListChangeKind {
    Add,
    Remove,
    Set,
    Move,
}

/// A change to a shared list.
///
/// - `Add`: `new_index` and `new_values` only.
/// - `Remove`: `old_index` and `old_values` only.
/// - `Set`: both indices are equal. Edits report as many old values as new
///   ones, but a rebind that swaps one non-empty list for another reports a
///   single `Set` at index 0 carrying the whole old and new content, so the
///   two lengths may differ.
/// - `Move`: the element at `old_index` now sits at `new_index`;
///   `old_values == new_values`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListChange<T> {
    pub kind: ListChangeKind,
    pub new_index: Option<usize>,
    pub old_index: Option<usize>,
    pub new_values: Vec<T>,
    pub old_values: Vec<T>,
}

impl<T> ListChange<T> {
    pub fn added(index: usize, values: Vec<T>) -> Self {
        Self {
            kind: ListChangeKind::Add,
            new_index: Some(index),
            old_index: None,
            new_values: values,
            old_values: Vec::new(),
        }
    }

    pub fn removed(index: usize, values: Vec<T>) -> Self {
        Self {
            kind: ListChangeKind::Remove,
            new_index: None,
            old_index: Some(index),
            new_values: Vec::new(),
            old_values: values,
        }
    }

    pub fn set(index: usize, old_values: Vec<T>, new_values: Vec<T>) -> Self {
        Self {
            kind: ListChangeKind::Set,
            new_index: Some(index),
            old_index: Some(index),
            new_values,
            old_values,
        }
    }
}

impl<T: Clone> ListChange<T> {
    pub fn moved(from: usize, to: usize, values: Vec<T>) -> Self {
        Self {
            kind: ListChangeKind::Move,
            new_index: Some(to),
            old_index: Some(from),
            new_values: values.clone(),
            old_values: values,
        }
    }
}

impl ListChange<Value> {
    fn from_native(event: &ListEvent) -> Self {
        match event {
            ListEvent::ValuesAdded { index, values } => Self::added(*index, values.clone()),
            ListEvent::ValuesRemoved { index, values } => Self::removed(*index, values.clone()),
            ListEvent::ValuesSet {
                index,
                old_values,
                new_values,
            } => Self::set(*index, old_values.clone(), new_values.clone()),
            ListEvent::ValuesMoved { from, to, values } => Self::moved(*from, *to, values.clone()),
        }
    }

    /// The event a rebind from `old` to `new` content is reported as.
    fn replacement(old: Vec<Value>, new: Vec<Value>) -> Option<Self> {
        if old == new {
            None
        } else if old.is_empty() {
            Some(Self::added(0, new))
        } else if new.is_empty() {
            Some(Self::removed(0, old))
        } else {
            Some(Self::set(0, old, new))
        }
    }

    pub(crate) fn decode<T: DeserializeOwned>(&self) -> std::result::Result<ListChange<T>, serde_json::Error> {
        Ok(ListChange {
            kind: self.kind,
            new_index: self.new_index,
            old_index: self.old_index,
            new_values: decode_all(&self.new_values)?,
            old_values: decode_all(&self.old_values)?,
        })
    }
}

fn decode_all<T: DeserializeOwned>(values: &[Value]) -> std::result::Result<Vec<T>, serde_json::Error> {
    values.iter().cloned().map(serde_json::from_value).collect()
}

fn encode<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

// === Untyped core ===

pub(crate) struct ListCore {
    binding: Mutex<Binding<ListRef>>,
    changed: Signal<ListChange<Value>>,
    lifecycle: Lifecycle,
}

impl ListCore {
    pub(crate) fn new(primitive: ListRef) -> Arc<Self> {
        let changed = Signal::new();
        let subscription = Self::forward(&primitive, &changed);
        Arc::new(Self {
            binding: Mutex::new(Binding::new(primitive, subscription)),
            changed,
            lifecycle: Lifecycle::new("SharedList"),
        })
    }

    fn forward(primitive: &ListRef, changed: &Signal<ListChange<Value>>) -> Subscription {
        let changed = changed.clone();
        primitive.observe(Box::new(move |event: &ListEvent| {
            changed.emit(&ListChange::from_native(event));
        }))
    }

    pub(crate) fn primitive(&self) -> ListRef {
        self.binding.lock().primitive()
    }

    pub(crate) fn changed(&self) -> &Signal<ListChange<Value>> {
        &self.changed
    }

    pub(crate) fn ensure_live(&self) -> Result<()> {
        self.lifecycle.ensure_live()
    }

    pub(crate) fn len(&self) -> usize {
        self.primitive().len()
    }

    pub(crate) fn to_vec(&self) -> Vec<Value> {
        self.primitive().to_vec()
    }

    pub(crate) fn insert_all(&self, index: usize, values: Vec<Value>) -> Result<usize> {
        self.ensure_live()?;
        let primitive = self.primitive();
        let length = primitive.len();
        if index > length {
            return Err(DbError::IndexOutOfBounds { index, length });
        }
        primitive.insert_all(index, values);
        Ok(primitive.len())
    }

    pub(crate) fn set(&self, index: usize, value: Value) -> Result<Value> {
        self.ensure_live()?;
        let primitive = self.primitive();
        primitive
            .set(index, value)
            .ok_or_else(|| DbError::IndexOutOfBounds {
                index,
                length: primitive.len(),
            })
    }

    pub(crate) fn remove_range(&self, start: usize, end: usize) -> Result<Vec<Value>> {
        self.ensure_live()?;
        Ok(self.primitive().remove_range(start, end))
    }

    pub(crate) fn move_item(&self, from: usize, to: usize) -> Result<()> {
        self.ensure_live()?;
        let primitive = self.primitive();
        if primitive.move_item(from, to) {
            Ok(())
        } else {
            Err(DbError::IndexOutOfBounds {
                index: from.max(to),
                length: primitive.len(),
            })
        }
    }

    /// Returns whether the content changed.
    pub(crate) fn rebind(&self, primitive: ListRef) -> Result<bool> {
        self.ensure_live()?;
        let new_values = primitive.to_vec();
        let old = {
            let mut binding = self.binding.lock();
            let subscription = Self::forward(&primitive, &self.changed);
            binding.replace(primitive, subscription)
        };
        debug!(old = old.id(), "shared list rebound");

        match ListChange::replacement(old.to_vec(), new_values) {
            Some(change) => {
                self.changed.emit(&change);
                Ok(true)
            }
            None => Ok(false),
        }
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

/// An observable list of `T` bound to a collaborative list.
pub struct SharedList<T> {
    core: Arc<ListCore>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for SharedList<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> SharedList<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Wrap an existing collaborative list.
    pub fn new(primitive: ListRef) -> Self {
        Self::from_core(ListCore::new(primitive))
    }

    pub(crate) fn from_core(core: Arc<ListCore>) -> Self {
        Self {
            core,
            _marker: PhantomData,
        }
    }

    pub(crate) fn core(&self) -> &Arc<ListCore> {
        &self.core
    }

    /// View the same list with a different element type.
    pub fn cast<U: Serialize + DeserializeOwned>(&self) -> SharedList<U> {
        SharedList::from_core(self.core.clone())
    }

    pub fn primitive(&self) -> ListRef {
        self.core.primitive()
    }

    pub fn len(&self) -> usize {
        self.core.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The element at `index`, or `None` if out of range or undecodable.
    pub fn get(&self, index: usize) -> Option<T> {
        let value = self.primitive().get(index)?;
        match serde_json::from_value(value) {
            Ok(item) => Some(item),
            Err(err) => {
                warn!(index, error = %err, "undecodable list element");
                None
            }
        }
    }

    /// Snapshot of the decodable elements.
    pub fn to_vec(&self) -> Vec<T> {
        self.core
            .to_vec()
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect()
    }

    pub fn iter(&self) -> std::vec::IntoIter<T> {
        self.to_vec().into_iter()
    }

    /// Replace the element at `index`, returning the previous one.
    pub fn set(&self, index: usize, value: &T) -> Result<T> {
        let old = self.core.set(index, encode(value)?)?;
        Ok(serde_json::from_value(old)?)
    }

    /// Append a value; returns the new length.
    pub fn push(&self, value: &T) -> Result<usize> {
        let length = self.len();
        self.insert(length, value)
    }

    /// Insert before `index`; returns the new length.
    pub fn insert(&self, index: usize, value: &T) -> Result<usize> {
        self.core.insert_all(index, vec![encode(value)?])
    }

    pub fn push_all(&self, values: &[T]) -> Result<usize> {
        let length = self.len();
        self.insert_all(length, values)
    }

    /// Insert every value before `index`, in order; returns the new length.
    pub fn insert_all(&self, index: usize, values: &[T]) -> Result<usize> {
        let encoded = values.iter().map(encode).collect::<Result<Vec<_>>>()?;
        self.core.insert_all(index, encoded)
    }

    /// Move one element so that it ends up at index `to`.
    pub fn move_item(&self, from: usize, to: usize) -> Result<()> {
        self.core.move_item(from, to)
    }

    /// Remove the element at `index`. `None` if out of range.
    pub fn remove(&self, index: usize) -> Result<Option<T>> {
        let removed = self.core.remove_range(index, index.saturating_add(1))?;
        match removed.into_iter().next() {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Remove the first element equal to `value`; returns its former index.
    pub fn remove_value(&self, value: &T) -> Result<Option<usize>> {
        self.core.ensure_live()?;
        let needle = encode(value)?;
        let Some(index) = self.core.to_vec().iter().position(|v| *v == needle) else {
            return Ok(None);
        };
        self.core.remove_range(index, index + 1)?;
        Ok(Some(index))
    }

    /// Remove `[start, end)`; returns the new length.
    pub fn remove_range(&self, start: usize, end: usize) -> Result<usize> {
        self.core.remove_range(start, end)?;
        Ok(self.len())
    }

    /// Remove everything as a single `Remove` change.
    pub fn clear(&self) -> Result<()> {
        let length = self.len();
        self.core.remove_range(0, length)?;
        Ok(())
    }

    /// Listen for changes. Changes whose values do not decode as `T` are
    /// skipped.
    pub fn connect(&self, listener: impl Fn(&ListChange<T>) + Send + Sync + 'static) -> Subscription
    where
        T: 'static,
    {
        self.core.changed().connect(move |change| match change.decode::<T>() {
            Ok(typed) => listener(&typed),
            Err(err) => warn!(error = %err, "dropping undecodable list change"),
        })
    }

    /// Bind to a different collaborative list, reporting the content swap as
    /// one change.
    pub fn rebind(&self, primitive: ListRef) -> Result<()> {
        self.core.rebind(primitive).map(|_| ())
    }

    pub fn dispose(&self) {
        self.core.dispose()
    }

    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }
}

impl<T> fmt::Debug for SharedList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedList")
            .field("values", &self.core.to_vec())
            .field("disposed", &self.core.is_disposed())
            .finish()
    }
}
