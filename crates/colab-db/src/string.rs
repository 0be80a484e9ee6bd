//! Shared string - an observable string over a collaborative string.

use crate::binding::{Binding, Lifecycle};
use crate::error::Result;
use colab_backend::{Signal, StringRef, Subscription, TextEvent};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// The kind of a string change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StringChangeKind {
    Insert,
    Remove,
    /// Whole-text replacement.
    Set,
}

/// A change to a shared string. `start..end` is the affected range, in
/// characters; for `Remove` it is the range the removed text occupied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringChange {
    pub kind: StringChangeKind,
    pub start: usize,
    pub end: usize,
    pub value: String,
}

impl StringChange {
    fn from_native(event: &TextEvent) -> Self {
        match event {
            TextEvent::Inserted { index, text } => Self {
                kind: StringChangeKind::Insert,
                start: *index,
                end: index + text.chars().count(),
                value: text.clone(),
            },
            TextEvent::Deleted { index, text } => Self {
                kind: StringChangeKind::Remove,
                start: *index,
                end: index + text.chars().count(),
                value: text.clone(),
            },
            TextEvent::Replaced { new_text, .. } => Self::replaced(new_text),
        }
    }

    fn replaced(new_text: &str) -> Self {
        Self {
            kind: StringChangeKind::Set,
            start: 0,
            end: new_text.chars().count(),
            value: new_text.to_string(),
        }
    }
}

struct StringInner {
    binding: Mutex<Binding<StringRef>>,
    changed: Signal<StringChange>,
    lifecycle: Lifecycle,
}

/// An observable string bound to a collaborative string.
///
/// Local edits and edits made by other collaborators are both reported
/// through [`SharedString::connect`].
#[derive(Clone)]
pub struct SharedString {
    inner: Arc<StringInner>,
}

impl SharedString {
    /// Wrap an existing collaborative string.
    pub fn new(primitive: StringRef) -> Self {
        let changed = Signal::new();
        let subscription = Self::forward(&primitive, &changed);
        Self {
            inner: Arc::new(StringInner {
                binding: Mutex::new(Binding::new(primitive, subscription)),
                changed,
                lifecycle: Lifecycle::new("SharedString"),
            }),
        }
    }

    fn forward(primitive: &StringRef, changed: &Signal<StringChange>) -> Subscription {
        let changed = changed.clone();
        primitive.observe(Box::new(move |event: &TextEvent| {
            changed.emit(&StringChange::from_native(event));
        }))
    }

    /// The collaborative string currently wrapped.
    pub fn primitive(&self) -> StringRef {
        self.inner.binding.lock().primitive()
    }

    pub fn text(&self) -> String {
        self.primitive().text()
    }

    pub fn len(&self) -> usize {
        self.primitive().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the whole text.
    pub fn set_text(&self, text: &str) -> Result<()> {
        self.inner.lifecycle.ensure_live()?;
        self.primitive().set_text(text);
        Ok(())
    }

    /// Insert `text` at character `index`.
    pub fn insert(&self, index: usize, text: &str) -> Result<()> {
        self.inner.lifecycle.ensure_live()?;
        self.primitive().insert_string(index, text);
        Ok(())
    }

    /// Remove the characters in `start..end`.
    pub fn remove(&self, start: usize, end: usize) -> Result<()> {
        self.inner.lifecycle.ensure_live()?;
        self.primitive().remove_range(start, end);
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.set_text("")
    }

    /// Listen for changes.
    pub fn connect(&self, listener: impl Fn(&StringChange) + Send + Sync + 'static) -> Subscription {
        self.inner.changed.connect(listener)
    }

    /// Bind to a different collaborative string.
    ///
    /// Emits a single `Set` change if the text differs, nothing otherwise.
    pub fn rebind(&self, primitive: StringRef) -> Result<()> {
        self.inner.lifecycle.ensure_live()?;
        let new_text = primitive.text();
        let old = {
            let mut binding = self.inner.binding.lock();
            let subscription = Self::forward(&primitive, &self.inner.changed);
            binding.replace(primitive, subscription)
        };
        debug!(old = old.id(), "shared string rebound");

        if old.text() != new_text {
            self.inner.changed.emit(&StringChange::replaced(&new_text));
        }
        Ok(())
    }

    pub fn dispose(&self) {
        if self.inner.lifecycle.dispose() {
            self.inner.binding.lock().detach();
            self.inner.changed.disconnect_all();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.lifecycle.is_disposed()
    }
}

impl fmt::Debug for SharedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedString")
            .field("text", &self.text())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
