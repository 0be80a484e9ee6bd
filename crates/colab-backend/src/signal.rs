//! Synchronous signals with RAII subscriptions.
//!
//! A [`Signal`] delivers every emitted event to its connected listeners before
//! `emit` returns. Connecting yields a [`Subscription`]; dropping (or
//! detaching) the subscription disconnects the listener. Listeners are invoked
//! without any internal lock held, so a listener may freely read from or mutate
//! the object that emitted the event.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type Slot<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct SignalInner<E> {
    next_id: AtomicU64,
    slots: Mutex<Vec<(u64, Slot<E>)>>,
}

/// A multi-listener, synchronous event source.
///
/// Cloning a signal yields another handle to the same listener set.
pub struct Signal<E> {
    inner: Arc<SignalInner<E>>,
}

impl<E: 'static> Signal<E> {
    /// Create a signal with no listeners.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SignalInner {
                next_id: AtomicU64::new(1),
                slots: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Connect a listener. The listener stays connected while the returned
    /// subscription is alive.
    pub fn connect(&self, listener: impl Fn(&E) + Send + Sync + 'static) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.slots.lock().push((id, Arc::new(listener)));

        let weak: Weak<SignalInner<E>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.slots.lock().retain(|(slot_id, _)| *slot_id != id);
            }
        })
    }

    /// Deliver an event to every connected listener, in connection order.
    pub fn emit(&self, event: &E) {
        let slots: Vec<Slot<E>> = self
            .inner
            .slots
            .lock()
            .iter()
            .map(|(_, slot)| slot.clone())
            .collect();
        for slot in slots {
            slot(event);
        }
    }

    /// Number of connected listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.slots.lock().len()
    }

    /// Disconnect every listener.
    pub fn disconnect_all(&self) {
        self.inner.slots.lock().clear();
    }
}

impl<E: 'static> Default for Signal<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for Signal<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E> fmt::Debug for Signal<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("listeners", &self.inner.slots.lock().len())
            .finish()
    }
}

/// Handle keeping a listener connected. Dropping it disconnects the listener.
#[must_use = "dropping a Subscription disconnects its listener"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Create a subscription that runs `detach` when dropped.
    pub fn new(detach: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// A subscription that is not attached to anything.
    pub fn empty() -> Self {
        Self { detach: None }
    }

    /// Disconnect now.
    pub fn detach(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }

    /// Whether this handle still holds a connection.
    pub fn is_attached(&self) -> bool {
        self.detach.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}
