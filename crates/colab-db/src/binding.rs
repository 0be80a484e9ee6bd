//! Shared plumbing for the container adapters: the bound primitive with its
//! owned subscription, and the disposed flag.

use crate::error::{DbError, Result};
use colab_backend::Subscription;
use std::sync::atomic::{AtomicBool, Ordering};

/// A backend primitive together with the subscription that forwards its
/// native events. Replacing or detaching drops the old subscription.
pub(crate) struct Binding<P> {
    primitive: P,
    subscription: Subscription,
}

impl<P: Clone> Binding<P> {
    pub(crate) fn new(primitive: P, subscription: Subscription) -> Self {
        Self {
            primitive,
            subscription,
        }
    }

    pub(crate) fn primitive(&self) -> P {
        self.primitive.clone()
    }

    /// Swap in a new primitive, returning the previous one.
    pub(crate) fn replace(&mut self, primitive: P, subscription: Subscription) -> P {
        self.subscription = subscription;
        std::mem::replace(&mut self.primitive, primitive)
    }

    /// Stop forwarding events, keeping the primitive readable.
    pub(crate) fn detach(&mut self) {
        self.subscription = Subscription::empty();
    }
}

/// Disposed flag shared by every container.
pub(crate) struct Lifecycle {
    what: &'static str,
    disposed: AtomicBool,
}

impl Lifecycle {
    pub(crate) fn new(what: &'static str) -> Self {
        Self {
            what,
            disposed: AtomicBool::new(false),
        }
    }

    pub(crate) fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            Err(DbError::Disposed(self.what.to_string()))
        } else {
            Ok(())
        }
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Mark disposed. Returns false if it already was.
    pub(crate) fn dispose(&self) -> bool {
        !self.disposed.swap(true, Ordering::SeqCst)
    }
}
