//! Shared value - a single observable JSON cell.
//!
//! Stored as the `"value"` key of a collaborative map so that it can be
//! replaced atomically by any collaborator.

use crate::error::Result;
use crate::map::MapCore;
use colab_backend::{Entry, MapRef, Subscription};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

const VALUE_KEY: &str = "value";

/// A change to a shared value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValueChange {
    pub old_value: Value,
    pub new_value: Value,
}

fn json_of(entry: Option<Entry>) -> Value {
    entry
        .and_then(|entry| entry.as_json().cloned())
        .unwrap_or(Value::Null)
}

/// An observable JSON value bound to a collaborative map.
#[derive(Clone)]
pub struct SharedValue {
    core: Arc<MapCore>,
}

impl SharedValue {
    pub fn new(primitive: MapRef) -> Self {
        Self {
            core: MapCore::new(primitive, "SharedValue"),
        }
    }

    pub fn primitive(&self) -> MapRef {
        self.core.primitive()
    }

    /// The current value; `Null` when never set.
    pub fn get(&self) -> Value {
        json_of(self.primitive().get(VALUE_KEY))
    }

    pub fn get_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.get())?)
    }

    /// Set the value. Setting a value equal to the current one does nothing.
    pub fn set(&self, value: Value) -> Result<()> {
        self.core.ensure_live()?;
        if self.get() == value {
            return Ok(());
        }
        self.core.set(VALUE_KEY, value)?;
        Ok(())
    }

    pub fn set_as<T: Serialize>(&self, value: &T) -> Result<()> {
        self.set(serde_json::to_value(value)?)
    }

    pub fn connect(&self, listener: impl Fn(&ValueChange) + Send + Sync + 'static) -> Subscription {
        self.core.changed().connect(move |change| {
            if change.key != VALUE_KEY {
                return;
            }
            let old_value = json_of(change.old_value.clone());
            let new_value = json_of(change.new_value.clone());
            if old_value != new_value {
                listener(&ValueChange {
                    old_value,
                    new_value,
                });
            }
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

impl fmt::Debug for SharedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedValue")
            .field("value", &self.get())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
