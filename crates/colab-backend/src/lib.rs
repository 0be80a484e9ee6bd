//! # colab-backend
//!
//! The realtime backend as seen by colabdb.
//!
//! This crate provides:
//! - Capability traits for collaborative strings, lists and maps
//! - Native mutation events and synchronous [`Signal`]s with RAII [`Subscription`]s
//! - Collaborator identity and presence notifications
//! - An in-memory backend for tests, demos and local placeholders
//!
//! ## Example
//!
//! ```rust
//! use colab_backend::{CollaborativeMap, Entry, MemoryBackend, UserProfile};
//! use serde_json::json;
//!
//! let backend = MemoryBackend::new();
//! let alice = backend.open("notes.txt", &UserProfile::new("a", "Alice")).unwrap();
//! let bob = backend.open("notes.txt", &UserProfile::new("b", "Bob")).unwrap();
//!
//! alice.root().set("title", Entry::Json(json!("Minutes")));
//! assert_eq!(bob.root().get("title"), Some(Entry::Json(json!("Minutes"))));
//! ```

pub mod collaborator;
pub mod error;
pub mod memory;
pub mod primitive;
pub mod signal;

pub use collaborator::{short_name, Collaborator, CollaboratorColors, CollaboratorEvent, UserProfile};
pub use error::BackendError;
pub use memory::{
    new_in_memory_document, MemoryBackend, MemoryDocument, MemoryList, MemoryLoader, MemoryMap,
    MemoryString,
};
pub use primitive::{
    CollaborativeList, CollaborativeMap, CollaborativeString, DocumentLoader, DocumentRef, Entry,
    ListEvent, ListRef, Listener, MapRef, Primitive, PrimitiveKind, RealtimeDocument, StringRef,
    TextEvent, ValueChanged,
};
pub use signal::{Signal, Subscription};
