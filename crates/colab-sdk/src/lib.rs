//! colabdb SDK - client-side entry point for realtime model databases
//!
//! The SDK wires a user identity and a document loader into one
//! [`ModelDatabase`] per file path, and defines the [`ContentsProvider`]
//! interface hosts use for file storage.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use colab_sdk::quick::create_collaborative_clients;
//!
//! # async fn demo() -> colab_sdk::Result<()> {
//! let (_backend, clients) = create_collaborative_clients(&["Alice", "Bob"]);
//!
//! let alice = clients[0].open("notes.md")?;
//! let cells = alice.create_list::<String>("cells")?;
//! cells.push(&"# Notes".to_string())?;
//!
//! let bob = clients[1].open_connected("notes.md").await?;
//! assert!(bob.is_prepopulated());
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`client`] - Client configuration and per-path databases
//! - [`contents`] - File storage provider interface and an in-memory provider
//! - [`error`] - Error types

pub mod client;
pub mod contents;
pub mod error;

pub use client::{quick, Client, ClientConfig, ClientConfigBuilder};
pub use contents::{
    guess_mimetype, CheckpointModel, ContentsProvider, CreateOptions, FileChange, FileChangeKind,
    FileFormat, FileModel, FileType, MemoryContents,
};
pub use error::{Result, SdkError};

// Re-export commonly used types from the lower layers
pub use colab_backend::{Collaborator, DocumentLoader, MemoryBackend, UserProfile};
pub use colab_db::{
    Container, ContainerType, DbError, DbEvent, ModelDatabase, ModelDbOptions, SharedList,
    SharedMap, SharedString, SharedValue, UndoableSharedList,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::client::{Client, ClientConfig};
    pub use crate::contents::{ContentsProvider, FileModel, FileType, MemoryContents};
    pub use crate::error::SdkError;
    pub use colab_db::{ModelDatabase, SharedString, SharedValue, UndoableSharedList};
}
