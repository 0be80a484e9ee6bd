//! # colab-db
//!
//! Model database layer for colabdb.
//!
//! This crate provides:
//! - Observable shared containers (string, list, map, value) over collaborative primitives
//! - A list with local undo/redo that ignores edits made by other collaborators
//! - A synchronized roster of the collaborators attached to a document
//! - [`ModelDatabase`]: path-addressed containers, namespaced views, and
//!   placeholders that are bound once the shared document has loaded
//!
//! ## Example
//!
//! ```rust,no_run
//! use colab_backend::{MemoryBackend, UserProfile};
//! use colab_db::{ModelDatabase, ModelDbOptions};
//!
//! # async fn demo() -> colab_db::Result<()> {
//! let backend = MemoryBackend::new();
//! let loader = backend.loader(UserProfile::new("u1", "Ada Lovelace"));
//! let db = ModelDatabase::new(ModelDbOptions::new("notes.md", loader));
//!
//! // Usable right away, bound to the shared document once it loads.
//! let title = db.create_string("title")?;
//! title.set_text("Minutes")?;
//!
//! let cells = db.view("notebook").create_list::<String>("cells")?;
//! cells.push(&"print(1)".to_string())?;
//! cells.undo()?;
//!
//! db.connected().await?;
//! assert!(!db.is_prepopulated());
//! # Ok(())
//! # }
//! ```

mod binding;
pub mod container;
pub mod error;
pub mod list;
pub mod map;
pub mod modeldb;
pub mod roster;
pub mod string;
pub mod undo;
pub mod value;

// Container exports
pub use container::{Container, ContainerChange, ContainerType};

// Adapter exports
pub use list::{ListChange, ListChangeKind, SharedList};
pub use map::{MapChange, MapChangeKind, SharedMap};
pub use string::{SharedString, StringChange, StringChangeKind};
pub use value::{SharedValue, ValueChange};

// Undo exports
pub use undo::{UndoableSharedList, DEFAULT_MAX_UNDO_LEVELS};

// Roster exports
pub use roster::{CollaboratorRoster, ROSTER_KEY};

// Model database exports
pub use modeldb::{DbEvent, ModelDatabase, ModelDbOptions};

// Error exports
pub use error::{DbError, Result};
