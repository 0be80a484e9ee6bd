//! High-level client for the colabdb SDK.

use crate::error::{Result, SdkError};
use colab_backend::{DocumentLoader, MemoryBackend, UserProfile};
use colab_db::{ModelDatabase, ModelDbOptions, DEFAULT_MAX_UNDO_LEVELS};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use ulid::Ulid;

/// Configuration for the colabdb client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Stable user identifier shown to other collaborators.
    pub user_id: String,
    /// Display name for presence.
    pub user_name: String,
    /// Undo levels kept per list.
    pub max_undo_levels: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_id: Ulid::new().to_string(),
            user_name: "Anonymous".to_string(),
            max_undo_levels: DEFAULT_MAX_UNDO_LEVELS,
        }
    }
}

impl ClientConfig {
    pub fn profile(&self) -> UserProfile {
        UserProfile::new(self.user_id.clone(), self.user_name.clone())
    }
}

/// Builder for client configuration.
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    pub fn user_id(mut self, id: impl Into<String>) -> Self {
        self.config.user_id = id.into();
        self
    }

    pub fn user_name(mut self, name: impl Into<String>) -> Self {
        self.config.user_name = name.into();
        self
    }

    pub fn max_undo_levels(mut self, levels: usize) -> Self {
        self.config.max_undo_levels = levels;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The colabdb client. Opens one model database per file path.
///
/// # Example
///
/// ```rust,no_run
/// use colab_backend::MemoryBackend;
/// use colab_sdk::{Client, ClientConfigBuilder};
///
/// # async fn demo() -> colab_sdk::Result<()> {
/// let backend = MemoryBackend::new();
/// let config = ClientConfigBuilder::new().user_name("Alice").build();
/// let client = Client::new_with_memory_backend(config, &backend);
///
/// let db = client.open("notes.md")?;
/// db.create_string("body")?.set_text("Hello, world!")?;
/// db.connected().await?;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    config: ClientConfig,
    loader: Arc<dyn DocumentLoader>,
    databases: Arc<RwLock<HashMap<String, ModelDatabase>>>,
}

impl Client {
    /// Create a client that loads documents through `loader`.
    pub fn new(config: ClientConfig, loader: Arc<dyn DocumentLoader>) -> Self {
        Self {
            config,
            loader,
            databases: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a client on an in-memory backend (for testing).
    pub fn new_with_memory_backend(config: ClientConfig, backend: &MemoryBackend) -> Self {
        let loader = Arc::new(backend.loader(config.profile()));
        Self::new(config, loader)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn user_name(&self) -> &str {
        &self.config.user_name
    }

    pub fn user_id(&self) -> &str {
        &self.config.user_id
    }

    /// Open the model database of `path`, or return the one already open.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(&self, path: &str) -> Result<ModelDatabase> {
        if path.trim().is_empty() {
            return Err(SdkError::InvalidPath(path.to_string()));
        }
        let mut databases = self.databases.write();
        if let Some(db) = databases.get(path) {
            if !db.is_disposed() {
                return Ok(db.clone());
            }
        }

        debug!(path, user = %self.config.user_name, "opening model database");
        let options = ModelDbOptions::with_shared_loader(path, self.loader.clone())
            .max_undo_levels(self.config.max_undo_levels);
        let db = ModelDatabase::new(options);
        databases.insert(path.to_string(), db.clone());
        Ok(db)
    }

    /// Open `path` and wait for its document.
    pub async fn open_connected(&self, path: &str) -> Result<ModelDatabase> {
        let db = self.open(path)?;
        db.connected().await?;
        Ok(db)
    }

    pub fn get(&self, path: &str) -> Option<ModelDatabase> {
        self.databases.read().get(path).cloned()
    }

    /// Dispose and forget the database of `path`.
    pub fn close(&self, path: &str) -> Result<()> {
        let db = self
            .databases
            .write()
            .remove(path)
            .ok_or_else(|| SdkError::NotFound(path.to_string()))?;
        db.dispose();
        Ok(())
    }

    /// Dispose every open database.
    pub fn close_all(&self) {
        let databases: Vec<ModelDatabase> = self.databases.write().drain().map(|(_, db)| db).collect();
        for db in databases {
            db.dispose();
        }
    }

    /// Paths of the open databases.
    pub fn open_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.databases.read().keys().cloned().collect();
        paths.sort();
        paths
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("open_paths", &self.open_paths())
            .finish()
    }
}

/// Convenience functions for quickly creating collaborative setups.
pub mod quick {
    use super::*;

    /// Create one client per user name, all sharing one in-memory backend.
    pub fn create_collaborative_clients(user_names: &[&str]) -> (MemoryBackend, Vec<Client>) {
        let backend = MemoryBackend::new();
        let clients = user_names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let config = ClientConfigBuilder::new()
                    .user_id(format!("user-{}", i + 1))
                    .user_name(*name)
                    .build();
                Client::new_with_memory_backend(config, &backend)
            })
            .collect();
        (backend, clients)
    }
}
