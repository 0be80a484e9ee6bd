//! Model database - creates, indexes and disposes the containers of one
//! shared document.
//!
//! Containers may be created before the document has loaded. They start out
//! backed by a private in-memory document and are bound to the shared
//! document once it arrives: either to the entry already stored at their
//! path, or to a fresh primitive seeded with whatever was written to the
//! placeholder in the meantime.

use crate::container::{Container, ContainerType};
use crate::error::{DbError, Result};
use crate::map::SharedMap;
use crate::roster::{CollaboratorRoster, ROSTER_KEY};
use crate::string::SharedString;
use crate::undo::{UndoableSharedList, DEFAULT_MAX_UNDO_LEVELS};
use crate::value::SharedValue;
use colab_backend::{
    new_in_memory_document, BackendError, DocumentLoader, DocumentRef, Subscription, ValueChanged,
};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Options for opening a model database.
#[derive(Clone)]
pub struct ModelDbOptions {
    /// Path of the file whose document backs the database.
    pub path: String,
    pub loader: Arc<dyn DocumentLoader>,
    pub max_undo_levels: usize,
}

impl ModelDbOptions {
    pub fn new(path: impl Into<String>, loader: impl DocumentLoader) -> Self {
        Self::with_shared_loader(path, Arc::new(loader))
    }

    pub fn with_shared_loader(path: impl Into<String>, loader: Arc<dyn DocumentLoader>) -> Self {
        Self {
            path: path.into(),
            loader,
            max_undo_levels: DEFAULT_MAX_UNDO_LEVELS,
        }
    }

    pub fn max_undo_levels(mut self, levels: usize) -> Self {
        self.max_undo_levels = levels;
        self
    }
}

impl fmt::Debug for ModelDbOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDbOptions")
            .field("path", &self.path)
            .field("max_undo_levels", &self.max_undo_levels)
            .finish_non_exhaustive()
    }
}

/// Lifecycle events of a model database.
#[derive(Clone, Debug, PartialEq)]
pub enum DbEvent {
    ContainerCreated {
        path: String,
        container_type: ContainerType,
    },
    ContainerDisposed {
        path: String,
    },
    Connected {
        prepopulated: bool,
    },
    ConnectionFailed {
        error: DbError,
    },
    /// The shared entry at `path` holds another kind of model. The local
    /// container was disposed.
    BindFailed {
        path: String,
        error: DbError,
    },
    Disposed,
}

#[derive(Clone, Debug)]
enum ConnectionState {
    Pending,
    Connected,
    Failed(DbError),
}

type ViewId = u64;

const ROOT_VIEW: ViewId = 0;

struct Slot {
    container: Container,
    owner: ViewId,
}

#[derive(Default)]
struct RegistryState {
    containers: BTreeMap<String, Slot>,
    /// Live views and the view each was derived from.
    views: HashMap<ViewId, ViewId>,
    document: Option<DocumentRef>,
    prepopulated: bool,
    roster: Option<CollaboratorRoster>,
    root_watch: Option<Subscription>,
    disposed: bool,
}

impl RegistryState {
    fn is_live(&self, view: ViewId) -> bool {
        !self.disposed && (view == ROOT_VIEW || self.views.contains_key(&view))
    }

    /// `view` and every view derived from it, directly or not.
    fn lineage(&self, view: ViewId) -> HashSet<ViewId> {
        let mut lineage = HashSet::from([view]);
        loop {
            let before = lineage.len();
            for (child, parent) in &self.views {
                if lineage.contains(parent) {
                    lineage.insert(*child);
                }
            }
            if lineage.len() == before {
                return lineage;
            }
        }
    }
}

struct Registry {
    path: String,
    max_undo_levels: usize,
    state: Mutex<RegistryState>,
    placeholder: DocumentRef,
    connection: watch::Sender<ConnectionState>,
    events: broadcast::Sender<DbEvent>,
    next_view: AtomicU64,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Registry {
    fn emit(&self, event: DbEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn on_loaded(self: &Arc<Self>, result: std::result::Result<DocumentRef, BackendError>) {
        match result {
            Ok(document) => self.bind_document(document),
            Err(err) => {
                warn!(path = %self.path, error = %err, "failed to load document");
                let error = DbError::from(err);
                self.connection
                    .send_replace(ConnectionState::Failed(error.clone()));
                self.emit(DbEvent::ConnectionFailed { error });
            }
        }
    }

    fn bind_document(self: &Arc<Self>, document: DocumentRef) {
        let root = document.root();
        let prepopulated = root.keys().iter().any(|key| key != ROSTER_KEY);

        let pending: Vec<(String, Container)> = {
            let mut state = self.state.lock();
            if state.disposed {
                drop(state);
                document.close();
                return;
            }
            state.document = Some(document.clone());
            state.prepopulated = prepopulated;
            state
                .containers
                .iter()
                .map(|(path, slot)| (path.clone(), slot.container.clone()))
                .collect()
        };
        debug!(path = %self.path, containers = pending.len(), prepopulated, "document loaded");

        let mut failures = Vec::new();
        for (path, container) in &pending {
            if let Err(error) = Self::reconcile(&document, path, container) {
                failures.push((path.clone(), container.clone(), error));
            }
        }

        // Listeners fired while binding may have disposed the database.
        if self.state.lock().disposed {
            debug!(path = %self.path, "disposed while binding");
            return;
        }

        let roster = match CollaboratorRoster::attach(&document) {
            Ok(roster) => Some(roster),
            Err(err) => {
                warn!(path = %self.path, error = %err, "could not attach collaborator roster");
                None
            }
        };

        let weak: Weak<Registry> = Arc::downgrade(self);
        let root_watch = root.observe(Box::new(move |event: &ValueChanged| {
            if let Some(registry) = weak.upgrade() {
                registry.on_root_changed(event);
            }
        }));

        let first_failure = failures.first().map(|(_, _, error)| error.clone());
        for (path, container, error) in failures {
            self.release_unbound(&path, &container, error);
        }
        {
            let mut state = self.state.lock();
            if state.disposed {
                drop(state);
                drop(root_watch);
                if let Some(roster) = roster {
                    let session = roster.local().session_id.clone();
                    if let Err(err) = roster.delete(&session) {
                        debug!(error = %err, "could not withdraw local session");
                    }
                    roster.dispose();
                }
                return;
            }
            state.roster = roster;
            state.root_watch = Some(root_watch);
            match &first_failure {
                None => {
                    self.connection.send_replace(ConnectionState::Connected);
                }
                Some(error) => {
                    self.connection
                        .send_replace(ConnectionState::Failed(error.clone()));
                }
            }
        }

        match first_failure {
            None => self.emit(DbEvent::Connected { prepopulated }),
            Some(error) => self.emit(DbEvent::ConnectionFailed { error }),
        }
    }

    /// Bind `container` to the shared entry at `path`, creating the entry
    /// from the container's content when there is none.
    fn reconcile(document: &DocumentRef, path: &str, container: &Container) -> Result<()> {
        let root = document.root();
        let entry = match root.get(path) {
            Some(existing) => existing,
            None => {
                let entry = container.materialize(document);
                root.set(path, entry.clone());
                entry
            }
        };
        container.rebind(path, entry)?;
        debug!(path, "container bound");
        Ok(())
    }

    /// Drop a container that could not be bound to the shared entry at its
    /// path, so nothing keeps writing to a copy nobody else sees.
    fn release_unbound(&self, path: &str, container: &Container, error: DbError) {
        warn!(path, error = %error, "could not bind container");
        {
            let mut state = self.state.lock();
            let same = state
                .containers
                .get(path)
                .is_some_and(|slot| slot.container.entry() == container.entry());
            if same {
                state.containers.remove(path);
            }
        }
        container.dispose();
        self.emit(DbEvent::BindFailed {
            path: path.to_string(),
            error,
        });
        self.emit(DbEvent::ContainerDisposed {
            path: path.to_string(),
        });
    }

    /// Another collaborator replaced the primitive at a path we hold.
    fn on_root_changed(&self, event: &ValueChanged) {
        if event.key == ROSTER_KEY {
            return;
        }
        let Some(entry) = event.new_value.clone() else {
            debug!(path = %event.key, "shared entry deleted");
            return;
        };
        let container = match self.state.lock().containers.get(&event.key) {
            Some(slot) => slot.container.clone(),
            None => return,
        };
        if container.entry().primitive_id() == entry.primitive_id() {
            return;
        }
        if let Err(err) = container.rebind(&event.key, entry) {
            self.release_unbound(&event.key, &container, err);
        }
    }

    fn dispose_all(&self) {
        let (containers, roster, document, root_watch) = {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.views.clear();
            (
                std::mem::take(&mut state.containers),
                state.roster.take(),
                state.document.take(),
                state.root_watch.take(),
            )
        };
        drop(root_watch);

        for (path, slot) in containers {
            slot.container.dispose();
            self.emit(DbEvent::ContainerDisposed { path });
        }
        if let Some(roster) = roster {
            roster.dispose();
        }
        if let Some(document) = document {
            document.close();
        }
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.connection.send_if_modified(|state| {
            if matches!(state, ConnectionState::Pending) {
                *state = ConnectionState::Failed(DbError::Disposed("ModelDatabase".to_string()));
                true
            } else {
                false
            }
        });
        debug!(path = %self.path, "model database disposed");
        self.emit(DbEvent::Disposed);
    }

    fn dispose_view(&self, view: ViewId) {
        let released: Vec<(String, Container)> = {
            let mut state = self.state.lock();
            if !state.is_live(view) {
                return;
            }
            let lineage = state.lineage(view);
            state.views.retain(|id, _| !lineage.contains(id));

            let paths: Vec<String> = state
                .containers
                .iter()
                .filter(|(_, slot)| lineage.contains(&slot.owner))
                .map(|(path, _)| path.clone())
                .collect();
            paths
                .into_iter()
                .filter_map(|path| {
                    let slot = state.containers.remove(&path)?;
                    Some((path, slot.container))
                })
                .collect()
        };

        for (path, container) in released {
            container.dispose();
            self.emit(DbEvent::ContainerDisposed { path });
        }
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
        if let Some(document) = self.state.get_mut().document.take() {
            document.close();
        }
    }
}

/// A namespace of containers stored in one shared document.
///
/// Handles are cheap to clone. [`ModelDatabase::view`] returns a handle whose
/// paths are prefixed with a base path; disposing a view only disposes the
/// containers created through it or through views derived from it.
#[derive(Clone)]
pub struct ModelDatabase {
    registry: Arc<Registry>,
    base_path: String,
    view: ViewId,
}

impl ModelDatabase {
    /// Open the database and start loading its document.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(options: ModelDbOptions) -> Self {
        let (connection, _) = watch::channel(ConnectionState::Pending);
        let (events, _) = broadcast::channel(64);
        let registry = Arc::new(Registry {
            path: options.path.clone(),
            max_undo_levels: options.max_undo_levels,
            state: Mutex::new(RegistryState::default()),
            placeholder: new_in_memory_document(),
            connection,
            events,
            next_view: AtomicU64::new(ROOT_VIEW + 1),
            task: Mutex::new(None),
        });

        let weak = Arc::downgrade(&registry);
        let loader = options.loader;
        let path = options.path;
        let task = tokio::spawn(async move {
            let result = loader.load(&path).await;
            match weak.upgrade() {
                Some(registry) => registry.on_loaded(result),
                None => {
                    if let Ok(document) = result {
                        document.close();
                    }
                }
            }
        });
        *registry.task.lock() = Some(task);

        Self {
            registry,
            base_path: String::new(),
            view: ROOT_VIEW,
        }
    }

    /// Path of the file this database belongs to.
    pub fn path(&self) -> &str {
        &self.registry.path
    }

    /// Prefix applied to every path given to this handle. Empty for the root.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    fn resolve(&self, path: &str) -> String {
        if self.base_path.is_empty() {
            path.to_string()
        } else {
            format!("{}.{}", self.base_path, path)
        }
    }

    fn check_type(path: &str, container: &Container, expected: ContainerType) -> Result<Container> {
        if container.container_type() == expected {
            Ok(container.clone())
        } else {
            Err(DbError::TypeMismatch {
                path: path.to_string(),
                expected: expected.to_string(),
                found: container.container_type().to_string(),
            })
        }
    }

    fn create(&self, path: &str, container_type: ContainerType) -> Result<Container> {
        let full = self.resolve(path);
        let registry = &self.registry;

        let document = {
            let state = registry.state.lock();
            if !state.is_live(self.view) {
                return Err(DbError::Disposed("ModelDatabase".to_string()));
            }
            if let Some(slot) = state.containers.get(&full) {
                return Self::check_type(&full, &slot.container, container_type);
            }
            state.document.clone()
        };

        let container = match &document {
            Some(document) => {
                let root = document.root();
                match root.get(&full) {
                    Some(entry) => {
                        Container::from_entry(&full, entry, container_type, registry.max_undo_levels)?
                    }
                    None => {
                        let container =
                            Container::fresh(document, container_type, registry.max_undo_levels);
                        root.set(&full, container.entry());
                        container
                    }
                }
            }
            None => Container::fresh(&registry.placeholder, container_type, registry.max_undo_levels),
        };

        let bind_now = {
            let mut state = registry.state.lock();
            if let Some(slot) = state.containers.get(&full) {
                let existing = slot.container.clone();
                drop(state);
                container.dispose();
                return Self::check_type(&full, &existing, container_type);
            }
            state.containers.insert(
                full.clone(),
                Slot {
                    container: container.clone(),
                    owner: self.view,
                },
            );
            // Connected between the two critical sections.
            match (&document, &state.document) {
                (None, Some(document)) => Some(document.clone()),
                _ => None,
            }
        };
        if let Some(document) = bind_now {
            if let Err(error) = Registry::reconcile(&document, &full, &container) {
                registry.release_unbound(&full, &container, error.clone());
                return Err(error);
            }
        }

        debug!(path = %full, %container_type, "container created");
        registry.emit(DbEvent::ContainerCreated {
            path: full,
            container_type,
        });
        Ok(container)
    }

    fn type_error(&self, path: &str, expected: ContainerType, found: &Container) -> DbError {
        DbError::TypeMismatch {
            path: self.resolve(path),
            expected: expected.to_string(),
            found: found.container_type().to_string(),
        }
    }

    /// Create (or fetch) the string at `path`.
    pub fn create_string(&self, path: &str) -> Result<SharedString> {
        match self.create(path, ContainerType::String)? {
            Container::String(s) => Ok(s),
            other => Err(self.type_error(path, ContainerType::String, &other)),
        }
    }

    /// Create (or fetch) the undoable list at `path`.
    pub fn create_list<T>(&self, path: &str) -> Result<UndoableSharedList<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        match self.create(path, ContainerType::List)? {
            Container::List(l) => Ok(l.cast()),
            other => Err(self.type_error(path, ContainerType::List, &other)),
        }
    }

    /// Create (or fetch) the map at `path`.
    pub fn create_map<V>(&self, path: &str) -> Result<SharedMap<V>>
    where
        V: Serialize + DeserializeOwned,
    {
        match self.create(path, ContainerType::Map)? {
            Container::Map(m) => Ok(m.cast()),
            other => Err(self.type_error(path, ContainerType::Map, &other)),
        }
    }

    /// Create (or fetch) the value at `path`.
    pub fn create_value(&self, path: &str) -> Result<SharedValue> {
        match self.create(path, ContainerType::Value)? {
            Container::Value(v) => Ok(v),
            other => Err(self.type_error(path, ContainerType::Value, &other)),
        }
    }

    pub fn get(&self, path: &str) -> Option<Container> {
        let full = self.resolve(path);
        self.registry
            .state
            .lock()
            .containers
            .get(&full)
            .map(|slot| slot.container.clone())
    }

    pub fn has(&self, path: &str) -> bool {
        let full = self.resolve(path);
        self.registry.state.lock().containers.contains_key(&full)
    }

    /// Set the value container at `path`.
    pub fn set_value(&self, path: &str, value: Value) -> Result<()> {
        match self.get(path) {
            Some(Container::Value(v)) => v.set(value),
            Some(other) => Err(self.type_error(path, ContainerType::Value, &other)),
            None => Err(DbError::PathNotFound(self.resolve(path))),
        }
    }

    /// The value at `path`; `None` if there is no value container there.
    pub fn get_value(&self, path: &str) -> Option<Value> {
        match self.get(path)? {
            Container::Value(v) => Some(v.get()),
            _ => None,
        }
    }

    /// Paths registered under this handle's base, relative to it.
    pub fn paths(&self) -> Vec<String> {
        let state = self.registry.state.lock();
        if self.base_path.is_empty() {
            return state.containers.keys().cloned().collect();
        }
        let prefix = format!("{}.", self.base_path);
        state
            .containers
            .keys()
            .filter_map(|path| path.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    /// A handle that prefixes every path with `base_path`.
    pub fn view(&self, base_path: &str) -> ModelDatabase {
        let id = self.registry.next_view.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = self.registry.state.lock();
            if state.is_live(self.view) {
                state.views.insert(id, self.view);
            }
        }
        ModelDatabase {
            registry: self.registry.clone(),
            base_path: self.resolve(base_path),
            view: id,
        }
    }

    /// Wait until the document has loaded and every container created so
    /// far is bound to it.
    ///
    /// Fails with [`DbError::TypeMismatch`] when a container created before
    /// the load conflicts with the shared entry at its path. That container
    /// is disposed; the others stay bound.
    pub async fn connected(&self) -> Result<()> {
        let mut receiver = self.registry.connection.subscribe();
        let state = receiver
            .wait_for(|state| !matches!(state, ConnectionState::Pending))
            .await
            .map_err(|_| DbError::ConnectionFailed("connection state dropped".to_string()))?;
        match &*state {
            ConnectionState::Failed(err) => Err(err.clone()),
            _ => Ok(()),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(*self.registry.connection.borrow(), ConnectionState::Connected)
    }

    /// Whether the document already held models when it was loaded.
    pub fn is_prepopulated(&self) -> bool {
        self.registry.state.lock().prepopulated
    }

    pub fn is_collaborative(&self) -> bool {
        true
    }

    /// The collaborator roster, once connected.
    pub fn collaborators(&self) -> Option<CollaboratorRoster> {
        self.registry.state.lock().roster.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DbEvent> {
        self.registry.events.subscribe()
    }

    /// Dispose this handle's containers. On the root handle this disposes
    /// everything and leaves the document.
    pub fn dispose(&self) {
        if self.view == ROOT_VIEW {
            self.registry.dispose_all();
        } else {
            self.registry.dispose_view(self.view);
        }
    }

    pub fn is_disposed(&self) -> bool {
        !self.registry.state.lock().is_live(self.view)
    }
}

impl fmt::Debug for ModelDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDatabase")
            .field("path", &self.registry.path)
            .field("base_path", &self.base_path)
            .field("connected", &self.is_connected())
            .finish()
    }
}
