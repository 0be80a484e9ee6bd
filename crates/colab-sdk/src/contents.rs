//! File-storage provider interface.
//!
//! The host reaches files through a [`ContentsProvider`]; every mutation is
//! announced as a [`FileChange`]. [`MemoryContents`] keeps a file hierarchy in
//! memory for tests and demos.

use crate::error::{Result, SdkError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::broadcast;
use tracing::debug;
use ulid::Ulid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Directory,
    File,
    Notebook,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Text,
    Base64,
    Json,
}

/// A file or directory as seen by the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileModel {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub writable: bool,
    pub mimetype: Option<String>,
    /// Present only when requested. Directories list their children here.
    pub content: Option<Value>,
    pub format: Option<FileFormat>,
}

impl FileModel {
    fn new(path: &str, file_type: FileType) -> Self {
        let now = Utc::now();
        Self {
            name: base_name(path).to_string(),
            path: path.to_string(),
            file_type,
            created: now,
            last_modified: now,
            writable: true,
            mimetype: match file_type {
                FileType::Directory => None,
                _ => guess_mimetype(path).map(str::to_string),
            },
            content: None,
            format: None,
        }
    }

    fn without_content(&self) -> Self {
        Self {
            content: None,
            format: None,
            ..self.clone()
        }
    }

    fn moved_to(&self, path: &str) -> Self {
        Self {
            name: base_name(path).to_string(),
            path: path.to_string(),
            mimetype: match self.file_type {
                FileType::Directory => None,
                _ => guess_mimetype(path).map(str::to_string),
            },
            ..self.clone()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChangeKind {
    New,
    Save,
    Rename,
    Delete,
    Copy,
}

/// A change to the file hierarchy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileChange {
    #[serde(rename = "type")]
    pub kind: FileChangeKind,
    pub old_value: Option<FileModel>,
    pub new_value: Option<FileModel>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointModel {
    pub id: String,
    pub last_modified: DateTime<Utc>,
}

/// Options for [`ContentsProvider::new_untitled`].
#[derive(Clone, Debug)]
pub struct CreateOptions {
    /// Directory to create in; empty for the root.
    pub path: String,
    pub file_type: FileType,
    /// Extension including the dot, e.g. `".md"`.
    pub ext: Option<String>,
}

impl CreateOptions {
    pub fn new(path: impl Into<String>, file_type: FileType) -> Self {
        Self {
            path: path.into(),
            file_type,
            ext: None,
        }
    }

    pub fn ext(mut self, ext: impl Into<String>) -> Self {
        self.ext = Some(ext.into());
        self
    }
}

/// Access to a hierarchy of files.
#[async_trait]
pub trait ContentsProvider: Send + Sync {
    /// Fetch a model. Directory content lists the children.
    async fn get(&self, path: &str, with_content: bool) -> Result<FileModel>;

    /// Create an untitled file or directory.
    async fn new_untitled(&self, options: CreateOptions) -> Result<FileModel>;

    /// Write content, creating the file if needed.
    async fn save(&self, path: &str, content: Value, format: FileFormat) -> Result<FileModel>;

    async fn rename(&self, path: &str, new_path: &str) -> Result<FileModel>;

    /// Copy a file into `to_dir` under a fresh name.
    async fn copy(&self, path: &str, to_dir: &str) -> Result<FileModel>;

    async fn delete(&self, path: &str) -> Result<()>;

    async fn create_checkpoint(&self, path: &str) -> Result<CheckpointModel>;

    async fn list_checkpoints(&self, path: &str) -> Result<Vec<CheckpointModel>>;

    async fn restore_checkpoint(&self, path: &str, checkpoint_id: &str) -> Result<()>;

    async fn delete_checkpoint(&self, path: &str, checkpoint_id: &str) -> Result<()>;

    /// Stream of file changes.
    fn subscribe(&self) -> broadcast::Receiver<FileChange>;
}

fn base_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

fn normalize(path: &str) -> String {
    path.trim_matches('/').to_string()
}

/// Split `name` into stem and extension (with the dot).
fn split_ext(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(0) | None => (name, ""),
        Some(dot) => name.split_at(dot),
    }
}

/// Mimetype for a file name, by extension.
pub fn guess_mimetype(path: &str) -> Option<&'static str> {
    let (_, ext) = split_ext(base_name(path));
    let mimetype = match ext.to_ascii_lowercase().as_str() {
        ".txt" => "text/plain",
        ".md" => "text/markdown",
        ".json" => "application/json",
        ".ipynb" => "application/x-ipynb+json",
        ".py" => "text/x-python",
        ".rs" => "text/rust",
        ".html" => "text/html",
        ".csv" => "text/csv",
        ".svg" => "image/svg+xml",
        ".png" => "image/png",
        ".jpg" | ".jpeg" => "image/jpeg",
        _ => return None,
    };
    Some(mimetype)
}

struct StoredFile {
    model: FileModel,
    checkpoints: Vec<(CheckpointModel, Option<Value>)>,
}

/// An in-memory [`ContentsProvider`].
pub struct MemoryContents {
    files: RwLock<BTreeMap<String, StoredFile>>,
    changes: broadcast::Sender<FileChange>,
}

impl MemoryContents {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            files: RwLock::new(BTreeMap::new()),
            changes,
        }
    }

    fn emit(&self, kind: FileChangeKind, old_value: Option<FileModel>, new_value: Option<FileModel>) {
        debug!(?kind, "file change");
        // No receivers is fine.
        let _ = self.changes.send(FileChange {
            kind,
            old_value,
            new_value,
        });
    }

    fn is_dir(files: &BTreeMap<String, StoredFile>, path: &str) -> bool {
        path.is_empty()
            || files
                .get(path)
                .is_some_and(|f| f.model.file_type == FileType::Directory)
    }

    fn children(files: &BTreeMap<String, StoredFile>, dir: &str) -> Vec<FileModel> {
        files
            .iter()
            .filter(|(path, _)| parent_dir(path) == dir && !path.is_empty())
            .map(|(_, stored)| stored.model.without_content())
            .collect()
    }

    fn require_dir(files: &BTreeMap<String, StoredFile>, dir: &str) -> Result<()> {
        if Self::is_dir(files, dir) {
            Ok(())
        } else {
            Err(SdkError::NotFound(dir.to_string()))
        }
    }

    /// First free name of the form `{stem}{sep}{n}{ext}`, trying the bare
    /// name first when `bare` is set.
    fn free_name(files: &BTreeMap<String, StoredFile>, dir: &str, stem: &str, sep: &str, ext: &str, bare: bool) -> String {
        if bare {
            let candidate = join(dir, &format!("{stem}{ext}"));
            if !files.contains_key(&candidate) {
                return candidate;
            }
        }
        let mut n = 1;
        loop {
            let candidate = join(dir, &format!("{stem}{sep}{n}{ext}"));
            if !files.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

impl Default for MemoryContents {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentsProvider for MemoryContents {
    async fn get(&self, path: &str, with_content: bool) -> Result<FileModel> {
        let path = normalize(path);
        let files = self.files.read();
        if path.is_empty() {
            let mut root = FileModel::new("", FileType::Directory);
            if with_content {
                root.content = Some(serde_json::to_value(Self::children(&files, ""))
                    .map_err(|e| SdkError::Internal(e.to_string()))?);
                root.format = Some(FileFormat::Json);
            }
            return Ok(root);
        }

        let stored = files
            .get(&path)
            .ok_or_else(|| SdkError::NotFound(path.clone()))?;
        if !with_content {
            return Ok(stored.model.without_content());
        }
        let mut model = stored.model.clone();
        if model.file_type == FileType::Directory {
            model.content = Some(
                serde_json::to_value(Self::children(&files, &path))
                    .map_err(|e| SdkError::Internal(e.to_string()))?,
            );
            model.format = Some(FileFormat::Json);
        }
        Ok(model)
    }

    async fn new_untitled(&self, options: CreateOptions) -> Result<FileModel> {
        let dir = normalize(&options.path);
        let model = {
            let mut files = self.files.write();
            Self::require_dir(&files, &dir)?;

            let path = match options.file_type {
                FileType::Directory => {
                    Self::free_name(&files, &dir, "Untitled Folder", " ", "", true)
                }
                FileType::Notebook => {
                    let ext = options.ext.as_deref().unwrap_or(".ipynb");
                    Self::free_name(&files, &dir, "Untitled", "", ext, true)
                }
                FileType::File => {
                    let ext = options.ext.as_deref().unwrap_or(".txt");
                    Self::free_name(&files, &dir, "untitled", "", ext, true)
                }
            };

            let mut model = FileModel::new(&path, options.file_type);
            match options.file_type {
                FileType::Directory => {}
                FileType::Notebook => {
                    model.content = Some(serde_json::json!({
                        "cells": [],
                        "metadata": {},
                        "nbformat": 4,
                        "nbformat_minor": 5,
                    }));
                    model.format = Some(FileFormat::Json);
                }
                FileType::File => {
                    model.content = Some(Value::String(String::new()));
                    model.format = Some(FileFormat::Text);
                }
            }
            files.insert(
                path,
                StoredFile {
                    model: model.clone(),
                    checkpoints: Vec::new(),
                },
            );
            model.without_content()
        };
        self.emit(FileChangeKind::New, None, Some(model.clone()));
        Ok(model)
    }

    async fn save(&self, path: &str, content: Value, format: FileFormat) -> Result<FileModel> {
        let path = normalize(path);
        if path.is_empty() {
            return Err(SdkError::InvalidPath(path));
        }
        let (old, model) = {
            let mut files = self.files.write();
            Self::require_dir(&files, parent_dir(&path))?;
            let old = files.get(&path).map(|f| f.model.without_content());
            if old.as_ref().is_some_and(|m| m.file_type == FileType::Directory) {
                return Err(SdkError::InvalidPath(path));
            }

            let stored = files.entry(path.clone()).or_insert_with(|| {
                let file_type = if path.ends_with(".ipynb") {
                    FileType::Notebook
                } else {
                    FileType::File
                };
                StoredFile {
                    model: FileModel::new(&path, file_type),
                    checkpoints: Vec::new(),
                }
            });
            stored.model.content = Some(content);
            stored.model.format = Some(format);
            stored.model.last_modified = Utc::now();
            (old, stored.model.without_content())
        };
        self.emit(FileChangeKind::Save, old, Some(model.clone()));
        Ok(model)
    }

    async fn rename(&self, path: &str, new_path: &str) -> Result<FileModel> {
        let path = normalize(path);
        let new_path = normalize(new_path);
        let (old, model) = {
            let mut files = self.files.write();
            if !files.contains_key(&path) {
                return Err(SdkError::NotFound(path));
            }
            if files.contains_key(&new_path) {
                return Err(SdkError::AlreadyExists(new_path));
            }
            Self::require_dir(&files, parent_dir(&new_path))?;

            let prefix = format!("{path}/");
            let moving: Vec<String> = files
                .keys()
                .filter(|p| **p == path || p.starts_with(&prefix))
                .cloned()
                .collect();

            let mut old = None;
            let mut renamed = None;
            for from in moving {
                let Some(mut stored) = files.remove(&from) else {
                    continue;
                };
                let to = format!("{new_path}{}", &from[path.len()..]);
                if from == path {
                    old = Some(stored.model.without_content());
                }
                stored.model = stored.model.moved_to(&to);
                if from == path {
                    renamed = Some(stored.model.without_content());
                }
                files.insert(to, stored);
            }
            match (old, renamed) {
                (Some(old), Some(renamed)) => (old, renamed),
                _ => return Err(SdkError::Internal(format!("lost {path} while renaming"))),
            }
        };
        self.emit(FileChangeKind::Rename, Some(old), Some(model.clone()));
        Ok(model)
    }

    async fn copy(&self, path: &str, to_dir: &str) -> Result<FileModel> {
        let path = normalize(path);
        let to_dir = normalize(to_dir);
        let model = {
            let mut files = self.files.write();
            Self::require_dir(&files, &to_dir)?;
            let source = files
                .get(&path)
                .ok_or_else(|| SdkError::NotFound(path.clone()))?;
            if source.model.file_type == FileType::Directory {
                return Err(SdkError::InvalidPath(path));
            }

            let (stem, ext) = split_ext(base_name(&path));
            let target = Self::free_name(&files, &to_dir, &format!("{stem}-Copy"), "", ext, false);
            let now = Utc::now();
            let model = FileModel {
                created: now,
                last_modified: now,
                ..source.model.moved_to(&target)
            };
            files.insert(
                target,
                StoredFile {
                    model: model.clone(),
                    checkpoints: Vec::new(),
                },
            );
            model.without_content()
        };
        self.emit(FileChangeKind::Copy, None, Some(model.clone()));
        Ok(model)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let path = normalize(path);
        let old = {
            let mut files = self.files.write();
            let stored = files
                .remove(&path)
                .ok_or_else(|| SdkError::NotFound(path.clone()))?;
            let prefix = format!("{path}/");
            files.retain(|p, _| !p.starts_with(&prefix));
            stored.model.without_content()
        };
        self.emit(FileChangeKind::Delete, Some(old), None);
        Ok(())
    }

    async fn create_checkpoint(&self, path: &str) -> Result<CheckpointModel> {
        let path = normalize(path);
        let mut files = self.files.write();
        let stored = files
            .get_mut(&path)
            .ok_or_else(|| SdkError::NotFound(path.clone()))?;
        let checkpoint = CheckpointModel {
            id: Ulid::new().to_string(),
            last_modified: Utc::now(),
        };
        stored
            .checkpoints
            .push((checkpoint.clone(), stored.model.content.clone()));
        Ok(checkpoint)
    }

    async fn list_checkpoints(&self, path: &str) -> Result<Vec<CheckpointModel>> {
        let path = normalize(path);
        let files = self.files.read();
        let stored = files
            .get(&path)
            .ok_or_else(|| SdkError::NotFound(path.clone()))?;
        Ok(stored.checkpoints.iter().map(|(c, _)| c.clone()).collect())
    }

    async fn restore_checkpoint(&self, path: &str, checkpoint_id: &str) -> Result<()> {
        let path = normalize(path);
        let (old, model) = {
            let mut files = self.files.write();
            let stored = files
                .get_mut(&path)
                .ok_or_else(|| SdkError::NotFound(path.clone()))?;
            let content = stored
                .checkpoints
                .iter()
                .find(|(c, _)| c.id == checkpoint_id)
                .map(|(_, content)| content.clone())
                .ok_or_else(|| SdkError::NotFound(checkpoint_id.to_string()))?;
            let old = stored.model.without_content();
            stored.model.content = content;
            stored.model.last_modified = Utc::now();
            (old, stored.model.without_content())
        };
        self.emit(FileChangeKind::Save, Some(old), Some(model));
        Ok(())
    }

    async fn delete_checkpoint(&self, path: &str, checkpoint_id: &str) -> Result<()> {
        let path = normalize(path);
        let mut files = self.files.write();
        let stored = files
            .get_mut(&path)
            .ok_or_else(|| SdkError::NotFound(path.clone()))?;
        let before = stored.checkpoints.len();
        stored.checkpoints.retain(|(c, _)| c.id != checkpoint_id);
        if stored.checkpoints.len() == before {
            return Err(SdkError::NotFound(checkpoint_id.to_string()));
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<FileChange> {
        self.changes.subscribe()
    }
}
