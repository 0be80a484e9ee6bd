//! Undo/Redo for shared lists.
//!
//! Transactions are captured from the list's own change stream. Only changes
//! produced by a call made through the [`UndoableSharedList`] on the current
//! thread are recorded; changes made by other collaborators, or replayed by
//! undo/redo, pass through untouched.

use crate::error::Result;
use crate::list::{ListChange, ListChangeKind, ListCore, SharedList};
use colab_backend::{ListRef, Subscription};
use parking_lot::{Mutex, ReentrantMutex};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::cell::Cell;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default bound on the number of undoable transactions kept.
pub const DEFAULT_MAX_UNDO_LEVELS: usize = 1000;

impl ListChange<Value> {
    /// The change that reverts this one.
    pub fn inverse(&self) -> Self {
        match self.kind {
            ListChangeKind::Add => {
                Self::removed(self.new_index.unwrap_or_default(), self.new_values.clone())
            }
            ListChangeKind::Remove => {
                Self::added(self.old_index.unwrap_or_default(), self.old_values.clone())
            }
            ListChangeKind::Set => Self::set(
                self.new_index.unwrap_or_default(),
                self.new_values.clone(),
                self.old_values.clone(),
            ),
            ListChangeKind::Move => Self::moved(
                self.new_index.unwrap_or_default(),
                self.old_index.unwrap_or_default(),
                self.new_values.clone(),
            ),
        }
    }
}

/// Perform `change` against `list`.
fn apply(list: &ListCore, change: &ListChange<Value>) -> Result<()> {
    match change.kind {
        ListChangeKind::Add => {
            list.insert_all(change.new_index.unwrap_or_default(), change.new_values.clone())?;
        }
        ListChangeKind::Remove => {
            let start = change.old_index.unwrap_or_default();
            list.remove_range(start, start + change.old_values.len())?;
        }
        ListChangeKind::Set => {
            let start = change.new_index.unwrap_or_default();
            for (offset, value) in change.new_values.iter().enumerate() {
                list.set(start + offset, value.clone())?;
            }
        }
        ListChangeKind::Move => {
            list.move_item(
                change.old_index.unwrap_or_default(),
                change.new_index.unwrap_or_default(),
            )?;
        }
    }
    Ok(())
}

/// A group of changes undone and redone as a unit.
#[derive(Clone, Debug)]
struct Transaction {
    changes: Vec<ListChange<Value>>,
    undoable: bool,
    /// Opened by `begin_compound_operation` rather than around a single call.
    explicit: bool,
}

impl Transaction {
    fn new(undoable: bool, explicit: bool) -> Self {
        Self {
            changes: Vec::new(),
            undoable,
            explicit,
        }
    }
}

#[derive(Debug)]
struct UndoHistory {
    undo_stack: VecDeque<Transaction>,
    redo_stack: Vec<Transaction>,
    open: Option<Transaction>,
    max_levels: usize,
}

impl UndoHistory {
    fn new(max_levels: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            open: None,
            max_levels,
        }
    }

    fn close(&mut self) {
        let Some(transaction) = self.open.take() else {
            return;
        };
        if !transaction.undoable || transaction.changes.is_empty() {
            return;
        }
        self.undo_stack.push_back(transaction);
        self.redo_stack.clear();
        while self.undo_stack.len() > self.max_levels {
            self.undo_stack.pop_front();
        }
    }

    fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

/// Marks the thread currently mutating the list through this handle.
struct LocalTag {
    depth: Cell<usize>,
    replaying: Cell<bool>,
}

struct UndoLog {
    list: Arc<ListCore>,
    history: Mutex<UndoHistory>,
    local: ReentrantMutex<LocalTag>,
    _capture: Subscription,
}

impl UndoLog {
    fn new(list: Arc<ListCore>, max_levels: usize) -> Arc<Self> {
        Arc::new_cyclic(|weak: &std::sync::Weak<UndoLog>| {
            let weak = weak.clone();
            let capture = list.changed().connect(move |change| {
                if let Some(log) = weak.upgrade() {
                    log.capture(change);
                }
            });
            UndoLog {
                list,
                history: Mutex::new(UndoHistory::new(max_levels)),
                local: ReentrantMutex::new(LocalTag {
                    depth: Cell::new(0),
                    replaying: Cell::new(false),
                }),
                _capture: capture,
            }
        })
    }

    fn is_local(&self) -> bool {
        // A different thread holding the tag means this change is not ours.
        match self.local.try_lock() {
            Some(tag) => tag.depth.get() > 0 && !tag.replaying.get(),
            None => false,
        }
    }

    fn capture(&self, change: &ListChange<Value>) {
        if !self.is_local() {
            return;
        }
        if let Some(open) = self.history.lock().open.as_mut() {
            open.changes.push(change.clone());
        }
    }

    /// Run a local mutation inside the open transaction, or a fresh one.
    fn record<R>(&self, mutation: impl FnOnce() -> Result<R>) -> Result<R> {
        self.list.ensure_live()?;
        // Held for the whole call so concurrent callers cannot split a transaction.
        let tag = self.local.lock();
        let implicit = {
            let mut history = self.history.lock();
            if history.open.is_none() {
                history.open = Some(Transaction::new(true, false));
                true
            } else {
                false
            }
        };

        tag.depth.set(tag.depth.get() + 1);
        let result = mutation();
        tag.depth.set(tag.depth.get() - 1);

        if implicit {
            self.history.lock().close();
        }
        result
    }

    fn replay(&self, changes: impl IntoIterator<Item = ListChange<Value>>) -> Result<()> {
        let tag = self.local.lock();
        tag.replaying.set(true);
        let result = changes
            .into_iter()
            .try_for_each(|change| apply(&self.list, &change));
        tag.replaying.set(false);
        result
    }

    fn undo(&self) -> Result<()> {
        self.list.ensure_live()?;
        let Some(transaction) = self.history.lock().undo_stack.pop_back() else {
            return Ok(());
        };
        let inverse = transaction.changes.iter().rev().map(ListChange::inverse);
        match self.replay(inverse.collect::<Vec<_>>()) {
            Ok(()) => {
                self.history.lock().redo_stack.push(transaction);
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "undo failed, discarding history");
                self.history.lock().clear();
                Err(err)
            }
        }
    }

    fn redo(&self) -> Result<()> {
        self.list.ensure_live()?;
        let Some(transaction) = self.history.lock().redo_stack.pop() else {
            return Ok(());
        };
        match self.replay(transaction.changes.clone()) {
            Ok(()) => {
                self.history.lock().undo_stack.push_back(transaction);
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "redo failed, discarding history");
                self.history.lock().clear();
                Err(err)
            }
        }
    }
}

/// A [`SharedList`] with a local undo/redo history.
///
/// Every mutating call forms its own transaction unless a compound operation
/// is open, in which case it joins that one.
pub struct UndoableSharedList<T> {
    list: SharedList<T>,
    log: Arc<UndoLog>,
}

impl<T> Clone for UndoableSharedList<T> {
    fn clone(&self) -> Self {
        Self {
            list: self.list.clone(),
            log: self.log.clone(),
        }
    }
}

impl<T> UndoableSharedList<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(primitive: ListRef) -> Self {
        Self::with_max_undo_levels(primitive, DEFAULT_MAX_UNDO_LEVELS)
    }

    pub fn with_max_undo_levels(primitive: ListRef, max_levels: usize) -> Self {
        let list = SharedList::new(primitive);
        let log = UndoLog::new(list.core().clone(), max_levels);
        Self { list, log }
    }

    /// View the same list and history with a different element type.
    pub fn cast<U: Serialize + DeserializeOwned>(&self) -> UndoableSharedList<U> {
        UndoableSharedList {
            list: self.list.cast(),
            log: self.log.clone(),
        }
    }

    /// The list without undo tracking. Mutations made through it are not
    /// recorded.
    pub fn untracked(&self) -> &SharedList<T> {
        &self.list
    }

    pub fn primitive(&self) -> ListRef {
        self.list.primitive()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.list.get(index)
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.list.to_vec()
    }

    pub fn iter(&self) -> std::vec::IntoIter<T> {
        self.list.iter()
    }

    pub fn set(&self, index: usize, value: &T) -> Result<T> {
        self.log.record(|| self.list.set(index, value))
    }

    pub fn push(&self, value: &T) -> Result<usize> {
        self.log.record(|| self.list.push(value))
    }

    pub fn insert(&self, index: usize, value: &T) -> Result<usize> {
        self.log.record(|| self.list.insert(index, value))
    }

    pub fn push_all(&self, values: &[T]) -> Result<usize> {
        self.log.record(|| self.list.push_all(values))
    }

    pub fn insert_all(&self, index: usize, values: &[T]) -> Result<usize> {
        self.log.record(|| self.list.insert_all(index, values))
    }

    pub fn move_item(&self, from: usize, to: usize) -> Result<()> {
        self.log.record(|| self.list.move_item(from, to))
    }

    pub fn remove(&self, index: usize) -> Result<Option<T>> {
        self.log.record(|| self.list.remove(index))
    }

    pub fn remove_value(&self, value: &T) -> Result<Option<usize>> {
        self.log.record(|| self.list.remove_value(value))
    }

    pub fn remove_range(&self, start: usize, end: usize) -> Result<usize> {
        self.log.record(|| self.list.remove_range(start, end))
    }

    pub fn clear(&self) -> Result<()> {
        self.log.record(|| self.list.clear())
    }

    pub fn connect(&self, listener: impl Fn(&ListChange<T>) + Send + Sync + 'static) -> Subscription
    where
        T: 'static,
    {
        self.list.connect(listener)
    }

    pub fn can_undo(&self) -> bool {
        !self.log.history.lock().undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.log.history.lock().redo_stack.is_empty()
    }

    pub fn undo_stack_size(&self) -> usize {
        self.log.history.lock().undo_stack.len()
    }

    pub fn redo_stack_size(&self) -> usize {
        self.log.history.lock().redo_stack.len()
    }

    /// Revert the most recent transaction. No-op when there is none.
    pub fn undo(&self) -> Result<()> {
        self.log.undo()
    }

    /// Re-apply the most recently undone transaction. No-op when there is none.
    pub fn redo(&self) -> Result<()> {
        self.log.redo()
    }

    /// Start grouping calls into one transaction. A begin while one is
    /// already open joins it.
    pub fn begin_compound_operation(&self, is_undoable: bool) {
        let mut history = self.log.history.lock();
        if history.open.is_some() {
            debug!("joining open compound operation");
            return;
        }
        history.open = Some(Transaction::new(is_undoable, true));
    }

    pub fn end_compound_operation(&self) {
        let mut history = self.log.history.lock();
        if history.open.as_ref().is_some_and(|open| open.explicit) {
            history.close();
        }
    }

    /// Forget all history. Content is left as is.
    pub fn clear_undo(&self) {
        self.log.history.lock().clear();
    }

    /// Bind to a different collaborative list. History is dropped when the
    /// content changes.
    pub fn rebind(&self, primitive: ListRef) -> Result<()> {
        if self.log.list.rebind(primitive)? {
            self.clear_undo();
        }
        Ok(())
    }

    pub fn dispose(&self) {
        self.list.dispose();
        let mut history = self.log.history.lock();
        history.open = None;
        history.clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.list.is_disposed()
    }
}

impl<T> fmt::Debug for UndoableSharedList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let history = self.log.history.lock();
        f.debug_struct("UndoableSharedList")
            .field("list", &self.list)
            .field("undo", &history.undo_stack.len())
            .field("redo", &history.redo_stack.len())
            .finish()
    }
}
