//! Per-record undo/redo history
//!
//! Each tracked key owns an undo stack seeded with the value it had before
//! its first edit, and a redo stack. Values are `Option<Arc<Record>>`, where
//! `None` is a deletion.
//!
//! The oldest snapshot on an undo stack is never popped: undoing past it
//! reports [`HistoryEntry::NoHistory`] and leaves the stack as it was.

use crate::record::{Record, RecordKey};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Result of an undo or redo step
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryEntry {
    /// Nothing to step to; the caller keeps the live value
    NoHistory,
    /// The record did not exist at this point in history
    Deleted,
    /// The record's value at this point in history
    Value(Arc<Record>),
}

impl From<Option<Arc<Record>>> for HistoryEntry {
    fn from(value: Option<Arc<Record>>) -> Self {
        value.map_or(Self::Deleted, Self::Value)
    }
}

#[derive(Debug, Clone, Default)]
struct Stacks {
    undo: Vec<Option<Arc<Record>>>,
    redo: Vec<Option<Arc<Record>>>,
}

/// Undo/redo stacks for every key edited so far
#[derive(Debug, Clone, Default)]
pub struct EditHistory {
    stacks: HashMap<RecordKey, Stacks>,
}

impl EditHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `key` with its current value.
    ///
    /// Does nothing if the key is already tracked.
    pub fn init(&mut self, key: &RecordKey, current: Option<Arc<Record>>) {
        self.stacks.entry(key.clone()).or_insert_with(|| Stacks {
            undo: vec![current],
            redo: Vec::new(),
        });
    }

    /// Push a new value for a tracked key and clear its redo stack.
    ///
    /// Returns `false` without recording anything if the key was never
    /// initialized.
    pub fn record(&mut self, key: &str, value: Option<Arc<Record>>) -> bool {
        let Some(stacks) = self.stacks.get_mut(key) else {
            warn!(key, "edit recorded for untracked key");
            return false;
        };
        stacks.undo.push(value);
        stacks.redo.clear();
        true
    }

    /// Step `key` one edit back, returning the value it should now have
    pub fn undo(&mut self, key: &str) -> HistoryEntry {
        let Some(stacks) = self.stacks.get_mut(key) else {
            return HistoryEntry::NoHistory;
        };
        if stacks.undo.len() <= 1 {
            return HistoryEntry::NoHistory;
        }
        if let Some(top) = stacks.undo.pop() {
            stacks.redo.push(top);
        }
        stacks
            .undo
            .last()
            .cloned()
            .map_or(HistoryEntry::NoHistory, HistoryEntry::from)
    }

    /// Re-apply the most recently undone edit of `key`
    pub fn redo(&mut self, key: &str) -> HistoryEntry {
        let Some(stacks) = self.stacks.get_mut(key) else {
            return HistoryEntry::NoHistory;
        };
        let Some(value) = stacks.redo.pop() else {
            return HistoryEntry::NoHistory;
        };
        stacks.undo.push(value.clone());
        value.into()
    }

    /// Undo depth of `key` (0 if untracked)
    #[must_use]
    pub fn depth(&self, key: &str) -> usize {
        self.stacks.get(key).map_or(0, |s| s.undo.len())
    }

    /// Redo depth of `key` (0 if untracked)
    #[must_use]
    pub fn redo_depth(&self, key: &str) -> usize {
        self.stacks.get(key).map_or(0, |s| s.redo.len())
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.stacks.contains_key(key)
    }

    /// Number of tracked keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    pub fn clear(&mut self) {
        self.stacks.clear();
    }
}
