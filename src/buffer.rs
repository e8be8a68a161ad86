//! Dirty record buffer
//!
//! Holds the latest value of every record edited since the last successful
//! save. A value of `None` marks a deletion. Repeated edits to one key
//! overwrite the buffered entry in place, so the buffer never grows past one
//! entry per key.

use crate::record::{Record, RecordKey};
use std::collections::HashMap;
use std::sync::Arc;

/// One buffered key
#[derive(Debug, Clone, PartialEq)]
pub struct Pending {
    pub key: RecordKey,
    /// Value to write, or `None` for a deletion
    pub value: Option<Arc<Record>>,
    /// Last value of a deleted record, kept so its files can be backed up
    pub removed: Option<Arc<Record>>,
}

impl Pending {
    #[must_use]
    pub const fn is_deletion(&self) -> bool {
        self.value.is_none()
    }
}

/// Keys with unsaved edits, in first-marked order
#[derive(Debug, Clone, Default)]
pub struct DirtyBuffer {
    entries: Vec<Pending>,
    positions: HashMap<RecordKey, usize>,
}

impl DirtyBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or overwrite the buffered value of `key`
    pub fn mark_dirty(&mut self, key: RecordKey, value: Option<Arc<Record>>) {
        self.put(Pending {
            key,
            value,
            removed: None,
        });
    }

    /// Buffer the deletion of `key`, remembering the record that was removed
    pub fn mark_deleted(&mut self, key: RecordKey, removed: Option<Arc<Record>>) {
        self.put(Pending {
            key,
            value: None,
            removed,
        });
    }

    fn put(&mut self, mut pending: Pending) {
        if let Some(&pos) = self.positions.get(&pending.key) {
            let slot = &mut self.entries[pos];
            // a deletion with no known value keeps the one seen earlier
            if pending.is_deletion() && pending.removed.is_none() {
                pending.removed = slot.value.clone().or_else(|| slot.removed.clone());
            }
            *slot = pending;
            return;
        }
        self.positions.insert(pending.key.clone(), self.entries.len());
        self.entries.push(pending);
    }

    /// Take every buffered entry, leaving the buffer empty
    pub fn drain(&mut self) -> Vec<Pending> {
        self.positions.clear();
        std::mem::take(&mut self.entries)
    }

    /// Put back entries from a failed save.
    ///
    /// Keys marked again since the drain keep their newer value.
    pub fn restore(&mut self, entries: Vec<Pending>) {
        for pending in entries {
            if !self.positions.contains_key(&pending.key) {
                self.put(pending);
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.positions.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.positions.contains_key(key)
    }

    /// Buffered value of `key`; `Some(None)` means a pending deletion
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Option<&Arc<Record>>> {
        self.positions
            .get(key)
            .map(|&pos| self.entries[pos].value.as_ref())
    }

    pub fn keys(&self) -> impl Iterator<Item = &RecordKey> + '_ {
        self.entries.iter().map(|pending| &pending.key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pending> + '_ {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::record;

    fn value(k: &str, caption: &str) -> Option<Arc<Record>> {
        Some(Arc::new(record(k, caption)))
    }

    fn key(k: &str) -> RecordKey {
        RecordKey::new(k)
    }

    #[test]
    fn test_repeated_marks_overwrite() {
        let mut buffer = DirtyBuffer::new();
        buffer.mark_dirty(key("a"), value("a", "solo"));
        buffer.mark_dirty(key("a"), value("a", "smile"));

        assert_eq!(buffer.len(), 1);
        let current = buffer.get("a").unwrap().unwrap();
        assert_eq!(current.caption.as_ref().unwrap().to_string(), "smile");
    }

    #[test]
    fn test_deletion_is_buffered_as_none() {
        let mut buffer = DirtyBuffer::new();
        buffer.mark_deleted(key("a"), value("a", "solo"));
        assert_eq!(buffer.get("a"), Some(None));
        assert_eq!(buffer.get("b"), None);

        let pending = buffer.iter().next().unwrap();
        assert!(pending.is_deletion());
        assert!(pending.removed.is_some());
    }

    #[test]
    fn test_deletion_keeps_earlier_value() {
        let mut buffer = DirtyBuffer::new();
        buffer.mark_dirty(key("a"), value("a", "solo"));
        buffer.mark_deleted(key("a"), None);

        let pending = buffer.drain().pop().unwrap();
        assert!(pending.is_deletion());
        assert_eq!(pending.removed, value("a", "solo"));
    }

    #[test]
    fn test_drain_empties_in_order() {
        let mut buffer = DirtyBuffer::new();
        for k in ["b", "a", "c"] {
            buffer.mark_dirty(key(k), value(k, ""));
        }
        let drained: Vec<_> = buffer.drain().into_iter().map(|p| p.key.into_string()).collect();
        assert_eq!(drained, ["b", "a", "c"]);
        assert!(buffer.is_empty());
        assert!(!buffer.contains("a"));
    }

    #[test]
    fn test_restore_keeps_newer_marks() {
        let mut buffer = DirtyBuffer::new();
        buffer.mark_dirty(key("a"), value("a", "old"));
        buffer.mark_dirty(key("b"), value("b", "old"));
        let drained = buffer.drain();

        buffer.mark_dirty(key("a"), value("a", "new"));
        buffer.restore(drained);

        assert_eq!(buffer.len(), 2);
        let a = buffer.get("a").unwrap().unwrap();
        assert_eq!(a.caption.as_ref().unwrap().to_string(), "new");
        assert!(buffer.contains("b"));
    }
}
