//! Ordered record store
//!
//! [`Store`] owns the canonical key -> record mapping. Iteration follows
//! insertion order, which is what keeps pagination stable; replacing an
//! existing key keeps its position.
//!
//! Records are held behind `Arc`, so a subset derived with [`Store::subset`]
//! shares the very same records instead of copying them.

mod load;
mod sort;

pub use sort::SortKey;

pub(crate) use load::entry_value;

use crate::record::{Record, RecordKey};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Slot {
    seq: u64,
    record: Arc<Record>,
}

/// Insertion-ordered mapping from [`RecordKey`] to shared [`Record`]s
#[derive(Debug, Clone, Default)]
pub struct Store {
    order: BTreeMap<u64, RecordKey>,
    entries: HashMap<RecordKey, Slot>,
    next_seq: u64,
}

impl Store {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
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
    pub fn get(&self, key: &str) -> Option<&Arc<Record>> {
        self.entries.get(key).map(|slot| &slot.record)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace the record under `key`.
    ///
    /// A new key is appended at the end; an existing key keeps its position.
    /// Returns the record that was replaced, if any.
    pub fn set(&mut self, key: RecordKey, record: impl Into<Arc<Record>>) -> Option<Arc<Record>> {
        let record = record.into();
        if let Some(slot) = self.entries.get_mut(&key) {
            return Some(std::mem::replace(&mut slot.record, record));
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, key.clone());
        self.entries.insert(key, Slot { seq, record });
        None
    }

    /// Insert a record under its own key
    pub fn insert(&mut self, record: impl Into<Arc<Record>>) -> Option<Arc<Record>> {
        let record = record.into();
        self.set(record.key().clone(), record)
    }

    /// Remove `key`, returning its record if it was present
    pub fn delete(&mut self, key: &str) -> Option<Arc<Record>> {
        let slot = self.entries.remove(key)?;
        self.order.remove(&slot.seq);
        Some(slot.record)
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }

    /// Keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &RecordKey> + '_ {
        self.order.values()
    }

    /// Records in insertion order
    pub fn values(&self) -> impl Iterator<Item = &Arc<Record>> + '_ {
        self.items().map(|(_, record)| record)
    }

    /// Key/record pairs in insertion order
    pub fn items(&self) -> impl Iterator<Item = (&RecordKey, &Arc<Record>)> + '_ {
        self.order
            .values()
            .filter_map(|key| self.entries.get(key).map(|slot| (key, &slot.record)))
    }

    /// Unordered set of every key
    #[must_use]
    pub fn key_set(&self) -> HashSet<RecordKey> {
        self.entries.keys().cloned().collect()
    }

    /// New store holding the records matching `predicate`, in the same order.
    ///
    /// The records are shared with `self`, not copied.
    #[must_use]
    pub fn subset<F>(&self, predicate: F) -> Self
    where
        F: Fn(&Record) -> bool,
    {
        self.items()
            .filter(|&(_, record)| predicate(&**record))
            .map(|(key, record)| (key.clone(), Arc::clone(record)))
            .collect()
    }

    /// New store holding `keys` (in the given order) that exist in `self`
    #[must_use]
    pub fn select<'a, I>(&self, keys: I) -> Self
    where
        I: IntoIterator<Item = &'a RecordKey>,
    {
        keys.into_iter()
            .filter_map(|key| self.get(key.as_str()).map(|r| (key.clone(), Arc::clone(r))))
            .collect()
    }
}

impl FromIterator<(RecordKey, Arc<Record>)> for Store {
    fn from_iter<T: IntoIterator<Item = (RecordKey, Arc<Record>)>>(iter: T) -> Self {
        let mut store = Self::new();
        store.extend(iter);
        store
    }
}

impl FromIterator<Record> for Store {
    fn from_iter<T: IntoIterator<Item = Record>>(iter: T) -> Self {
        iter.into_iter()
            .map(|record| (record.key().clone(), Arc::new(record)))
            .collect()
    }
}

impl Extend<(RecordKey, Arc<Record>)> for Store {
    fn extend<T: IntoIterator<Item = (RecordKey, Arc<Record>)>>(&mut self, iter: T) {
        for (key, record) in iter {
            self.set(key, record);
        }
    }
}
