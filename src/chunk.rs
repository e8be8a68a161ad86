//! Fixed-size pagination over an ordered snapshot
//!
//! A [`ChunkedView`] copies the key order of a store at construction time, so
//! later inserts do not shift pages that are already open.
//!
//! Internal chunk indices are zero-based. Page numbers shown to users are
//! one-based and go through [`ChunkedView::correct_index`] first.

use crate::record::RecordKey;
use crate::store::Store;

/// Snapshot of a store's key order cut into pages
#[derive(Debug, Clone, Default)]
pub struct ChunkedView {
    keys: Vec<RecordKey>,
    chunk_size: Option<usize>,
}

impl ChunkedView {
    /// Snapshot `store`. A `chunk_size` of `None` or `0` disables paging.
    #[must_use]
    pub fn new(store: &Store, chunk_size: Option<usize>) -> Self {
        Self::from_keys(store.keys().cloned().collect(), chunk_size)
    }

    #[must_use]
    pub fn from_keys(keys: Vec<RecordKey>, chunk_size: Option<usize>) -> Self {
        Self {
            keys,
            chunk_size: chunk_size.filter(|&size| size > 0),
        }
    }

    #[must_use]
    pub const fn chunk_size(&self) -> Option<usize> {
        self.chunk_size
    }

    /// Number of keys in the snapshot
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// `ceil(len / chunk_size)`, or 1 when paging is disabled
    #[must_use]
    pub fn num_chunks(&self) -> usize {
        self.chunk_size.map_or(1, |size| self.keys.len().div_ceil(size))
    }

    /// Clamp a one-based page number into `[1, num_chunks]`.
    ///
    /// `None` and `0` map to the first page; an empty snapshot still has page 1.
    #[must_use]
    pub fn correct_index(&self, requested: Option<usize>) -> usize {
        let last = self.num_chunks().max(1);
        requested.unwrap_or(1).clamp(1, last)
    }

    /// Keys of the zero-based chunk `index`; empty when out of range
    #[must_use]
    pub fn chunk(&self, index: usize) -> &[RecordKey] {
        let Some(size) = self.chunk_size else {
            return if index == 0 { &self.keys } else { &[] };
        };
        let start = index.saturating_mul(size);
        if start >= self.keys.len() {
            return &[];
        }
        let end = start.saturating_add(size).min(self.keys.len());
        &self.keys[start..end]
    }

    /// Keys of the one-based page `requested`, after correction.
    ///
    /// Returns the corrected page number along with the keys.
    #[must_use]
    pub fn page(&self, requested: Option<usize>) -> (usize, &[RecordKey]) {
        let page = self.correct_index(requested);
        (page, self.chunk(page - 1))
    }

    /// All keys in snapshot order
    #[must_use]
    pub fn keys(&self) -> &[RecordKey] {
        &self.keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::record;

    fn store(n: usize) -> Store {
        (0..n).map(|i| record(&format!("k{i:02}"), "")).collect()
    }

    #[test]
    fn test_num_chunks_rounds_up() {
        assert_eq!(ChunkedView::new(&store(10), Some(3)).num_chunks(), 4);
        assert_eq!(ChunkedView::new(&store(9), Some(3)).num_chunks(), 3);
        assert_eq!(ChunkedView::new(&store(0), Some(3)).num_chunks(), 0);
        assert_eq!(ChunkedView::new(&store(10), None).num_chunks(), 1);
    }

    #[test]
    fn test_chunks_concatenate_to_snapshot() {
        let store = store(10);
        let view = ChunkedView::new(&store, Some(3));
        let joined: Vec<_> = (0..view.num_chunks())
            .flat_map(|i| view.chunk(i).iter().cloned())
            .collect();
        let expected: Vec<_> = store.keys().cloned().collect();
        assert_eq!(joined, expected);
        assert_eq!(view.chunk(3).len(), 1);
    }

    #[test]
    fn test_out_of_range_chunk_is_empty() {
        let view = ChunkedView::new(&store(10), Some(3));
        assert!(view.chunk(4).is_empty());
        assert!(view.chunk(usize::MAX).is_empty());

        let unchunked = ChunkedView::new(&store(4), None);
        assert_eq!(unchunked.chunk(0).len(), 4);
        assert!(unchunked.chunk(1).is_empty());
    }

    #[test]
    fn test_correct_index_clamps() {
        let view = ChunkedView::new(&store(10), Some(3));
        assert_eq!(view.correct_index(None), 1);
        assert_eq!(view.correct_index(Some(0)), 1);
        assert_eq!(view.correct_index(Some(2)), 2);
        assert_eq!(view.correct_index(Some(99)), 4);
        assert_eq!(ChunkedView::new(&store(0), Some(3)).correct_index(Some(5)), 1);
    }

    #[test]
    fn test_page_is_one_based() {
        let view = ChunkedView::new(&store(5), Some(2));
        let (page, keys) = view.page(Some(3));
        assert_eq!(page, 3);
        assert_eq!(keys, [RecordKey::new("k04")]);
    }

    #[test]
    fn test_zero_chunk_size_disables_paging() {
        let view = ChunkedView::new(&store(5), Some(0));
        assert_eq!(view.chunk_size(), None);
        assert_eq!(view.num_chunks(), 1);
    }

    #[test]
    fn test_view_is_a_snapshot() {
        let mut store = store(2);
        let view = ChunkedView::new(&store, Some(10));
        store.insert(record("late", ""));
        assert_eq!(view.len(), 2);
    }
}
