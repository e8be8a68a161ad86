//! Editing session over one store
//!
//! [`Session`] owns the store and every structure derived from it: the lazily
//! built tag index, the edit history, the dirty buffer and the active subset.
//! All mutations go through one commit path which, per key, patches the index,
//! records history, marks the key dirty and propagates the new value into the
//! active subset.
//!
//! Every mutating method takes `&mut self`, so at most one commit is in
//! flight at a time.

use crate::batch::{BatchEditor, BatchOutcome, CancelToken, EditOutcome};
use crate::buffer::DirtyBuffer;
use crate::chunk::ChunkedView;
use crate::config::StoreConfig;
use crate::history::{EditHistory, HistoryEntry};
use crate::index::TagIndex;
use crate::ops::CaptionEdit;
use crate::persist::{PersistError, PersistenceManager, SaveReport};
use crate::query::{Query, QueryEngine, QueryResult};
use crate::record::{Record, RecordKey};
use crate::store::{SortKey, Store};
use crate::{Result, StoreError};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One page of the active subset
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// One-based page number after correction
    pub index: usize,
    /// Number of pages
    pub total: usize,
    pub records: Vec<Arc<Record>>,
}

/// Where a committed value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// A new edit, recorded in history
    Edit,
    /// A step through history, not recorded again
    History,
}

/// Store plus index, history, dirty buffer and active subset
#[derive(Debug)]
pub struct Session {
    store: Store,
    index: Option<TagIndex>,
    history: EditHistory,
    buffer: DirtyBuffer,
    subset: Option<Store>,
    chunk_size: Option<usize>,
    chunk_index: usize,
    persistence: PersistenceManager,
    editor: BatchEditor,
}

fn load_source(path: &Path, config: &StoreConfig) -> Result<Store> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if path.is_file() && is_json {
        Ok(Store::load_json(path)?)
    } else if path.is_dir() {
        Ok(Store::load_dir(path, &config.image_extensions, config.recursive)?)
    } else {
        Err(StoreError::InvalidInput(format!(
            "Unsupported source: {}",
            path.display()
        )))
    }
}

impl Session {
    /// Session over an already loaded store
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Config` if the persistence settings are invalid.
    pub fn new(store: Store, config: &StoreConfig) -> Result<Self> {
        Ok(Self {
            store,
            index: None,
            history: EditHistory::new(),
            buffer: DirtyBuffer::new(),
            subset: None,
            chunk_size: config.chunk_size,
            chunk_index: 1,
            persistence: PersistenceManager::new(config)?,
            editor: BatchEditor::new(config.max_workers),
        })
    }

    /// Load every source of `config` and overlay the database file.
    ///
    /// Records also present in the database take its values but keep the
    /// image path found on disk. Records missing from the database start out
    /// dirty, and with `formalize_caption` every record is formalized and
    /// marked dirty.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Config` for invalid settings, `StoreError::InvalidInput`
    /// for a source that is neither a JSON file nor a directory, and
    /// `StoreError::Persist` if a source cannot be read.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        config.validate()?;

        let mut store = Store::new();
        for source in &config.sources {
            let loaded = load_source(source, config)?;
            store.extend(loaded.items().map(|(k, r)| (k.clone(), Arc::clone(r))));
        }

        let database = match config.database_file.as_deref().filter(|p| p.is_file()) {
            Some(path) => match Store::load_json(path) {
                Ok(database) => Some(database),
                Err(PersistError::Parse { path, source }) => {
                    warn!(path, error = %source, "database file is corrupted, ignoring it on open");
                    None
                }
                Err(e) => return Err(e.into()),
            },
            None => None,
        };

        let mut fresh = Vec::new();
        if let Some(database) = &database {
            let keys: Vec<RecordKey> = store.keys().cloned().collect();
            for key in keys {
                let Some(saved) = database.get(key.as_str()) else {
                    fresh.push(key);
                    continue;
                };
                let Some(image_path) = store.get(key.as_str()).map(|r| r.image_path.clone()) else {
                    continue;
                };
                let mut record = Record::clone(saved);
                record.image_path = image_path;
                store.set(key, record);
            }
        }

        let mut session = Self::new(store, config)?;
        if config.formalize_caption {
            let keys: Vec<RecordKey> = session.store.keys().cloned().collect();
            for key in keys {
                let Some(record) = session.store.get(key.as_str()) else {
                    continue;
                };
                let mut record = Record::clone(record);
                record.caption = record.caption.take().map(|c| c.formalized());
                let record = Arc::new(record);
                session.store.set(key.clone(), Arc::clone(&record));
                session.buffer.mark_dirty(key, Some(record));
            }
        } else {
            for key in fresh {
                let value = session.store.get(key.as_str()).cloned();
                session.buffer.mark_dirty(key, value);
            }
        }

        info!(
            total = session.store.len(),
            buffer = session.buffer.len(),
            categories = session.categories().len(),
            "opened session"
        );
        Ok(session)
    }

    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    /// The active subset, or the whole store when none is set
    #[must_use]
    pub fn active(&self) -> &Store {
        self.subset.as_ref().unwrap_or(&self.store)
    }

    #[must_use]
    pub const fn history(&self) -> &EditHistory {
        &self.history
    }

    #[must_use]
    pub const fn buffer(&self) -> &DirtyBuffer {
        &self.buffer
    }

    #[must_use]
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Keys with unsaved edits
    #[must_use]
    pub fn pending_keys(&self) -> Vec<&RecordKey> {
        self.buffer.keys().collect()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Arc<Record>> {
        self.store.get(key)
    }

    /// Whether the tag index has been built
    #[must_use]
    pub const fn index_built(&self) -> bool {
        self.index.is_some()
    }

    /// The tag index, built on first use
    pub fn index(&mut self) -> &TagIndex {
        self.index.get_or_insert_with(|| TagIndex::build(&self.store))
    }

    /// Store `record` under its key, recording the edit.
    ///
    /// Returns `false` without touching anything if the record equals the
    /// current value.
    pub fn set(&mut self, record: Record) -> bool {
        let key = record.key().clone();
        if self.store.get(key.as_str()).is_some_and(|current| **current == record) {
            return false;
        }
        self.commit(&key, Some(Arc::new(record)), Origin::Edit);
        true
    }

    /// Remove `key`, recording the deletion
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the key is not in the store.
    pub fn remove(&mut self, key: &str) -> Result<Arc<Record>> {
        let record = self
            .store
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        self.commit(record.key(), None, Origin::Edit);
        Ok(record)
    }

    /// Step `key` one edit back
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the key has no history and is not in
    /// the store.
    pub fn undo(&mut self, key: &str) -> Result<HistoryEntry> {
        let entry = self.history.undo(key);
        self.apply_history(key, entry)
    }

    /// Re-apply the most recently undone edit of `key`
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the key has no history and is not in
    /// the store.
    pub fn redo(&mut self, key: &str) -> Result<HistoryEntry> {
        let entry = self.history.redo(key);
        self.apply_history(key, entry)
    }

    fn apply_history(&mut self, key: &str, entry: HistoryEntry) -> Result<HistoryEntry> {
        let key = RecordKey::new(key);
        match &entry {
            HistoryEntry::NoHistory if !self.store.contains(key.as_str()) => {
                return Err(StoreError::NotFound(key.into_string()));
            }
            HistoryEntry::NoHistory => {}
            HistoryEntry::Value(record) => self.commit(&key, Some(Arc::clone(record)), Origin::History),
            HistoryEntry::Deleted => self.commit(&key, None, Origin::History),
        }
        Ok(entry)
    }

    /// Apply `edit` to the record under `key`
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the key is not in the store.
    pub fn edit(&mut self, key: &str, edit: &CaptionEdit) -> Result<bool> {
        let record = self
            .store
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        match edit.apply(record) {
            EditOutcome::Changed(record) => Ok(self.set(record)),
            EditOutcome::Unchanged => Ok(false),
        }
    }

    /// Apply `edit` to every record of the active subset on the worker pool.
    ///
    /// Results are committed one by one in subset order once all workers are
    /// done. A cancelled batch commits nothing.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::WorkerPool` if the pool cannot be started.
    pub fn batch_edit<F>(&mut self, edit: F, cancel: &CancelToken) -> Result<BatchOutcome>
    where
        F: Fn(&Record) -> EditOutcome + Sync,
    {
        let records: Vec<Arc<Record>> = self.active().values().cloned().collect();
        let outcome = self.editor.run(&records, edit, cancel)?;
        if let BatchOutcome::Completed(outcomes) = &outcome {
            let mut committed = 0;
            for outcome in outcomes {
                if let EditOutcome::Changed(record) = outcome
                    && self.set(record.clone())
                {
                    committed += 1;
                }
            }
            info!(total = records.len(), committed, "committed batch edit");
        }
        Ok(outcome)
    }

    /// Apply a caption edit to every record of the active subset
    ///
    /// # Errors
    ///
    /// Returns `StoreError::WorkerPool` if the pool cannot be started.
    pub fn batch_caption_edit(&mut self, edit: &CaptionEdit, cancel: &CancelToken) -> Result<BatchOutcome> {
        self.batch_edit(|record| edit.apply(record), cancel)
    }

    /// Run `query` over the active subset and make the result the new subset
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Query` for an invalid regex pattern; the active
    /// subset is left unchanged in that case.
    pub fn query(&mut self, query: &Query) -> Result<QueryResult> {
        let index = self.index.get_or_insert_with(|| TagIndex::build(&self.store));
        let active = self.subset.as_ref().unwrap_or(&self.store);
        let result = QueryEngine::new(index).evaluate(query, active)?;
        info!(
            matched = result.len(),
            searched = result.searched,
            "querying matches"
        );
        self.subset = Some(self.store.select(&result.keys));
        self.chunk_index = 1;
        Ok(result)
    }

    /// Write buffered edits to the configured sinks
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Persist` on I/O failure; the buffer keeps its
    /// entries for a retry.
    pub fn save(&mut self) -> Result<SaveReport> {
        Ok(self.persistence.save(&self.store, &mut self.buffer)?)
    }

    /// Sorted, distinct categories of the store
    #[must_use]
    pub fn categories(&self) -> Vec<String> {
        self.store
            .values()
            .map(|r| r.category().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Make the records of `category` the active subset; `None` shows everything
    pub fn change_to_category(&mut self, category: Option<&str>) {
        self.subset = category.map(|c| self.store.subset(|r| r.category() == c));
        self.chunk_index = 1;
    }

    /// Drop the active subset
    pub fn reset_subset(&mut self) {
        self.subset = None;
        self.chunk_index = 1;
    }

    /// Replace the active subset by a sorted copy of itself
    pub fn sorted_subset(&mut self, key: SortKey, reverse: bool) {
        self.subset = Some(self.active().sorted_by(key, reverse));
        self.chunk_index = 1;
    }

    /// One-based page number last shown
    #[must_use]
    pub const fn chunk_index(&self) -> usize {
        self.chunk_index
    }

    /// Page `requested` (one-based, corrected into range) of the active subset
    pub fn show_chunk(&mut self, requested: Option<usize>) -> Page {
        let view = ChunkedView::new(self.active(), self.chunk_size);
        let (index, keys) = view.page(requested);
        let records = keys
            .iter()
            .filter_map(|k| self.active().get(k.as_str()).cloned())
            .collect();
        self.chunk_index = index;
        Page {
            index,
            total: view.num_chunks(),
            records,
        }
    }

    /// Every indexed tag with its record count, most frequent first
    pub fn tag_list(&mut self) -> Vec<(String, usize)> {
        self.index()
            .tags_by_frequency()
            .into_iter()
            .map(|(tag, count)| (tag.to_string(), count))
            .collect()
    }

    /// Swap in a new store.
    ///
    /// The tag index is dropped and rebuilt on next use, and the active subset
    /// is reset. History and unsaved edits are kept.
    pub fn replace_store(&mut self, store: Store) {
        self.store = store;
        self.index = None;
        self.reset_subset();
        debug!(total = self.store.len(), "replaced store, tag index invalidated");
    }

    /// The single commit path for every mutation of `key`
    fn commit(&mut self, key: &RecordKey, value: Option<Arc<Record>>, origin: Origin) {
        let old = self.store.get(key.as_str()).cloned();

        if let Some(index) = &mut self.index {
            match &value {
                Some(new) => index.update(
                    key,
                    old.as_ref().and_then(|r| r.caption.as_ref()),
                    new.caption.as_ref(),
                ),
                None => index.remove_key(key.as_str()),
            }
        }

        if origin == Origin::Edit {
            self.history.init(key, old.clone());
            self.history.record(key.as_str(), value.clone());
        }

        match &value {
            Some(record) => {
                self.store.set(key.clone(), Arc::clone(record));
                self.buffer.mark_dirty(key.clone(), Some(Arc::clone(record)));
            }
            None => {
                self.store.delete(key.as_str());
                self.buffer.mark_deleted(key.clone(), old.clone());
            }
        }

        if let Some(subset) = &mut self.subset {
            match value {
                Some(record) if subset.contains(key.as_str()) => {
                    subset.set(key.clone(), record);
                }
                // a record brought back from deletion rejoins the subset
                Some(record) if old.is_none() && origin == Origin::History => {
                    subset.set(key.clone(), record);
                }
                Some(_) => {}
                None => {
                    subset.delete(key.as_str());
                }
            }
        }
        debug!(key = %key, ?origin, "committed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Condition;
    use crate::record::Caption;
    use crate::testing::{TestDir, record, record_at};

    fn session(records: Vec<Record>) -> Session {
        Session::new(records.into_iter().collect(), &StoreConfig::default()).unwrap()
    }

    fn caption(session: &Session, key: &str) -> String {
        session.get(key).unwrap().caption.as_ref().unwrap().to_string()
    }

    #[test]
    fn test_set_equal_record_is_skipped() {
        let mut session = session(vec![record("a", "1girl")]);
        assert!(!session.set(record("a", "1girl")));
        assert_eq!(session.buffer_len(), 0);
        assert!(!session.history().contains("a"));
    }

    #[test]
    fn test_edit_then_undo_restores_caption() {
        let mut session = session(vec![record("a", "1girl, solo"), record("b", "")]);
        assert!(session.edit("a", &CaptionEdit::remove(["solo"])).unwrap());
        assert_eq!(caption(&session, "a"), "1girl");
        assert_eq!(session.history().depth("a"), 2);

        let entry = session.undo("a").unwrap();
        assert!(matches!(entry, HistoryEntry::Value(_)));
        assert_eq!(caption(&session, "a"), "1girl, solo");
        assert_eq!(session.undo("a").unwrap(), HistoryEntry::NoHistory);
    }

    #[test]
    fn test_undo_unknown_key_is_not_found() {
        let mut session = session(vec![record("a", "")]);
        assert!(matches!(session.undo("zz"), Err(StoreError::NotFound(_))));
        assert_eq!(session.undo("a").unwrap(), HistoryEntry::NoHistory);
    }

    #[test]
    fn test_remove_then_undo_reinserts() {
        let mut session = session(vec![record("a", "1girl"), record("b", "solo")]);
        session.change_to_category(Some("images"));
        session.remove("a").unwrap();
        assert!(session.get("a").is_none());
        assert!(!session.active().contains("a"));
        assert!(matches!(session.remove("a"), Err(StoreError::NotFound(_))));

        session.undo("a").unwrap();
        assert_eq!(caption(&session, "a"), "1girl");
        assert!(session.active().contains("a"));

        assert_eq!(session.redo("a").unwrap(), HistoryEntry::Deleted);
        assert!(session.get("a").is_none());
    }

    #[test]
    fn test_commit_patches_built_index() {
        let mut session = session(vec![record("a", "1girl, solo")]);
        assert!(session.index().query("solo").contains("a"));

        session.edit("a", &CaptionEdit::remove(["solo"])).unwrap();
        assert!(!session.index().contains("solo"));

        session.remove("a").unwrap();
        assert!(session.index().is_empty());
    }

    #[test]
    fn test_query_sets_active_subset() {
        let mut session = session(vec![
            record("b", "1girl, smile"),
            record("a", "1girl, solo"),
            record("c", ""),
        ]);
        let result = session
            .query(&Query::new().include(["1girl"], Condition::Any))
            .unwrap();
        assert_eq!(result.keys, [RecordKey::new("a"), RecordKey::new("b")]);
        assert_eq!(result.searched, 3);
        let keys: Vec<_> = session.active().keys().map(RecordKey::as_str).collect();
        assert_eq!(keys, ["a", "b"]);

        let result = session
            .query(&Query::new().include(["smile"], Condition::Any))
            .unwrap();
        assert_eq!(result.searched, 2);
    }

    #[test]
    fn test_invalid_query_keeps_subset() {
        let mut session = session(vec![record("a", "1girl")]);
        let query = Query::new().include(["("], Condition::Any).regex(true);
        assert!(matches!(session.query(&query), Err(StoreError::Query(_))));
        assert_eq!(session.active().len(), 1);
    }

    #[test]
    fn test_edit_propagates_to_subset() {
        let mut session = session(vec![record("a", "1girl"), record("b", "solo")]);
        session.query(&Query::new().include(["1girl"], Condition::Any)).unwrap();
        session.edit("a", &CaptionEdit::add(["smile"])).unwrap();
        let in_subset = session.active().get("a").unwrap();
        assert_eq!(in_subset.caption, Some(Caption::parse("1girl, smile")));

        session.edit("b", &CaptionEdit::add(["smile"])).unwrap();
        assert!(!session.active().contains("b"));
    }

    #[test]
    fn test_batch_edit_commits_in_order() {
        let mut session = session(vec![record("a", "1girl"), record("b", "solo"), record("c", "smile")]);
        let outcome = session
            .batch_caption_edit(&CaptionEdit::add(["smile"]), &CancelToken::new())
            .unwrap();
        assert!(!outcome.is_cancelled());
        let pending: Vec<_> = session.pending_keys().into_iter().map(RecordKey::as_str).collect();
        assert_eq!(pending, ["a", "b"]);
        assert_eq!(caption(&session, "b"), "solo, smile");
    }

    #[test]
    fn test_cancelled_batch_changes_nothing() {
        let mut session = session(vec![record("a", "1girl"), record("b", "solo")]);
        let token = CancelToken::new();
        token.cancel();
        let outcome = session
            .batch_caption_edit(&CaptionEdit::add(["smile"]), &token)
            .unwrap();
        assert!(outcome.is_cancelled());
        assert_eq!(session.buffer_len(), 0);
        assert_eq!(caption(&session, "a"), "1girl");
    }

    #[test]
    fn test_categories_and_pages() {
        let mut records: Vec<Record> = (0..5).map(|i| record(&format!("k{i}"), "")).collect();
        records.push(record("x", "").with_category("other"));
        let config = StoreConfig {
            chunk_size: Some(2),
            ..StoreConfig::default()
        };
        let mut session = Session::new(records.into_iter().collect(), &config).unwrap();
        assert_eq!(session.categories(), ["images", "other"]);

        session.change_to_category(Some("images"));
        let page = session.show_chunk(Some(99));
        assert_eq!((page.index, page.total), (3, 3));
        assert_eq!(page.records.len(), 1);
        assert_eq!(session.chunk_index(), 3);

        session.reset_subset();
        assert_eq!(session.show_chunk(None).total, 3);
    }

    #[test]
    fn test_tag_list_by_frequency() {
        let mut session = session(vec![record("a", "solo, 1girl"), record("b", "1girl")]);
        assert!(!session.index_built());
        let tags = session.tag_list();
        assert_eq!(tags[0], ("1girl".to_string(), 2));
        assert!(session.index_built());
    }

    #[test]
    fn test_replace_store_invalidates_index() {
        let mut session = session(vec![record("a", "1girl")]);
        session.index();
        session.replace_store(vec![record("z", "smile")].into_iter().collect());
        assert!(!session.index_built());
        assert!(session.index().contains("smile"));
        assert!(!session.index().contains("1girl"));
    }

    #[test]
    fn test_sorted_subset() {
        let mut session = session(vec![record("b", ""), record("a", "")]);
        session.sorted_subset(SortKey::Key, false);
        let keys: Vec<_> = session.active().keys().map(RecordKey::as_str).collect();
        assert_eq!(keys, ["a", "b"]);
    }

    #[test]
    fn test_open_overlays_database() {
        let dir = TestDir::new();
        dir.write("images/a.png", "png");
        dir.write("images/a.txt", "from sidecar");
        dir.write("images/b.png", "png");
        let db = dir.write(
            "db.json",
            r#"{"a": {"image_path": "/elsewhere/a.png", "caption": "from database"}}"#,
        );

        let config = StoreConfig {
            sources: vec![dir.path().join("images")],
            database_file: Some(db),
            write_to_database: true,
            ..StoreConfig::default()
        };
        let session = Session::open(&config).unwrap();
        let a = session.get("a").unwrap();
        assert_eq!(a.caption, Some(Caption::parse("from database")));
        assert_eq!(a.image_path, dir.path().join("images/a.png"));
        let pending: Vec<_> = session.pending_keys().into_iter().map(RecordKey::as_str).collect();
        assert_eq!(pending, ["b"]);
    }

    #[test]
    fn test_open_ignores_non_utf8_database() {
        let dir = TestDir::new();
        let image = dir.write("images/a.png", "png");
        dir.write("images/a.txt", "solo");
        let db = dir.path().join("db.json");
        std::fs::write(&db, [0x7b, 0xff, 0xfe, 0x00]).unwrap();

        let config = StoreConfig {
            sources: vec![dir.path().join("images")],
            database_file: Some(db.clone()),
            write_to_database: true,
            ..StoreConfig::default()
        };
        let mut session = Session::open(&config).unwrap();
        assert_eq!(session.get("a").unwrap().caption, Some(Caption::parse("solo")));

        assert!(session.set(record_at(&image, "solo, smile")));
        let report = session.save().unwrap();
        assert!(report.recovered_corrupt);
        assert!(crate::persist::backup_path(&db).is_file());
    }

    #[test]
    fn test_open_rejects_unknown_source() {
        let config = StoreConfig {
            sources: vec!["/definitely/not/here".into()],
            ..StoreConfig::default()
        };
        assert!(matches!(Session::open(&config), Err(StoreError::InvalidInput(_))));
    }
}
