//! Tag inverted index
//!
//! Maps each normalized tag to the set of record keys carrying it, with side
//! partitions for artist, character and style tags. The index is derived data:
//! it can be rebuilt from a [`Store`] at any time and is patched entry by entry
//! on targeted edits.
//!
//! Every entry point runs the tag through [`normalize_tag`] so callers cannot
//! skip normalization.

use crate::record::{Caption, Record, RecordKey, TagKind, normalize_tag};
use crate::store::Store;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Inverted index from normalized tag to record keys
#[derive(Debug, Clone, Default)]
pub struct TagIndex {
    table: HashMap<String, HashSet<RecordKey>>,
    artists: HashSet<String>,
    characters: HashSet<String>,
    styles: HashSet<String>,
}

/// Index entries contributed by a caption: every raw tag plus the typed fields.
///
/// Returned as normalized tag -> classification so two captions can be diffed.
#[must_use]
pub fn caption_entries(caption: Option<&Caption>) -> HashMap<String, Option<TagKind>> {
    let mut entries = HashMap::new();
    let Some(caption) = caption else {
        return entries;
    };
    for tag in caption {
        entries.entry(normalize_tag(tag)).or_insert(None);
    }
    let typed = caption
        .characters()
        .iter()
        .map(|c| (c.as_str(), TagKind::Character))
        .chain(caption.styles().iter().map(|s| (s.as_str(), TagKind::Style)))
        .chain(caption.artist().map(|a| (a, TagKind::Artist)));
    for (name, kind) in typed {
        entries.insert(normalize_tag(name), Some(kind));
    }
    entries
}

impl TagIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a fresh index over every record of `store`
    #[must_use]
    pub fn build(store: &Store) -> Self {
        let mut index = Self::new();
        index.rebuild(store);
        index
    }

    /// Clear and repopulate from `store`
    pub fn rebuild(&mut self, store: &Store) {
        self.clear();
        for (key, record) in store.items() {
            self.add_record(key, record);
        }
        info!(
            total = self.len(),
            artist = self.artists.len(),
            character = self.characters.len(),
            style = self.styles.len(),
            "built tag index"
        );
    }

    pub fn clear(&mut self) {
        self.table.clear();
        self.artists.clear();
        self.characters.clear();
        self.styles.clear();
    }

    /// Index every tag of `record` under `key`
    pub fn add_record(&mut self, key: &RecordKey, record: &Record) {
        for (tag, kind) in caption_entries(record.caption.as_ref()) {
            self.add(&tag, key, kind);
        }
    }

    /// Connect `key` to `tag`, registering the tag in its partition if `kind` is given
    pub fn add(&mut self, tag: &str, key: &RecordKey, kind: Option<TagKind>) {
        let tag = normalize_tag(tag);
        if tag.is_empty() {
            return;
        }
        if let Some(kind) = kind {
            self.partition_mut(kind).insert(tag.clone());
        }
        self.table.entry(tag).or_default().insert(key.clone());
    }

    /// Disconnect `key` from `tag`.
    ///
    /// Missing tags or keys are ignored. An entry left empty is dropped from
    /// the table and from every partition.
    pub fn remove(&mut self, tag: &str, key: &str) {
        let tag = normalize_tag(tag);
        let Some(keys) = self.table.get_mut(&tag) else {
            return;
        };
        keys.remove(key);
        if keys.is_empty() {
            self.drop_entry(&tag);
        }
    }

    /// Disconnect `key` from every tag
    pub fn remove_key(&mut self, key: &str) {
        let emptied: Vec<String> = self
            .table
            .iter_mut()
            .filter_map(|(tag, keys)| (keys.remove(key) && keys.is_empty()).then(|| tag.clone()))
            .collect();
        for tag in emptied {
            self.drop_entry(&tag);
        }
    }

    /// Patch the index for a record changing from `old` to `new` caption
    pub fn update(&mut self, key: &RecordKey, old: Option<&Caption>, new: Option<&Caption>) {
        let before = caption_entries(old);
        let after = caption_entries(new);
        for tag in before.keys().filter(|t| !after.contains_key(*t)) {
            self.remove(tag, key.as_str());
        }
        for (tag, kind) in &after {
            match before.get(tag) {
                Some(previous) if previous == kind => {}
                _ => self.add(tag, key, *kind),
            }
        }
    }

    /// Keys carrying `tag` (empty if the tag is unknown)
    #[must_use]
    pub fn query(&self, tag: &str) -> HashSet<RecordKey> {
        self.get(tag).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn get(&self, tag: &str) -> Option<&HashSet<RecordKey>> {
        self.table.get(&normalize_tag(tag))
    }

    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.table.contains_key(&normalize_tag(tag))
    }

    /// Number of distinct tags
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Every indexed tag, unordered
    pub fn tags(&self) -> impl Iterator<Item = &str> + '_ {
        self.table.keys().map(String::as_str)
    }

    /// Indexed tags matching `regex`
    pub fn matching<'a>(&'a self, regex: &'a Regex) -> impl Iterator<Item = &'a str> + 'a {
        self.tags().filter(move |tag| regex.is_match(tag))
    }

    /// Tags ordered by how many records carry them (most first, ties by name)
    #[must_use]
    pub fn tags_by_frequency(&self) -> Vec<(&str, usize)> {
        let mut tags: Vec<_> = self
            .table
            .iter()
            .map(|(tag, keys)| (tag.as_str(), keys.len()))
            .collect();
        tags.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        tags
    }

    /// Entries of the tags registered in one partition
    #[must_use]
    pub fn partition(&self, kind: TagKind) -> HashMap<&str, &HashSet<RecordKey>> {
        let tags = match kind {
            TagKind::Artist => &self.artists,
            TagKind::Character => &self.characters,
            TagKind::Style => &self.styles,
        };
        tags.iter()
            .filter_map(|tag| self.table.get(tag).map(|keys| (tag.as_str(), keys)))
            .collect()
    }

    fn partition_mut(&mut self, kind: TagKind) -> &mut HashSet<String> {
        match kind {
            TagKind::Artist => &mut self.artists,
            TagKind::Character => &mut self.characters,
            TagKind::Style => &mut self.styles,
        }
    }

    fn drop_entry(&mut self, tag: &str) {
        self.table.remove(tag);
        self.artists.remove(tag);
        self.characters.remove(tag);
        self.styles.remove(tag);
    }
}
