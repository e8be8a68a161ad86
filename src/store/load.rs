//! Bulk loading and materialization of stores

use super::Store;
use crate::persist::PersistError;
use crate::record::{Record, RecordEntry, RecordKey};
use glob::Pattern as GlobPattern;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

impl Store {
    /// Load every record from a JSON database file.
    ///
    /// # Errors
    ///
    /// Returns `PersistError::Io` if the file cannot be read,
    /// `PersistError::Parse` if it is not a UTF-8 JSON object, and
    /// `PersistError::InvalidRecord` if an entry cannot be decoded.
    pub fn load_json(path: &Path) -> Result<Self, PersistError> {
        let bytes = fs::read(path).map_err(|e| PersistError::io(path, e))?;
        let document: Map<String, Value> =
            serde_json::from_slice(&bytes).map_err(|e| PersistError::Parse {
                path: path.display().to_string(),
                source: e,
            })?;
        let store = Self::from_document(document)?;
        info!(path = %path.display(), total = store.len(), "loaded database file");
        Ok(store)
    }

    /// Decode a parsed database document, keeping its key order.
    ///
    /// # Errors
    ///
    /// Returns `PersistError::InvalidRecord` if an entry cannot be decoded.
    pub fn from_document(document: Map<String, Value>) -> Result<Self, PersistError> {
        let mut store = Self::new();
        for (key, value) in document {
            let key = RecordKey::new(key);
            let entry: RecordEntry =
                serde_json::from_value(value).map_err(|e| PersistError::InvalidRecord {
                    key: key.to_string(),
                    reason: e.to_string(),
                })?;
            let record = entry.into_record(key.clone())?;
            store.set(key, record);
        }
        Ok(store)
    }

    /// Serialize every record into a database document, in store order
    ///
    /// # Errors
    ///
    /// Returns `PersistError::Serialize` if a record cannot be encoded.
    pub fn to_document(&self) -> Result<Map<String, Value>, PersistError> {
        self.items()
            .map(|(key, record)| Ok((key.to_string(), entry_value(record)?)))
            .collect()
    }

    /// Scan `dir` for images and read their sidecar captions.
    ///
    /// Only files whose extension (case-insensitive) is listed in `extensions`
    /// are taken. Results are in path order. When two images share a stem the
    /// later path wins.
    ///
    /// # Errors
    ///
    /// Returns `PersistError::Io` if the directory cannot be walked or a
    /// sidecar file cannot be read.
    pub fn load_dir(dir: &Path, extensions: &[String], recursive: bool) -> Result<Self, PersistError> {
        let root = GlobPattern::escape(&dir.to_string_lossy());
        let pattern = if recursive {
            format!("{root}/**/*")
        } else {
            format!("{root}/*")
        };
        let paths = glob::glob(&pattern).map_err(|e| PersistError::Pattern {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;

        let mut store = Self::new();
        for entry in paths {
            let path = entry.map_err(|e| {
                let path = e.path().to_path_buf();
                PersistError::io(&path, e.into_error())
            })?;
            let wanted = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| extensions.iter().any(|w| w.eq_ignore_ascii_case(ext.trim_start_matches('.'))));
            if !wanted || !path.is_file() {
                continue;
            }
            let Some(mut record) = Record::from_image_path(&path) else {
                continue;
            };
            record.caption = record
                .read_sidecar_caption()
                .map_err(|e| PersistError::io(&record.sidecar_path(), e))?;
            store.insert(Arc::new(record));
        }
        debug!(dir = %dir.display(), total = store.len(), "scanned image directory");
        Ok(store)
    }
}

/// JSON value of a single record's flat entry
pub(crate) fn entry_value(record: &Record) -> Result<Value, PersistError> {
    Ok(serde_json::to_value(RecordEntry::from(record))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Caption;
    use crate::testing::{TestDir, record};

    #[test]
    fn test_document_roundtrip_keeps_order() {
        let store: Store = ["b", "a", "c"].into_iter().map(|k| record(k, "1girl")).collect();
        let restored = Store::from_document(store.to_document().unwrap()).unwrap();
        let keys: Vec<_> = restored.keys().map(RecordKey::as_str).collect();
        assert_eq!(keys, ["b", "a", "c"]);
        assert_eq!(restored.get("a").unwrap().caption, Some(Caption::parse("1girl")));
    }

    #[test]
    fn test_load_json_rejects_non_object() {
        let dir = TestDir::new();
        let path = dir.write("db.json", "[1, 2]");
        assert!(matches!(Store::load_json(&path), Err(PersistError::Parse { .. })));
    }

    #[test]
    fn test_load_json_non_utf8_is_parse_error() {
        let dir = TestDir::new();
        let path = dir.path().join("db.json");
        fs::write(&path, [0x7b, 0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(Store::load_json(&path), Err(PersistError::Parse { .. })));
    }

    #[test]
    fn test_entry_value_omits_absent_fields() {
        let value = entry_value(&record("a", "1girl")).unwrap();
        assert_eq!(value["caption"], "1girl");
        assert!(value.get("aesthetic_score").is_none());
    }

    #[test]
    fn test_load_dir_reads_sidecars() {
        let dir = TestDir::new();
        dir.write("cat/one.png", "png");
        dir.write("cat/one.txt", "1girl, solo\n");
        dir.write("cat/two.JPG", "jpg");
        dir.write("cat/notes.md", "ignored");

        let extensions = vec!["png".to_string(), "jpg".to_string()];
        let store = Store::load_dir(dir.path(), &extensions, true).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("one").unwrap().caption, Some(Caption::parse("1girl, solo")));
        assert!(store.get("two").unwrap().caption.is_none());
        assert_eq!(store.get("one").unwrap().category(), "cat");
    }

    #[test]
    fn test_load_dir_non_recursive() {
        let dir = TestDir::new();
        dir.write("top.png", "png");
        dir.write("nested/deep.png", "png");

        let extensions = vec!["png".to_string()];
        let store = Store::load_dir(dir.path(), &extensions, false).unwrap();
        assert!(store.contains("top"));
        assert!(!store.contains("deep"));
    }
}
