//! Saving buffered edits to disk
//!
//! Two independent sinks, each enabled by configuration:
//!
//! - **database**: one JSON object mapping record keys to flat entries. A
//!   missing file gets a full dump of the live store; an existing file is
//!   merged with the buffered keys only. A file that fails to parse is moved
//!   to `<name>.bak` and the merge starts from an empty document.
//! - **sidecar**: one `.txt` caption file next to every image. Deleted records
//!   have their image and caption file moved to `.bak`, never removed.
//!
//! The dirty buffer is only emptied once both sinks have finished. On any
//! failure the drained entries go back into the buffer for a retry.

pub mod error;

pub use error::PersistError;

use crate::buffer::{DirtyBuffer, Pending};
use crate::config::StoreConfig;
use crate::record::Record;
use crate::store::{Store, entry_value};
use config::ConfigError;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// `<path>.bak`
#[must_use]
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

/// Rename `path` to `<path>.bak`, replacing any earlier backup.
///
/// Returns `false` if there was no file to back up.
///
/// # Errors
///
/// Returns the underlying I/O error if the old backup cannot be removed or
/// the rename fails.
pub fn backup(path: &Path) -> io::Result<bool> {
    if !path.is_file() {
        return Ok(false);
    }
    let bak = backup_path(path);
    if bak.is_file() {
        fs::remove_file(&bak)?;
    }
    fs::rename(path, &bak)?;
    Ok(true)
}

/// What a save call did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    /// Buffered keys handled
    pub pending: usize,
    /// The database file did not exist and every live record was written
    pub full_dump: bool,
    /// The database file was unreadable JSON and was backed up and replaced
    pub recovered_corrupt: bool,
    /// Entries written into the database document
    pub upserted: usize,
    /// Entries removed from the database document
    pub removed: usize,
    /// Sidecar caption files written
    pub sidecars_written: usize,
    /// Files moved to `.bak`
    pub backed_up: usize,
}

/// Writes buffered edits to the configured sinks
#[derive(Debug, Clone, Default)]
pub struct PersistenceManager {
    database_file: Option<PathBuf>,
    write_to_txt: bool,
}

impl PersistenceManager {
    /// Build a manager for the sinks enabled in `config`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Message` if the database sink is enabled without
    /// a database file.
    pub fn new(config: &StoreConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            database_file: config
                .write_to_database
                .then(|| config.database_file.clone())
                .flatten(),
            write_to_txt: config.write_to_txt,
        })
    }

    /// Database file written by the database sink, if enabled
    #[must_use]
    pub fn database_file(&self) -> Option<&Path> {
        self.database_file.as_deref()
    }

    #[must_use]
    pub const fn writes_sidecars(&self) -> bool {
        self.write_to_txt
    }

    /// Write every buffered key of `buffer` to the enabled sinks.
    ///
    /// `live` is the store after the edits; a buffered key missing from it is
    /// a deletion. An empty buffer writes nothing.
    ///
    /// # Errors
    ///
    /// Returns `PersistError` on any I/O or serialization failure other than
    /// an unparseable database file. The buffer is left holding every entry
    /// it had before the call.
    pub fn save(&self, live: &Store, buffer: &mut DirtyBuffer) -> Result<SaveReport, PersistError> {
        if buffer.is_empty() {
            debug!("nothing to save since buffer is empty");
            return Ok(SaveReport::default());
        }

        let pending = buffer.drain();
        match self.write(live, &pending) {
            Ok(report) => {
                info!(
                    pending = report.pending,
                    upserted = report.upserted,
                    removed = report.removed,
                    sidecars = report.sidecars_written,
                    backed_up = report.backed_up,
                    "saved buffered edits"
                );
                Ok(report)
            }
            Err(e) => {
                buffer.restore(pending);
                Err(e)
            }
        }
    }

    fn write(&self, live: &Store, pending: &[Pending]) -> Result<SaveReport, PersistError> {
        let mut report = SaveReport {
            pending: pending.len(),
            ..SaveReport::default()
        };
        if let Some(path) = &self.database_file {
            save_database(path, live, pending, &mut report)?;
        }
        if self.write_to_txt {
            save_sidecars(live, pending, &mut report)?;
        }
        Ok(report)
    }
}

fn save_database(
    path: &Path,
    live: &Store,
    pending: &[Pending],
    report: &mut SaveReport,
) -> Result<(), PersistError> {
    if !path.is_file() {
        let document = live.to_document()?;
        report.full_dump = true;
        report.upserted = document.len();
        return write_document(path, &document);
    }

    let bytes = fs::read(path).map_err(|e| PersistError::io(path, e))?;
    let mut document = match serde_json::from_slice::<Map<String, Value>>(&bytes) {
        Ok(document) => document,
        Err(e) => {
            backup(path).map_err(|e| PersistError::io(path, e))?;
            warn!(
                path = %path.display(),
                backup = %backup_path(path).display(),
                error = %e,
                "database file is corrupted, backed up and starting fresh"
            );
            report.recovered_corrupt = true;
            report.backed_up += 1;
            Map::new()
        }
    };

    for Pending { key, .. } in pending {
        if let Some(record) = live.get(key.as_str()) {
            document.insert(key.to_string(), entry_value(record)?);
            report.upserted += 1;
        } else if document.shift_remove(key.as_str()).is_some() {
            report.removed += 1;
        }
    }
    write_document(path, &document)
}

fn save_sidecars(live: &Store, pending: &[Pending], report: &mut SaveReport) -> Result<(), PersistError> {
    for entry in pending {
        match live.get(entry.key.as_str()) {
            Some(record) => {
                if write_sidecar(record, report)? {
                    report.sidecars_written += 1;
                }
            }
            None => {
                let Some(removed) = entry.removed.as_deref().or(entry.value.as_deref()) else {
                    debug!(key = %entry.key, "deleted record has no known files");
                    continue;
                };
                for path in [removed.image_path.clone(), removed.sidecar_path()] {
                    if backup(&path).map_err(|e| PersistError::io(&path, e))? {
                        report.backed_up += 1;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Write the caption of `record` next to its image.
///
/// A record without a caption, or with an empty one, has its existing sidecar
/// moved to `.bak`.
fn write_sidecar(record: &Record, report: &mut SaveReport) -> Result<bool, PersistError> {
    let path = record.sidecar_path();
    let Some(caption) = record.caption.as_ref().filter(|c| !c.is_empty()) else {
        if backup(&path).map_err(|e| PersistError::io(&path, e))? {
            report.backed_up += 1;
        }
        return Ok(false);
    };
    fs::write(&path, caption.to_string()).map_err(|e| PersistError::io(&path, e))?;
    Ok(true)
}

/// Rewrite `path` with `document`, indented by four spaces.
///
/// The text goes to a temporary file in the same directory first, which then
/// replaces the target.
fn write_document(path: &Path, document: &Map<String, Value>) -> Result<(), PersistError> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| PersistError::io(parent, e))?;

    let mut file = NamedTempFile::new_in(parent).map_err(|e| PersistError::io(parent, e))?;
    {
        let mut writer = BufWriter::new(file.as_file_mut());
        let mut serializer =
            serde_json::Serializer::with_formatter(&mut writer, PrettyFormatter::with_indent(b"    "));
        document.serialize(&mut serializer)?;
        writer.flush().map_err(|e| PersistError::io(path, e))?;
    }
    file.persist(path).map_err(|e| PersistError::io(path, e.error))?;
    debug!(path = %path.display(), total = document.len(), "wrote database file");
    Ok(())
}
