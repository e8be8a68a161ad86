//! Testing utilities for capstore
//!
//! Scratch directories and record builders shared by the unit tests.
//!
//! Only available when compiled with `cfg(test)`.

use crate::record::{Caption, Record};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Temporary directory that is removed when dropped
pub struct TestDir {
    dir: TempDir,
}

impl TestDir {
    /// Create a fresh empty directory
    ///
    /// # Panics
    /// Panics if the directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `content` to `rel` inside the directory, creating parents
    ///
    /// # Panics
    /// Panics if the file cannot be written.
    pub fn write(&self, rel: impl AsRef<Path>, content: &str) -> PathBuf {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        fs::write(&path, content).expect("Failed to write test file");
        path
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

/// Record `key` under `/dataset/images` with `caption` parsed as given
#[must_use]
pub fn record(key: &str, caption: &str) -> Record {
    Record::new(key, format!("/dataset/images/{key}.png")).with_caption(Caption::parse(caption))
}

/// Record for an image at `path`, keyed by its file stem
///
/// # Panics
/// Panics if `path` has no file stem.
#[must_use]
pub fn record_at(path: &Path, caption: &str) -> Record {
    Record::from_image_path(path)
        .expect("image path has a file stem")
        .with_caption(Caption::parse(caption))
}
