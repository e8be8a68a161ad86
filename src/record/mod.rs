//! Image records and their captions
//!
//! A [`Record`] is one catalogued image: where it lives, its caption and the
//! free-form metadata collected for it. Records are treated as values: the
//! store hands them out behind `Arc` and an edit always produces a new copy.
//!
//! # Types
//!
//! - **`RecordKey`**: Stable identifier (the image's file stem)
//! - **`Record`**: Image metadata plus an optional [`Caption`]
//! - **`RecordEntry`**: Flat serialized form used by the database file

pub mod caption;
pub mod entry;
pub mod tags;

pub use caption::Caption;
pub use entry::RecordEntry;
pub use tags::{TagKind, TagPriority, normalize_tag};

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Stable identifier of a record within a store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordKey(String);

impl RecordKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key derived from an image path: its file stem.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .map(Self::new)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl Borrow<str> for RecordKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for RecordKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RecordKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Safety level assigned by the rating model
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SafeLevel {
    #[serde(rename = "g")]
    General,
    #[serde(rename = "s")]
    Sensitive,
    #[serde(rename = "q")]
    Questionable,
    #[serde(rename = "e")]
    Explicit,
}

impl SafeLevel {
    /// Ordinal used for sorting, `General` lowest
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::General => 0,
            Self::Sensitive => 1,
            Self::Questionable => 2,
            Self::Explicit => 3,
        }
    }
}

/// Metadata and caption of one image
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    key: RecordKey,
    pub image_path: PathBuf,
    pub caption: Option<Caption>,
    pub original_size: Option<(u32, u32)>,
    pub gen_info: BTreeMap<String, serde_json::Value>,
    pub aesthetic_score: Option<f32>,
    pub safe_rating: Option<f32>,
    pub safe_level: Option<SafeLevel>,
    /// Precomputed hash string consumed by the image-similarity scorer
    pub perceptual_hash: Option<String>,
}

impl Record {
    /// Create an empty record bound to `key`
    pub fn new(key: impl Into<RecordKey>, image_path: impl Into<PathBuf>) -> Self {
        Self {
            key: key.into(),
            image_path: image_path.into(),
            caption: None,
            original_size: None,
            gen_info: BTreeMap::new(),
            aesthetic_score: None,
            safe_rating: None,
            safe_level: None,
            perceptual_hash: None,
        }
    }

    /// Create a record keyed by the stem of `image_path`
    #[must_use]
    pub fn from_image_path(image_path: impl Into<PathBuf>) -> Option<Self> {
        let image_path = image_path.into();
        let key = RecordKey::from_path(&image_path)?;
        Some(Self::new(key, image_path))
    }

    #[must_use]
    pub fn with_caption(mut self, caption: Caption) -> Self {
        self.caption = Some(caption);
        self
    }

    #[must_use]
    pub const fn key(&self) -> &RecordKey {
        &self.key
    }

    /// Name of the directory holding the image
    #[must_use]
    pub fn category(&self) -> &str {
        self.image_path
            .parent()
            .and_then(Path::file_name)
            .and_then(|s| s.to_str())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn stem(&self) -> &str {
        self.image_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn extension(&self) -> &str {
        self.image_path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
    }

    /// Path of the plain-text caption file next to the image
    #[must_use]
    pub fn sidecar_path(&self) -> PathBuf {
        self.image_path.with_extension("txt")
    }

    /// Read the caption from the sidecar file, if there is one.
    ///
    /// # Errors
    ///
    /// Returns `std::io::Error` if the sidecar exists but cannot be read.
    pub fn read_sidecar_caption(&self) -> std::io::Result<Option<Caption>> {
        let path = self.sidecar_path();
        if !path.is_file() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(path)?;
        Ok(Some(Caption::parse(text.trim())))
    }

    /// Move the image to a sibling directory named `category`
    #[must_use]
    pub fn with_category(mut self, category: &str) -> Self {
        if let (Some(name), Some(root)) = (
            self.image_path.file_name().map(ToOwned::to_owned),
            self.image_path.parent().and_then(Path::parent),
        ) {
            self.image_path = root.join(category).join(name);
        }
        self
    }

    #[must_use]
    pub fn with_extension(mut self, extension: &str) -> Self {
        self.image_path.set_extension(extension.trim_start_matches('.'));
        self
    }

    /// Set the caption's artist from a `by <artist>` category.
    ///
    /// Categories without the `by ` prefix clear the artist.
    #[must_use]
    pub fn track_artist(mut self) -> Self {
        let artist = self.category().strip_prefix("by ").map(str::to_string);
        if let Some(caption) = self.caption.as_mut()
            && caption.artist() != artist.as_deref()
        {
            caption.set_artist(artist);
        }
        self
    }
}
