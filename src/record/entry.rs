//! Flat serialized form of a [`Record`]
//!
//! The database file maps each key to one of these entries. Captions are
//! written as a single `", "`-joined string and the typed caption fields sit
//! next to it as plain strings, so the file stays readable and diffable.

use super::{Caption, Record, RecordKey, SafeLevel, caption::TAG_SEPARATOR};
use crate::persist::PersistError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordEntry {
    pub image_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub characters: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub styles: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    /// `WIDTHxHEIGHT`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aesthetic_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_rating: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_level: Option<SafeLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perceptual_hash: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub gen_info: BTreeMap<String, serde_json::Value>,
}

fn join_names(names: &[String]) -> Option<String> {
    (!names.is_empty()).then(|| names.join(TAG_SEPARATOR))
}

fn split_names(joined: Option<&str>) -> Vec<String> {
    joined
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_size(key: &RecordKey, text: &str) -> Result<(u32, u32), PersistError> {
    let invalid = || PersistError::InvalidRecord {
        key: key.to_string(),
        reason: format!("invalid original_size '{text}'"),
    };
    let (w, h) = text.split_once(['x', 'X']).ok_or_else(invalid)?;
    let w = w.trim().parse().map_err(|_| invalid())?;
    let h = h.trim().parse().map_err(|_| invalid())?;
    Ok((w, h))
}

impl From<&Record> for RecordEntry {
    fn from(record: &Record) -> Self {
        let caption = record.caption.as_ref();
        Self {
            image_path: record.image_path.clone(),
            caption: caption.map(ToString::to_string),
            artist: caption.and_then(|c| c.artist().map(str::to_string)),
            characters: caption.and_then(|c| join_names(c.characters())),
            styles: caption.and_then(|c| join_names(c.styles())),
            quality: caption.and_then(|c| c.quality().map(str::to_string)),
            original_size: record.original_size.map(|(w, h)| format!("{w}x{h}")),
            aesthetic_score: record.aesthetic_score,
            safe_rating: record.safe_rating,
            safe_level: record.safe_level,
            perceptual_hash: record.perceptual_hash.clone(),
            gen_info: record.gen_info.clone(),
        }
    }
}

impl RecordEntry {
    /// Rebuild the record stored under `key`.
    ///
    /// Typed caption fields are taken as written, not recomputed.
    ///
    /// # Errors
    ///
    /// Returns `PersistError::InvalidRecord` if `original_size` is malformed.
    pub fn into_record(self, key: RecordKey) -> Result<Record, PersistError> {
        let original_size = self
            .original_size
            .as_deref()
            .map(|s| parse_size(&key, s))
            .transpose()?;

        let caption = self.caption.as_deref().map(|text| {
            let mut caption = Caption::parse(text);
            caption.set_artist(self.artist.clone());
            caption.set_quality(self.quality.clone());
            caption.set_characters(split_names(self.characters.as_deref()));
            caption.set_styles(split_names(self.styles.as_deref()));
            caption
        });

        let mut record = Record::new(key, self.image_path);
        record.caption = caption;
        record.original_size = original_size;
        record.aesthetic_score = self.aesthetic_score;
        record.safe_rating = self.safe_rating;
        record.safe_level = self.safe_level;
        record.perceptual_hash = self.perceptual_hash;
        record.gen_info = self.gen_info;
        Ok(record)
    }
}
