//! Sort keys for deriving ordered subsets

use super::Store;
use crate::record::Record;
use std::cmp::Ordering;
use std::sync::Arc;

/// Attribute a store can be ordered by.
///
/// Records missing the attribute sort lowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Key,
    Stem,
    Extension,
    Category,
    AestheticScore,
    OriginalSize,
    OriginalWidth,
    OriginalHeight,
    AspectRatio,
    CaptionLength,
    HasGenInfo,
    Quality,
    QualityOrScore,
    SafeRating,
    SafeLevel,
}

#[derive(Debug, PartialEq)]
enum SortValue {
    Text(String),
    Number(f64),
}

impl SortValue {
    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Number(_), Self::Text(_)) => Ordering::Less,
            (Self::Text(_), Self::Number(_)) => Ordering::Greater,
        }
    }
}

const MISSING: f64 = f64::NEG_INFINITY;

fn quality_score(record: &Record) -> f64 {
    let level = record
        .caption
        .as_ref()
        .and_then(|c| c.quality())
        .unwrap_or("normal");
    match level {
        "horrible" => 0.0,
        "worst" => 2.0,
        "low" => 3.5,
        "high" => 6.5,
        "best" => 8.0,
        "amazing" => 10.0,
        _ => 5.0,
    }
}

impl SortKey {
    fn value(self, record: &Record) -> SortValue {
        let size = record.original_size.map(|(w, h)| (f64::from(w), f64::from(h)));
        match self {
            Self::Key => SortValue::Text(record.key().to_string()),
            Self::Stem => SortValue::Text(record.stem().to_string()),
            Self::Extension => SortValue::Text(record.extension().to_string()),
            Self::Category => SortValue::Text(record.category().to_string()),
            Self::AestheticScore => {
                SortValue::Number(record.aesthetic_score.map_or(MISSING, f64::from))
            }
            Self::OriginalSize => SortValue::Number(size.map_or(MISSING, |(w, h)| w * h)),
            Self::OriginalWidth => SortValue::Number(size.map_or(MISSING, |(w, _)| w)),
            Self::OriginalHeight => SortValue::Number(size.map_or(MISSING, |(_, h)| h)),
            Self::AspectRatio => SortValue::Number(
                size.filter(|(_, h)| *h > 0.0).map_or(MISSING, |(w, h)| w / h),
            ),
            #[allow(clippy::cast_precision_loss)]
            Self::CaptionLength => {
                SortValue::Number(record.caption.as_ref().map_or(MISSING, |c| c.len() as f64))
            }
            Self::HasGenInfo => SortValue::Number(if record.gen_info.is_empty() { 0.0 } else { 1.0 }),
            Self::Quality => SortValue::Number(quality_score(record)),
            Self::QualityOrScore => SortValue::Number(
                record
                    .aesthetic_score
                    .map_or_else(|| quality_score(record), f64::from),
            ),
            Self::SafeRating => SortValue::Number(record.safe_rating.map_or(MISSING, f64::from)),
            Self::SafeLevel => SortValue::Number(
                record
                    .safe_level
                    .map_or(MISSING, |level| f64::from(level.rank())),
            ),
        }
    }
}

impl Store {
    /// New store with the same records ordered by `key` (stable).
    #[must_use]
    pub fn sorted_by(&self, key: SortKey, reverse: bool) -> Self {
        let mut items: Vec<_> = self
            .items()
            .map(|(k, r)| (key.value(r), k.clone(), Arc::clone(r)))
            .collect();
        items.sort_by(|a, b| {
            let ord = a.0.compare(&b.0);
            if reverse { ord.reverse() } else { ord }
        });
        items.into_iter().map(|(_, k, r)| (k, r)).collect()
    }
}
