//! Caption edits
//!
//! [`CaptionEdit`] is the edit function used for single-record edits and for
//! batches. Applying it never touches the input record: a changed caption
//! comes back as a new record in [`EditOutcome::Changed`].
//!
//! A record without a caption is edited as if it had an empty one, and an
//! edit that leaves the caption empty counts as no change.

use crate::batch::EditOutcome;
use crate::query::Condition;
use crate::record::{Caption, Record, TagPriority};
use serde::{Deserialize, Serialize};

/// Set operation applied by a [`CaptionOperation`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionOp {
    /// Append the operation tags the caption does not have yet
    Add,
    /// Drop the operation tags from the caption
    Remove,
}

/// Whether condition tags must be present or absent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Inclusion {
    #[default]
    Include,
    Exclude,
}

/// Guard deciding whether a [`CaptionOperation`] applies to a caption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionCondition {
    pub condition: Condition,
    pub tags: Vec<String>,
    pub inclusion: Inclusion,
}

impl CaptionCondition {
    /// True if `any`/`all` of the condition tags satisfy the inclusion.
    ///
    /// A condition without tags always holds.
    #[must_use]
    pub fn holds(&self, caption: &Caption) -> bool {
        if self.tags.is_empty() {
            return true;
        }
        let satisfied = |tag: &String| match self.inclusion {
            Inclusion::Include => caption.contains(tag),
            Inclusion::Exclude => !caption.contains(tag),
        };
        match self.condition {
            Condition::Any => self.tags.iter().any(satisfied),
            Condition::All => self.tags.iter().all(satisfied),
        }
    }
}

/// Add or remove tags, optionally only where a condition holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionOperation {
    pub op: CaptionOp,
    pub tags: Caption,
    pub condition: Option<CaptionCondition>,
}

impl CaptionOperation {
    #[must_use]
    pub fn apply(&self, caption: &Caption) -> Caption {
        if self.tags.is_empty() || self.condition.as_ref().is_some_and(|c| !c.holds(caption)) {
            return caption.clone();
        }
        match self.op {
            CaptionOp::Add => caption | &self.tags,
            CaptionOp::Remove => caption - &self.tags,
        }
    }
}

/// Edit function applied to a record's caption
#[derive(Debug, Clone)]
pub enum CaptionEdit {
    /// Replace the caption
    Write(Option<Caption>),
    /// Add or remove tags
    Operation(CaptionOperation),
    /// Replace the quality tag
    SetQuality(String),
    /// Normalize spelling and recompute the typed fields
    Formalize,
    /// Drop repeated tags
    Deduplicate,
    /// Reorder tags by priority group
    SortByPriority(Vec<TagPriority>),
}

impl CaptionEdit {
    /// Caption typed by a user; blank text removes the caption
    #[must_use]
    pub fn write_text(text: &str) -> Self {
        let text = text.trim();
        Self::Write((!text.is_empty()).then(|| Caption::parse(text)))
    }

    /// Unconditionally add `tags`
    #[must_use]
    pub fn add<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::Operation(CaptionOperation {
            op: CaptionOp::Add,
            tags: Caption::new(tags),
            condition: None,
        })
    }

    /// Unconditionally remove `tags`
    #[must_use]
    pub fn remove<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::Operation(CaptionOperation {
            op: CaptionOp::Remove,
            tags: Caption::new(tags),
            condition: None,
        })
    }

    /// New caption for `caption`, which is empty when the record has none
    #[must_use]
    pub fn edit_caption(&self, caption: &Caption) -> Option<Caption> {
        match self {
            Self::Write(new) => new.clone(),
            Self::Operation(operation) => Some(operation.apply(caption)),
            Self::SetQuality(level) => Some(caption.with_quality(level)),
            Self::Formalize => Some(caption.formalized()),
            Self::Deduplicate => Some(caption.unique()),
            Self::SortByPriority(priorities) => Some(caption.sorted_by_priority(priorities)),
        }
    }

    /// Apply the edit to a copy of `record`
    #[must_use]
    pub fn apply(&self, record: &Record) -> EditOutcome {
        let current = record.caption.clone().unwrap_or_default();
        let edited = self.edit_caption(&current);

        let unchanged = match (&record.caption, &edited) {
            (None, None) => true,
            (None, Some(new)) => new.is_empty(),
            (Some(old), Some(new)) => old == new,
            (Some(_), None) => false,
        };
        if unchanged {
            return EditOutcome::Unchanged;
        }
        let mut record = record.clone();
        record.caption = edited;
        EditOutcome::Changed(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::record;

    fn caption_of(outcome: EditOutcome) -> Option<String> {
        match outcome {
            EditOutcome::Changed(record) => record.caption.map(|c| c.to_string()),
            EditOutcome::Unchanged => panic!("expected a change"),
        }
    }

    fn condition(condition: Condition, tags: &[&str], inclusion: Inclusion) -> CaptionCondition {
        CaptionCondition {
            condition,
            tags: tags.iter().map(ToString::to_string).collect(),
            inclusion,
        }
    }

    #[test]
    fn test_add_appends_missing_tags() {
        let outcome = CaptionEdit::add(["smile", "solo"]).apply(&record("a", "1girl, solo"));
        assert_eq!(caption_of(outcome).unwrap(), "1girl, solo, smile");
    }

    #[test]
    fn test_remove_by_normalized_form() {
        let outcome = CaptionEdit::remove(["long_hair"]).apply(&record("a", "1girl, long hair"));
        assert_eq!(caption_of(outcome).unwrap(), "1girl");
    }

    #[test]
    fn test_noop_edit_is_unchanged() {
        let outcome = CaptionEdit::remove(["smile"]).apply(&record("a", "1girl"));
        assert_eq!(outcome, EditOutcome::Unchanged);
    }

    #[test]
    fn test_missing_caption_edited_as_empty() {
        let mut bare = record("a", "");
        bare.caption = None;
        assert_eq!(CaptionEdit::remove(["solo"]).apply(&bare), EditOutcome::Unchanged);
        assert_eq!(caption_of(CaptionEdit::add(["solo"]).apply(&bare)).unwrap(), "solo");
    }

    #[test]
    fn test_blank_text_removes_caption() {
        assert!(matches!(CaptionEdit::write_text("  "), CaptionEdit::Write(None)));
        assert_eq!(caption_of(CaptionEdit::write_text("").apply(&record("a", "1girl"))), None);
    }

    #[test]
    fn test_condition_gates_operation() {
        let operation = CaptionOperation {
            op: CaptionOp::Add,
            tags: Caption::parse("smile"),
            condition: Some(condition(Condition::All, &["1girl", "solo"], Inclusion::Include)),
        };
        let edit = CaptionEdit::Operation(operation);
        assert!(edit.apply(&record("a", "1girl, solo")).is_changed());
        assert!(!edit.apply(&record("b", "1girl")).is_changed());
    }

    #[test]
    fn test_exclude_condition() {
        let cond = condition(Condition::Any, &["solo", "2girls"], Inclusion::Exclude);
        assert!(cond.holds(&Caption::parse("1girl, solo")));
        assert!(!cond.holds(&Caption::parse("solo, 2girls")));
        assert!(condition(Condition::All, &[], Inclusion::Exclude).holds(&Caption::default()));
    }

    #[test]
    fn test_set_quality() {
        let outcome = CaptionEdit::SetQuality("best".into()).apply(&record("a", "1girl, low quality"));
        assert_eq!(caption_of(outcome).unwrap(), "best quality, 1girl");
    }

    #[test]
    fn test_input_record_is_untouched() {
        let original = record("a", "1girl");
        let _ = CaptionEdit::add(["smile"]).apply(&original);
        assert_eq!(original.caption, Some(Caption::parse("1girl")));
    }
}
