//! Caption: an ordered, duplicate-free tag sequence with typed sub-fields
//!
//! The typed fields (quality, characters, styles, artist) are *derived* from
//! the raw tags, but only when one of the `recompute_*` methods or
//! [`Caption::formalized`] is called. Set operators never touch them.

use super::tags::{self, TagKind, TagPriority};
use std::collections::HashSet;
use std::convert::Infallible;
use std::fmt;
use std::ops::{BitOr, Sub};
use std::str::FromStr;

/// Separator used when a caption is written as a single string
pub const TAG_SEPARATOR: &str = ", ";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caption {
    tags: Vec<String>,
    quality: Option<String>,
    characters: Vec<String>,
    styles: Vec<String>,
    artist: Option<String>,
}

impl Caption {
    /// Build a caption from raw tags.
    ///
    /// Tags are trimmed, empty tags are dropped, and a tag whose normalized
    /// form was already seen is skipped (first occurrence wins).
    pub fn new<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let tags = raw
            .into_iter()
            .filter_map(|t| {
                let t = t.as_ref().trim();
                if t.is_empty() || !seen.insert(tags::normalize_tag(t)) {
                    None
                } else {
                    Some(t.to_string())
                }
            })
            .collect();
        Self {
            tags,
            ..Self::default()
        }
    }

    /// Parse a comma separated tag string
    #[must_use]
    pub fn parse(text: &str) -> Self {
        Self::new(text.split(','))
    }

    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.tags.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Whether a tag is present, compared by normalized spelling
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        let wanted = tags::normalize_tag(tag);
        self.tags.iter().any(|t| tags::normalize_tag(t) == wanted)
    }

    /// Order-insensitive comparison of the tag sets
    #[must_use]
    pub fn same_tags(&self, other: &Self) -> bool {
        self.normalized_set() == other.normalized_set()
    }

    /// Normalized spellings of every tag
    #[must_use]
    pub fn normalized_set(&self) -> HashSet<String> {
        self.tags.iter().map(|t| tags::normalize_tag(t)).collect()
    }

    #[must_use]
    pub fn quality(&self) -> Option<&str> {
        self.quality.as_deref()
    }

    #[must_use]
    pub fn characters(&self) -> &[String] {
        &self.characters
    }

    #[must_use]
    pub fn styles(&self) -> &[String] {
        &self.styles
    }

    #[must_use]
    pub fn artist(&self) -> Option<&str> {
        self.artist.as_deref()
    }

    pub fn set_quality(&mut self, quality: Option<String>) {
        self.quality = quality;
    }

    pub fn set_characters(&mut self, characters: Vec<String>) {
        self.characters = characters;
    }

    pub fn set_styles(&mut self, styles: Vec<String>) {
        self.styles = styles;
    }

    pub fn set_artist(&mut self, artist: Option<String>) {
        self.artist = artist;
    }

    /// Tags of `self` followed by the tags of `other` not already present
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut seen = self.normalized_set();
        let mut tags = self.tags.clone();
        for tag in &other.tags {
            if seen.insert(tags::normalize_tag(tag)) {
                tags.push(tag.clone());
            }
        }
        Self {
            tags,
            ..self.clone()
        }
    }

    /// Tags of `self` that do not appear in `other`
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        let removed = other.normalized_set();
        let tags = self
            .tags
            .iter()
            .filter(|t| !removed.contains(&tags::normalize_tag(t)))
            .cloned()
            .collect();
        Self {
            tags,
            ..self.clone()
        }
    }

    /// Replace any quality tag with `<level> quality`, placed first.
    #[must_use]
    pub fn with_quality(&self, level: &str) -> Self {
        let mut tags: Vec<String> = self
            .tags
            .iter()
            .filter(|t| tags::quality_level(t).is_none())
            .cloned()
            .collect();
        tags.insert(0, tags::quality_tag(level));
        Self {
            tags,
            quality: Some(level.trim().to_string()),
            ..self.clone()
        }
    }

    pub fn recompute_quality(&mut self) {
        self.quality = self
            .tags
            .iter()
            .find_map(|t| tags::quality_level(t))
            .map(str::to_string);
    }

    pub fn recompute_characters(&mut self) {
        self.characters = self.names_of(TagKind::Character);
    }

    pub fn recompute_styles(&mut self) {
        self.styles = self.names_of(TagKind::Style);
    }

    /// Takes the artist from the first `artist:` tag.
    ///
    /// The current artist is kept when no such tag exists, since the artist
    /// may also come from the record's category.
    pub fn recompute_artist(&mut self) {
        if let Some(artist) = self.names_of(TagKind::Artist).into_iter().next() {
            self.artist = Some(artist);
        }
    }

    /// Rewrite every tag in its readable spelling and recompute all typed fields.
    #[must_use]
    pub fn formalized(&self) -> Self {
        let mut caption = Self {
            tags: Vec::new(),
            ..self.clone()
        };
        caption.tags = Self::new(self.tags.iter().map(|t| formal_spelling(t))).tags;
        caption.recompute_quality();
        caption.recompute_characters();
        caption.recompute_styles();
        caption.recompute_artist();
        caption
    }

    /// Stable sort by the first matching priority group (lowest priority first).
    ///
    /// Tags matching no group keep their relative order at the end.
    #[must_use]
    pub fn sorted_by_priority(&self, priorities: &[TagPriority]) -> Self {
        let rank = |tag: &str| {
            priorities
                .iter()
                .filter(|p| p.is_match(tag))
                .map(TagPriority::priority)
                .min()
                .unwrap_or(i32::MAX)
        };
        let mut tags = self.tags.clone();
        tags.sort_by_cached_key(|t| rank(t.as_str()));
        Self {
            tags,
            ..self.clone()
        }
    }

    /// Drop later tags that repeat an earlier one by normalized spelling
    #[must_use]
    pub fn unique(&self) -> Self {
        Self {
            tags: Self::new(&self.tags).tags,
            ..self.clone()
        }
    }

    fn names_of(&self, kind: TagKind) -> Vec<String> {
        self.tags
            .iter()
            .filter_map(|t| match tags::tag_kind(t) {
                Some((k, name)) if k == kind => Some(name.to_string()),
                _ => None,
            })
            .collect()
    }
}

fn formal_spelling(tag: &str) -> String {
    let normalized = tags::normalize_tag(tag);
    let readable = normalized.replace('_', " ");
    match tags::tag_kind(&readable) {
        Some((kind, name)) => format!("{} {}", kind.prefix(), name),
        None => readable,
    }
}

impl fmt::Display for Caption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tags.join(TAG_SEPARATOR))
    }
}

impl FromStr for Caption {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl<'a> IntoIterator for &'a Caption {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.iter()
    }
}

impl BitOr for &Caption {
    type Output = Caption;

    fn bitor(self, rhs: Self) -> Caption {
        self.union(rhs)
    }
}

impl Sub for &Caption {
    type Output = Caption;

    fn sub(self, rhs: Self) -> Caption {
        self.difference(rhs)
    }
}
