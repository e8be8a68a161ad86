//! Tag spelling and classification helpers
//!
//! Every place that compares or indexes tags goes through [`normalize_tag`], so
//! `long hair`, `long_hair` and ` long  hair ` collapse to one canonical key.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Quality levels understood by [`quality_level`], worst to best
pub const QUALITY_LEVELS: [&str; 7] = [
    "horrible", "worst", "low", "normal", "high", "best", "amazing",
];

const QUALITY_SUFFIX: &str = "_quality";

/// Classification partition a tag can belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagKind {
    Artist,
    Character,
    Style,
}

impl TagKind {
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Artist => "artist:",
            Self::Character => "character:",
            Self::Style => "style:",
        }
    }

    const ALL: [Self; 3] = [Self::Artist, Self::Character, Self::Style];
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Artist => write!(f, "artist"),
            Self::Character => write!(f, "character"),
            Self::Style => write!(f, "style"),
        }
    }
}

fn fold_separators(s: &str) -> String {
    let unescaped = s.replace("\\(", "(").replace("\\)", ")");
    let mut out = String::with_capacity(unescaped.len());
    let mut pending_sep = false;
    for ch in unescaped.chars() {
        if ch.is_whitespace() || ch == '_' {
            pending_sep = true;
            continue;
        }
        if pending_sep && !out.is_empty() {
            out.push('_');
        }
        pending_sep = false;
        out.push(ch);
    }
    out
}

/// Split a raw tag into its classification partition and bare name.
///
/// Recognizes the `artist:`, `character:` and `style:` prefixes
/// (case-insensitive, surrounding whitespace ignored).
#[must_use]
pub fn tag_kind(tag: &str) -> Option<(TagKind, &str)> {
    let trimmed = tag.trim();
    TagKind::ALL.into_iter().find_map(|kind| {
        let prefix = kind.prefix();
        let head = trimmed.get(..prefix.len())?;
        if head.eq_ignore_ascii_case(prefix) {
            let name = trimmed[prefix.len()..].trim_matches(|c: char| c.is_whitespace() || c == '_');
            (!name.is_empty()).then_some((kind, name))
        } else {
            None
        }
    })
}

/// Canonical spelling of a tag used as the index key.
///
/// Unescapes `\(`/`\)`, folds runs of whitespace and underscores into a single
/// `_`, and trims separators at both ends. Classification prefixes are kept
/// but the separator after the colon is dropped (`artist: foo` -> `artist:foo`).
#[must_use]
pub fn normalize_tag(tag: &str) -> String {
    match tag_kind(tag) {
        Some((kind, name)) => format!("{}{}", kind.prefix(), fold_separators(name)),
        None => fold_separators(tag),
    }
}

/// Quality level named by a `<level> quality` tag, if it is one.
#[must_use]
pub fn quality_level(tag: &str) -> Option<&'static str> {
    let normalized = normalize_tag(tag);
    let level = normalized.strip_suffix(QUALITY_SUFFIX)?;
    QUALITY_LEVELS.iter().copied().find(|l| *l == level)
}

/// Human spelling of the tag for a quality level
#[must_use]
pub fn quality_tag(level: &str) -> String {
    format!("{} quality", level.trim())
}

/// Named group of tag patterns used to order captions.
///
/// Patterns are joined into one alternation; spaces inside a pattern match
/// either whitespace or an underscore.
#[derive(Debug, Clone)]
pub struct TagPriority {
    name: String,
    patterns: Vec<String>,
    priority: i32,
    regex: Regex,
}

impl TagPriority {
    /// # Errors
    ///
    /// Returns `regex::Error` if the joined patterns do not compile.
    pub fn new(name: impl Into<String>, patterns: Vec<String>, priority: i32) -> Result<Self, regex::Error> {
        let joined = patterns.join("|").replace(' ', r"[\s_]");
        let regex = Regex::new(&joined)?;
        Ok(Self {
            name: name.into(),
            patterns,
            priority,
            regex,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    #[must_use]
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    #[must_use]
    pub fn is_match(&self, tag: &str) -> bool {
        self.regex.is_match(tag)
    }
}
