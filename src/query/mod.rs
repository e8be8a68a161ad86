//! Boolean tag queries over a [`TagIndex`]
//!
//! A query has an include side and an exclude side, each a list of tag
//! patterns folded with [`Condition::Any`] (union) or [`Condition::All`]
//! (intersection). Every key set is first restricted to the working subset.
//!
//! The exclude side is turned into "subset keys not matching the exclude
//! criteria" and joined with the include side by a [`Joiner`]. The result can
//! therefore never leave the subset.

pub mod error;

pub use error::QueryError;

use crate::index::TagIndex;
use crate::record::RecordKey;
use crate::store::Store;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// How the key sets of several tags combine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    #[default]
    Any,
    All,
}

/// How the include result combines with the exclude complement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Joiner {
    #[default]
    And,
    Or,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Any => "any",
            Self::All => "all",
        })
    }
}

impl fmt::Display for Joiner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::And => "and",
            Self::Or => "or",
        })
    }
}

/// Include/exclude tag query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub include: Vec<String>,
    pub include_condition: Condition,
    pub exclude: Vec<String>,
    pub exclude_condition: Condition,
    pub joiner: Joiner,
    /// Treat patterns as regular expressions matched against indexed tags
    pub regex: bool,
}

impl Query {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn include<I, S>(mut self, tags: I, condition: Condition) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include = tags.into_iter().map(Into::into).collect();
        self.include_condition = condition;
        self
    }

    #[must_use]
    pub fn exclude<I, S>(mut self, tags: I, condition: Condition) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = tags.into_iter().map(Into::into).collect();
        self.exclude_condition = condition;
        self
    }

    #[must_use]
    pub const fn joiner(mut self, joiner: Joiner) -> Self {
        self.joiner = joiner;
        self
    }

    #[must_use]
    pub const fn regex(mut self, regex: bool) -> Self {
        self.regex = regex;
        self
    }
}

/// Keys matched by a query, sorted by key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    pub keys: Vec<RecordKey>,
    /// Size of the subset the query ran over
    pub searched: usize,
}

impl QueryResult {
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Compile a regex-mode pattern: anchored at the start of the tag, with
/// literal spaces also matching underscores
///
/// # Errors
///
/// Returns `QueryError::InvalidPattern` if the pattern does not compile.
pub fn compile_pattern(pattern: &str) -> Result<Regex, QueryError> {
    let source = format!("^(?:{})", pattern.replace(' ', r"[\s_]"));
    Regex::new(&source).map_err(|e| QueryError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

#[derive(Debug)]
struct Fold {
    condition: Condition,
    keys: Option<HashSet<RecordKey>>,
}

impl Fold {
    fn new(condition: Condition) -> Self {
        Self {
            condition,
            keys: None,
        }
    }

    /// Empty contributions are skipped; the first non-empty one seeds the set.
    fn push(&mut self, contribution: HashSet<RecordKey>) {
        if contribution.is_empty() {
            return;
        }
        let Some(keys) = &mut self.keys else {
            self.keys = Some(contribution);
            return;
        };
        match self.condition {
            Condition::Any => keys.extend(contribution),
            Condition::All => keys.retain(|k| contribution.contains(k)),
        }
    }

    fn finish(self) -> HashSet<RecordKey> {
        self.keys.unwrap_or_default()
    }
}

/// Evaluates [`Query`]s against a tag index
#[derive(Debug, Clone, Copy)]
pub struct QueryEngine<'a> {
    index: &'a TagIndex,
}

impl<'a> QueryEngine<'a> {
    #[must_use]
    pub const fn new(index: &'a TagIndex) -> Self {
        Self { index }
    }

    /// Run `query` over the records of `subset`
    ///
    /// # Errors
    ///
    /// Returns `QueryError::InvalidPattern` if regex mode is on and a pattern
    /// does not compile. Nothing is evaluated in that case.
    pub fn evaluate(&self, query: &Query, subset: &Store) -> Result<QueryResult, QueryError> {
        let included = self.side(&query.include, query.include_condition, query.regex, subset)?;
        let excluded = self.side(&query.exclude, query.exclude_condition, query.regex, subset)?;

        let remaining: HashSet<RecordKey> = subset
            .keys()
            .filter(|k| !excluded.contains(*k))
            .cloned()
            .collect();

        let joined: HashSet<RecordKey> = match query.joiner {
            Joiner::And => included.intersection(&remaining).cloned().collect(),
            Joiner::Or => included.union(&remaining).cloned().collect(),
        };
        let mut keys: Vec<RecordKey> = joined.into_iter().collect();
        keys.sort_unstable();

        debug!(
            matched = keys.len(),
            searched = subset.len(),
            joiner = %query.joiner,
            "evaluated query"
        );
        Ok(QueryResult {
            keys,
            searched: subset.len(),
        })
    }

    fn side(
        &self,
        patterns: &[String],
        condition: Condition,
        regex: bool,
        subset: &Store,
    ) -> Result<HashSet<RecordKey>, QueryError> {
        let mut fold = Fold::new(condition);
        for pattern in patterns {
            for keys in self.resolve(pattern, regex)? {
                fold.push(
                    keys.iter()
                        .filter(|k| subset.contains(k.as_str()))
                        .cloned()
                        .collect(),
                );
            }
        }
        Ok(fold.finish())
    }

    /// Key sets of every indexed tag `pattern` stands for
    fn resolve(&self, pattern: &str, regex: bool) -> Result<Vec<&'a HashSet<RecordKey>>, QueryError> {
        if !regex {
            return Ok(self.index.get(pattern).into_iter().collect());
        }
        let regex = compile_pattern(pattern)?;
        let index = self.index;
        Ok(index
            .matching(&regex)
            .filter_map(|tag| index.get(tag))
            .collect())
    }
}
