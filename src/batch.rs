//! Parallel batch edits with cancellation
//!
//! A batch applies one edit function to every record of a working set. The
//! workers only read the shared records and return new values; nothing is
//! committed until every worker has finished. A cancelled batch returns
//! [`BatchOutcome::Cancelled`] and its results are dropped whole.

use crate::record::Record;
use crate::Result;
use rayon::ThreadPoolBuilder;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Result of applying an edit to one record
#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    /// The edit produced a new value for the record
    Changed(Record),
    /// The record is left as it was
    Unchanged,
}

impl EditOutcome {
    #[must_use]
    pub const fn is_changed(&self) -> bool {
        matches!(self, Self::Changed(_))
    }
}

/// Result of a whole batch
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// Every record was processed; outcomes follow input order
    Completed(Vec<EditOutcome>),
    /// The batch was cancelled and nothing may be committed
    Cancelled,
}

impl BatchOutcome {
    /// Changed records in input order (none if cancelled)
    #[must_use]
    pub fn into_changed(self) -> Vec<Record> {
        match self {
            Self::Completed(outcomes) => outcomes
                .into_iter()
                .filter_map(|outcome| match outcome {
                    EditOutcome::Changed(record) => Some(record),
                    EditOutcome::Unchanged => None,
                })
                .collect(),
            Self::Cancelled => Vec::new(),
        }
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Shared flag requesting cancellation of an in-flight batch
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs edit functions over many records on a bounded worker pool
#[derive(Debug, Clone, Copy)]
pub struct BatchEditor {
    workers: usize,
}

impl Default for BatchEditor {
    fn default() -> Self {
        Self { workers: 1 }
    }
}

impl BatchEditor {
    /// Editor with `workers` threads; `0` is treated as `1`
    #[must_use]
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Apply `edit` to every record.
    ///
    /// With a single worker the records are processed in order on the calling
    /// thread. The token is checked before each record and once more after
    /// all records are done.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::WorkerPool` if the thread pool cannot be built.
    pub fn run<F>(&self, records: &[Arc<Record>], edit: F, cancel: &CancelToken) -> Result<BatchOutcome>
    where
        F: Fn(&Record) -> EditOutcome + Sync,
    {
        let outcomes: Vec<Option<EditOutcome>> = if self.workers == 1 {
            let mut outcomes = Vec::with_capacity(records.len());
            for record in records {
                if cancel.is_cancelled() {
                    break;
                }
                outcomes.push(Some(edit(record)));
            }
            outcomes
        } else {
            use rayon::prelude::*;

            let pool = ThreadPoolBuilder::new()
                .num_threads(self.workers)
                .build()?;
            pool.install(|| {
                records
                    .par_iter()
                    .map(|record| (!cancel.is_cancelled()).then(|| edit(record)))
                    .collect()
            })
        };

        if cancel.is_cancelled() {
            info!(total = records.len(), "batch edit cancelled");
            return Ok(BatchOutcome::Cancelled);
        }

        let outcomes: Vec<EditOutcome> = outcomes.into_iter().flatten().collect();
        debug!(
            total = outcomes.len(),
            changed = outcomes.iter().filter(|o| o.is_changed()).count(),
            workers = self.workers,
            "batch edit finished"
        );
        Ok(BatchOutcome::Completed(outcomes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Caption;
    use crate::testing::record;

    fn records(n: usize) -> Vec<Arc<Record>> {
        (0..n)
            .map(|i| Arc::new(record(&format!("k{i:03}"), "1girl")))
            .collect()
    }

    fn add_smile(record: &Record) -> EditOutcome {
        let mut edited = record.clone();
        edited.caption = Some(Caption::parse("1girl, smile"));
        EditOutcome::Changed(edited)
    }

    #[test]
    fn test_sequential_keeps_order() {
        let input = records(5);
        let outcome = BatchEditor::new(1)
            .run(&input, add_smile, &CancelToken::new())
            .unwrap();
        let changed = outcome.into_changed();
        let keys: Vec<_> = changed.iter().map(|r| r.key().to_string()).collect();
        assert_eq!(keys, ["k000", "k001", "k002", "k003", "k004"]);
    }

    #[test]
    fn test_parallel_keeps_order() {
        let input = records(64);
        let outcome = BatchEditor::new(4)
            .run(&input, add_smile, &CancelToken::new())
            .unwrap();
        let changed = outcome.into_changed();
        assert_eq!(changed.len(), 64);
        assert!(changed.iter().zip(&input).all(|(a, b)| a.key() == b.key()));
    }

    #[test]
    fn test_workers_do_not_touch_shared_records() {
        let input = records(3);
        BatchEditor::new(2)
            .run(&input, add_smile, &CancelToken::new())
            .unwrap();
        assert!(input.iter().all(|r| r.caption == Some(Caption::parse("1girl"))));
    }

    #[test]
    fn test_unchanged_outcomes_are_not_committed() {
        let input = records(3);
        let outcome = BatchEditor::new(1)
            .run(&input, |_| EditOutcome::Unchanged, &CancelToken::new())
            .unwrap();
        assert!(!outcome.is_cancelled());
        assert!(outcome.into_changed().is_empty());
    }

    #[test]
    fn test_cancel_mid_batch_discards_everything() {
        let input = records(10);
        let token = CancelToken::new();
        let edit = |record: &Record| {
            if record.key().as_str() == "k004" {
                token.cancel();
            }
            add_smile(record)
        };
        let outcome = BatchEditor::new(1).run(&input, edit, &token).unwrap();
        assert_eq!(outcome, BatchOutcome::Cancelled);
        assert!(outcome.into_changed().is_empty());
    }

    #[test]
    fn test_cancel_mid_parallel_batch_discards_everything() {
        let input = records(200);
        let token = CancelToken::new();
        let edit = |record: &Record| {
            if record.key().as_str() == "k100" {
                token.cancel();
            }
            add_smile(record)
        };
        let outcome = BatchEditor::new(4).run(&input, edit, &token).unwrap();
        assert_eq!(outcome, BatchOutcome::Cancelled);
        assert!(outcome.into_changed().is_empty());
    }

    #[test]
    fn test_cancelled_before_start() {
        let token = CancelToken::new();
        token.cancel();
        let outcome = BatchEditor::new(3).run(&records(8), add_smile, &token).unwrap();
        assert!(outcome.is_cancelled());
    }

    #[test]
    fn test_zero_workers_is_one() {
        assert_eq!(BatchEditor::new(0).workers(), 1);
    }
}
