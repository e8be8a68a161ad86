//! Capstore - an indexed record store for curating tagged image captions
//!
//! This library keeps an ordered collection of image records keyed by a stable
//! identifier, together with the structures an interactive curation tool needs
//! on top of it: a tag inverted index with boolean queries, per-record undo/redo,
//! a dirty buffer that drives incremental saves, and paginated views.
//!
//! The [`session::Session`] type wires the pieces together and is the single
//! commit path for every mutation.

use thiserror::Error;

pub mod batch;
pub mod buffer;
pub mod chunk;
pub mod config;
pub mod history;
pub mod index;
pub mod ops;
pub mod persist;
pub mod query;
pub mod record;
pub mod session;
pub mod store;

#[cfg(test)]
pub mod testing;

pub use batch::{BatchEditor, BatchOutcome, CancelToken, EditOutcome};
pub use buffer::DirtyBuffer;
pub use chunk::ChunkedView;
pub use config::StoreConfig;
pub use history::{EditHistory, HistoryEntry};
pub use index::TagIndex;
pub use ops::{CaptionEdit, CaptionOp, CaptionOperation};
pub use persist::{PersistenceManager, SaveReport};
pub use query::{Condition, Joiner, Query, QueryEngine, QueryResult};
pub use record::{Caption, Record, RecordKey};
pub use session::{Page, Session};
pub use store::{SortKey, Store};

/// Error enum, contains all failure states of the store
#[derive(Debug, Error)]
pub enum StoreError {
    /// A key that is not present in the store was referenced
    #[error("Record not found: {0}")]
    NotFound(String),
    /// Persistence error
    #[error("Persistence error: {0}")]
    Persist(#[from] persist::PersistError),
    /// Query error
    #[error("Query error: {0}")]
    Query(#[from] query::QueryError),
    /// Represents a configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),
    /// Represents an I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The batch worker pool could not be started
    #[error("Worker pool error: {0}")]
    WorkerPool(String),
    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<rayon::ThreadPoolBuildError> for StoreError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        Self::WorkerPool(err.to_string())
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, StoreError>;
