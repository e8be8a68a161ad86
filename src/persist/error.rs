//! Persistence error types
//!
//! Errors raised while reading or writing the database file and sidecar
//! caption files.
//!
//! A database file that fails to parse during a save is not an error: it is
//! backed up and replaced, and the save reports the recovery instead.

use std::io;
use std::path::Path;
use thiserror::Error;

/// Persistence-specific errors
#[derive(Debug, Error)]
pub enum PersistError {
    /// Filesystem failure on a specific path
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// A database file that could not be parsed while loading
    #[error("Failed to parse database file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The merged document could not be serialized
    #[error("Error during serialization: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A database entry that does not describe a valid record
    #[error("Invalid record '{key}': {reason}")]
    InvalidRecord { key: String, reason: String },

    /// A directory scan pattern that could not be compiled
    #[error("Invalid scan pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },
}

impl PersistError {
    /// Wrap an I/O error with the path it happened on
    #[must_use]
    pub fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;
