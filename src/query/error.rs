//! Query error types

use thiserror::Error;

/// Query-specific errors
#[derive(Debug, Error)]
pub enum QueryError {
    /// A regex-mode pattern that does not compile
    #[error("Invalid query pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;
