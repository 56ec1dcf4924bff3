//! Error types shared across the log aggregation tools.

use thiserror::Error;

/// Result type alias for common operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for identifiers and records.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid aggregation unit '{name}': {reason}")]
    InvalidUnit { name: String, reason: String },

    #[error("timestamp {0} is out of range")]
    TimestampOutOfRange(i64),
}
