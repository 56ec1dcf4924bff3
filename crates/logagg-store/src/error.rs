//! Error types for store operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during store operations.
///
/// Everything except [`StoreError::Open`] is recoverable by the caller.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Store could not be opened (unwritable, locked, or corrupt catalog)
    #[error("failed to open store at {path}: {message}")]
    Open { path: PathBuf, message: String },

    /// Partition was never created
    #[error("partition not found: {0}")]
    PartitionNotFound(String),

    /// Key is absent from an existing partition
    #[error("key {key} not found in partition '{partition}'")]
    NotFound { partition: String, key: String },

    /// Store handle already closed
    #[error("store is closed")]
    Closed,

    /// Underlying RocksDB operation failed
    #[error("RocksDB {operation} failed on partition '{partition}': {source}")]
    RocksDb {
        operation: &'static str,
        partition: String,
        #[source]
        source: rocksdb::Error,
    },

    /// Value serialization/deserialization error
    #[error("codec error in partition '{partition}': {source}")]
    Codec {
        partition: String,
        #[source]
        source: serde_json::Error,
    },

    /// Stored key bytes could not be decoded
    #[error("malformed key: {0}")]
    MalformedKey(String),
}

impl StoreError {
    pub(crate) fn rocksdb(
        operation: &'static str,
        partition: &str,
        source: rocksdb::Error,
    ) -> Self {
        Self::RocksDb {
            operation,
            partition: partition.to_string(),
            source,
        }
    }

    pub(crate) fn codec(partition: &str, source: serde_json::Error) -> Self {
        Self::Codec {
            partition: partition.to_string(),
            source,
        }
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
