//! Error types for configuration loading.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from loading or validating a configuration file.
///
/// All of them are fatal: a pipeline never starts on a config that fails here.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}
