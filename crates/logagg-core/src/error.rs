//! Stage error type.

use logagg_archive::ArchiveError;
use logagg_config::ConfigError;
use logagg_store::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of one pipeline stage or one of its items.
///
/// Stage errors never abort a run: the orchestrator records them in the
/// audit trail and moves on to the next stage.
#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Archive(ArchiveError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("download of {url} failed: {message}")]
    Download { url: String, message: String },

    #[error("command `{command}` failed with status {}: {stderr}", status_text(*status))]
    CommandFailed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("command `{command}` exceeded its {budget_ms} ms budget")]
    Timeout { command: String, budget_ms: u64 },

    #[error("cancelled")]
    Cancelled,

    #[error("{failed} of {total} items failed")]
    Partial { failed: usize, total: usize },
}

impl StageError {
    pub(crate) fn download(url: &str, message: impl std::fmt::Display) -> Self {
        Self::Download {
            url: url.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

fn status_text(status: Option<i32>) -> String {
    status.map_or_else(|| "none".to_string(), |s| s.to_string())
}

impl From<ArchiveError> for StageError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::Cancelled => Self::Cancelled,
            other => Self::Archive(other),
        }
    }
}
