//! Error types for archive operations.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during extraction and post-processing.
///
/// All of them are local to one archive; callers record them and move on.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Extension is not tar, tgz or tar.gz
    #[error("unsupported archive format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    /// Stream ended in the middle of an entry
    #[error("truncated archive: {0}")]
    Truncated(String),

    /// Corrupt gzip stream or tar header
    #[error("malformed archive: {0}")]
    Malformed(String),

    /// Filesystem error
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Archive contained no safe entry to take a top-level name from
    #[error("no top-level directory found in {}", .0.display())]
    NoTopLevelDirectory(PathBuf),

    /// Name is not a single path component
    #[error("invalid directory name: {0:?}")]
    InvalidName(String),

    /// Cancellation requested
    #[error("operation cancelled")]
    Cancelled,
}

impl ArchiveError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Classify an error raised while reading the archive stream.
    ///
    /// tar reports early EOF as `UnexpectedEof` or as an `Other` error whose
    /// message mentions EOF or an incomplete block; flate2 reports corrupt
    /// input as `InvalidInput`/`InvalidData`.
    pub(crate) fn from_stream(source: &Path, err: io::Error) -> Self {
        let message = err.to_string();
        let truncated = err.kind() == io::ErrorKind::UnexpectedEof
            || message.contains("EOF")
            || message.contains("entire block");
        let detail = format!("{}: {}", source.display(), message);
        if truncated {
            Self::Truncated(detail)
        } else {
            Self::Malformed(detail)
        }
    }
}

/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;
