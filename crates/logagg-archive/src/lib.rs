//! Archive extraction for collected server dumps.
//!
//! This crate provides:
//! - [`ArchiveExtractor`]: streaming tar / tar.gz extraction that writes only
//!   regular files under allow-listed subtrees of the archive's top-level
//!   directory
//! - [`rename_extracted_directory`]: idempotent rename of the discovered
//!   top-level directory to the configured server name
//! - [`unzip_secondary_logs`]: in-place decompression of rotated `*.gz` logs
//! - [`cleanup`]: removal of a unit's archives and extracted data

pub mod cleanup;
pub mod error;
pub mod extract;
pub mod format;
pub mod gunzip;
pub mod rename;
pub mod sanitize;

pub use error::{ArchiveError, Result};
pub use extract::{ArchiveExtractor, UnpackReport};
pub use format::ArchiveFormat;
pub use gunzip::{unzip_secondary_logs, unzip_secondary_logs_with_cancel, GunzipReport};
pub use rename::rename_extracted_directory;
pub use sanitize::sanitize_entry_path;

/// Size of the buffer used when copying entry and file contents.
pub(crate) const COPY_CHUNK: usize = 64 * 1024;
