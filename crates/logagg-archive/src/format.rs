//! Archive format detection by file name.

use crate::error::{ArchiveError, Result};
use std::path::Path;

/// Supported archive container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// gzip-compressed tar (`.tgz`, `.tar.gz`)
    TarGz,
    /// plain tar (`.tar`)
    Tar,
}

impl ArchiveFormat {
    /// Detect the format from the file name's extension, case-insensitively.
    pub fn detect(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| ArchiveError::UnsupportedFormat(path.to_path_buf()))?;

        if name.ends_with(".tgz") || name.ends_with(".tar.gz") {
            Ok(Self::TarGz)
        } else if name.ends_with(".tar") {
            Ok(Self::Tar)
        } else {
            Err(ArchiveError::UnsupportedFormat(path.to_path_buf()))
        }
    }
}
