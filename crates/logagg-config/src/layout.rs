//! Filesystem layout for archives, extracted data, and the store.
//!
//! ```text
//! <root>/
//! ├── archives/<unit>/<archive>.<ext>   # downloaded archives
//! ├── data/<unit>/<server>/...          # extracted, allow-listed subtrees only
//! └── db/                               # partitioned audit store
//! ```

use crate::tool::ArchiveConfig;
use logagg_common::AggregationUnit;
use std::path::{Path, PathBuf};

/// Environment variable overriding the root directory.
pub const ENV_ROOT: &str = "LOGAGG_ROOT";

const DIR_NAME: &str = "log_aggregation";
const ARCHIVES_DIR: &str = "archives";
const DATA_DIR: &str = "data";
const DB_DIR: &str = "db";

/// Resolved directory layout under one root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the root: explicit path → `LOGAGG_ROOT` → platform data dir → `.`.
    pub fn resolve(explicit: Option<&Path>) -> Self {
        if let Some(path) = explicit {
            return Self::new(path);
        }
        if let Ok(dir) = std::env::var(ENV_ROOT) {
            if !dir.is_empty() {
                return Self::new(dir);
            }
        }
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(base.join(DIR_NAME))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a unit's downloaded archives.
    pub fn archives_dir(&self, unit: &AggregationUnit) -> PathBuf {
        self.root.join(ARCHIVES_DIR).join(unit.as_str())
    }

    /// Local path of one downloaded archive.
    pub fn archive_path(&self, unit: &AggregationUnit, archive: &ArchiveConfig) -> PathBuf {
        self.archives_dir(unit).join(archive.file_name())
    }

    /// Extraction root for a unit.
    pub fn data_dir(&self, unit: &AggregationUnit) -> PathBuf {
        self.root.join(DATA_DIR).join(unit.as_str())
    }

    /// Extracted directory of one server (archive) after renaming.
    pub fn server_dir(&self, unit: &AggregationUnit, server: &str) -> PathBuf {
        self.data_dir(unit).join(server)
    }

    /// Store directory.
    pub fn db_dir(&self) -> PathBuf {
        self.root.join(DB_DIR)
    }
}
