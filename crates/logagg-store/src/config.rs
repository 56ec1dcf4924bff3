//! Store tuning options.

/// Default limit on open SST files.
pub const DEFAULT_MAX_OPEN_FILES: i32 = 256;

/// Configuration for [`crate::PartitionedStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Skip the write-ahead log on puts (default: true).
    ///
    /// Audit records are status lines, not critical state: a crash may lose
    /// the most recent unflushed records. `close()` flushes every partition.
    pub disable_wal: bool,

    /// Create the database if the directory holds none (default: true).
    pub create_if_missing: bool,

    /// Maximum number of open files (default: 256).
    pub max_open_files: i32,
}

impl StoreConfig {
    /// Keep the write-ahead log enabled.
    pub fn durable(mut self) -> Self {
        self.disable_wal = false;
        self
    }

    pub fn with_max_open_files(mut self, max_open_files: i32) -> Self {
        self.max_open_files = max_open_files;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            disable_wal: true,
            create_if_missing: true,
            max_open_files: DEFAULT_MAX_OPEN_FILES,
        }
    }
}
