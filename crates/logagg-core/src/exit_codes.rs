//! Exit codes for the logagg CLI.
//!
//! Exit codes communicate the outcome of a run without output parsing.

/// Exit codes for logagg operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(i32)]
pub enum ExitCode {
    /// Every stage succeeded
    Clean = 0,

    /// At least one stage failed; later stages still ran
    PartialFail = 3,

    /// Run cancelled (Ctrl-C)
    Interrupted = 6,

    /// Configuration could not be loaded or validated
    ConfigError = 10,

    /// Filesystem error outside a stage
    IoError = 13,

    /// Store could not be opened or closed
    StoreError = 14,

    /// Internal/unknown error
    InternalError = 99,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
