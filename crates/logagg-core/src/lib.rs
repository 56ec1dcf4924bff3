//! Log aggregation pipeline.
//!
//! This crate wires the store, configuration and archive crates into the
//! processing pipeline driven by the `logagg` binary:
//! - [`state`]: the pipeline state machine and stage messages
//! - [`pipeline`]: orchestration, run reports, parallel runs per unit
//! - [`stages`]: download, extract, transform, load and dashboard deploy
//! - [`downloader`], [`runner`], [`dashboard`]: seams to external systems
//! - [`exit_codes`], [`logging`]: CLI plumbing

pub mod dashboard;
pub mod downloader;
pub mod error;
pub mod exit_codes;
pub mod logging;
pub mod pipeline;
pub mod runner;
pub mod stages;
pub mod state;

pub use dashboard::{kibana_tools_command, DashboardDeployer, DockerDashboardDeployer};
pub use downloader::{DownloadOutcome, Downloader, HttpDownloader};
pub use error::StageError;
pub use exit_codes::ExitCode;
pub use pipeline::{
    abort_run, combined_exit_code, run_from_config_file, run_units, Collaborators, Pipeline,
    RunReport, StageOutcome,
};
pub use runner::{
    shell_quote, CommandOutput, CommandRunner, CommandSpec, DryRunCommandRunner,
    ShellCommandRunner,
};
pub use state::{PipelineState, Stage};
