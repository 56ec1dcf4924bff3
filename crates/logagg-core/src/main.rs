//! logagg: download, extract and load collected server logs.

use clap::{ArgAction, Parser, Subcommand};
use logagg_archive::{cleanup, ArchiveError};
use logagg_common::{AggregationUnit, CancelFlag};
use logagg_config::{ConfigError, IntegrationToolConfig, Layout};
use logagg_core::logging::{init_logging, LogFormat};
use logagg_core::{
    abort_run, combined_exit_code, run_units, Collaborators, CommandRunner, DockerDashboardDeployer,
    DryRunCommandRunner, ExitCode, HttpDownloader, Pipeline, RunReport, ShellCommandRunner, Stage,
    StageError,
};
use logagg_store::{AuditTrail, PartitionedStore, StoreError};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "logagg", version, about = "Download, extract and load collected server logs")]
struct Cli {
    /// Root directory for archives, extracted data and the store
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full pipeline for one or more units (in parallel)
    Process {
        #[arg(required = true)]
        units: Vec<String>,

        /// Tool configuration file (JSON)
        #[arg(long)]
        config: PathBuf,

        /// Log transform, load and dashboard commands instead of running them
        #[arg(long)]
        dry_run: bool,

        /// Print run reports as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the extract stage only
    Unpack {
        unit: String,

        #[arg(long)]
        config: PathBuf,
    },

    /// Print the audit trail of a unit
    Status {
        unit: String,

        #[arg(long)]
        json: bool,
    },

    /// List store partitions
    Partitions,

    /// Remove downloaded archives and/or extracted data of a unit
    Cleanup {
        unit: String,

        #[arg(long)]
        archives: bool,

        #[arg(long)]
        data: bool,
    },
}

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Unit(#[from] logagg_common::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Unit(_) | CliError::Config(_) => ExitCode::ConfigError,
            CliError::Store(_) => ExitCode::StoreError,
            CliError::Archive(_) => ExitCode::IoError,
            CliError::Json(_) => ExitCode::InternalError,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.verbose);

    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\n[logagg] cancelling...");
        handler_flag.cancel();
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler");
    }

    let layout = Layout::resolve(cli.root.as_deref());
    let code = match run(cli.command, &layout, &cancel) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            e.exit_code()
        }
    };
    std::process::exit(code.as_i32());
}

fn run(command: Commands, layout: &Layout, cancel: &CancelFlag) -> Result<ExitCode, CliError> {
    match command {
        Commands::Process {
            units,
            config,
            dry_run,
            json,
        } => {
            let units = parse_units(&units)?;
            with_store(layout, |store| {
                let reports = process(store, layout, &config, &units, dry_run, cancel);
                print_reports(&reports, json)?;
                Ok(combined_exit_code(&reports))
            })
        }
        Commands::Unpack { unit, config } => {
            let unit = AggregationUnit::parse(&unit)?;
            with_store(layout, |store| {
                let config = match IntegrationToolConfig::load(&config) {
                    Ok(config) => config,
                    Err(e) => {
                        let report = abort_run(store, &unit, &StageError::from(e));
                        eprintln!("{}", report.error.unwrap_or_default());
                        return Ok(ExitCode::ConfigError);
                    }
                };
                let runner = DryRunCommandRunner::new();
                let downloader = HttpDownloader::new();
                let dashboards = DockerDashboardDeployer::new(&runner);
                let collaborators = Collaborators {
                    downloader: &downloader,
                    runner: &runner,
                    dashboards: &dashboards,
                };
                let pipeline = Pipeline::new(store, layout, &config, collaborators, cancel);
                let outcome = pipeline.run_only(&unit, Stage::Extract);
                println!(
                    "{}: {} ({})",
                    outcome.stage,
                    if outcome.succeeded { "ok" } else { "failed" },
                    outcome.detail
                );
                Ok(if outcome.succeeded {
                    ExitCode::Clean
                } else if outcome.cancelled {
                    ExitCode::Interrupted
                } else {
                    ExitCode::PartialFail
                })
            })
        }
        Commands::Status { unit, json } => {
            let unit = AggregationUnit::parse(&unit)?;
            with_store(layout, |store| {
                let records = AuditTrail::new(store).read_all(&unit)?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&records)?);
                } else {
                    for record in &records {
                        println!("{}  {}", record.key.derived_date, record.message);
                    }
                }
                Ok(ExitCode::Clean)
            })
        }
        Commands::Partitions => with_store(layout, |store| {
            for name in store.partitions()? {
                println!("{name}");
            }
            Ok(ExitCode::Clean)
        }),
        Commands::Cleanup {
            unit,
            archives,
            data,
        } => {
            let unit = AggregationUnit::parse(&unit)?;
            let both = !archives && !data;
            if archives || both {
                let removed = cleanup::remove_archives(layout, &unit)?;
                println!("archives: {}", if removed { "removed" } else { "absent" });
            }
            if data || both {
                let removed = cleanup::remove_unpacked(layout, &unit)?;
                println!("data: {}", if removed { "removed" } else { "absent" });
            }
            Ok(ExitCode::Clean)
        }
    }
}

/// Open the store, run `f`, and close the store exactly once.
fn with_store<F>(layout: &Layout, f: F) -> Result<ExitCode, CliError>
where
    F: FnOnce(&PartitionedStore) -> Result<ExitCode, CliError>,
{
    let store = PartitionedStore::open(layout.db_dir())?;
    let result = f(&store);
    store.close()?;
    result
}

fn parse_units(names: &[String]) -> Result<Vec<AggregationUnit>, CliError> {
    let mut units: Vec<AggregationUnit> = Vec::with_capacity(names.len());
    for name in names {
        let unit = AggregationUnit::parse(name)?;
        if !units.contains(&unit) {
            units.push(unit);
        }
    }
    Ok(units)
}

fn process(
    store: &PartitionedStore,
    layout: &Layout,
    config_path: &std::path::Path,
    units: &[AggregationUnit],
    dry_run: bool,
    cancel: &CancelFlag,
) -> Vec<RunReport> {
    let config = match IntegrationToolConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            let err = StageError::from(e);
            return units.iter().map(|unit| abort_run(store, unit, &err)).collect();
        }
    };

    let shell = ShellCommandRunner::new();
    let dry = DryRunCommandRunner::new();
    let runner: &dyn CommandRunner = if dry_run { &dry } else { &shell };
    let downloader = HttpDownloader::new();
    let dashboards = DockerDashboardDeployer::new(runner);
    let collaborators = Collaborators {
        downloader: &downloader,
        runner,
        dashboards: &dashboards,
    };

    info!(units = units.len(), root = %layout.root().display(), dry_run, "processing units");
    let pipeline = Pipeline::new(store, layout, &config, collaborators, cancel);
    run_units(&pipeline, units)
}

fn print_reports(reports: &[RunReport], json: bool) -> Result<(), CliError> {
    if json {
        println!("{}", serde_json::to_string_pretty(reports)?);
        return Ok(());
    }
    for report in reports {
        println!("{} {} {}", report.unit, report.run_id, report.final_state);
        if let Some(error) = &report.error {
            println!("  error: {error}");
        }
        for stage in &report.stages {
            println!(
                "  {:<16} {:<6} {:>7} ms  {}",
                stage.stage.label(),
                if stage.succeeded { "ok" } else { "FAILED" },
                stage.duration_ms,
                stage.detail
            );
        }
    }
    Ok(())
}
