//! Pipeline orchestration.
//!
//! A [`Pipeline`] runs the five stages for one aggregation unit against a
//! shared store. Stage failures are recorded in the unit's audit trail and
//! never stop the run; [`run_units`] runs several units on scoped threads.

use crate::dashboard::DashboardDeployer;
use crate::downloader::Downloader;
use crate::error::StageError;
use crate::exit_codes::ExitCode;
use crate::runner::CommandRunner;
use crate::stages::{self, StageContext};
use crate::state::{PipelineState, Stage};
use chrono::{DateTime, Utc};
use logagg_common::{AggregationUnit, CancelFlag, RunId};
use logagg_config::{IntegrationToolConfig, Layout};
use logagg_store::{AuditTrail, PartitionedStore};
use serde::Serialize;
use std::path::Path;
use std::thread;
use std::time::Instant;
use tracing::{error, info, warn};

/// External systems the pipeline talks to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub downloader: &'a dyn Downloader,
    pub runner: &'a dyn CommandRunner,
    pub dashboards: &'a dyn DashboardDeployer,
}

/// Result of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageOutcome {
    pub stage: Stage,
    pub succeeded: bool,
    pub cancelled: bool,
    /// Summary on success, error text on failure.
    pub detail: String,
    pub duration_ms: u64,
}

/// Result of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub unit: AggregationUnit,
    pub started_at: DateTime<Utc>,
    pub final_state: PipelineState,
    pub stages: Vec<StageOutcome>,
    /// Why the run was aborted before any stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    pub(crate) fn aborted(unit: &AggregationUnit, reason: String) -> Self {
        Self {
            run_id: RunId::new(),
            unit: unit.clone(),
            started_at: Utc::now(),
            final_state: PipelineState::Aborted,
            stages: Vec::new(),
            error: Some(reason),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.final_state == PipelineState::Done && self.stages.iter().all(|s| s.succeeded)
    }

    pub fn failed_stages(&self) -> Vec<Stage> {
        self.stages
            .iter()
            .filter(|s| !s.succeeded)
            .map(|s| s.stage)
            .collect()
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.final_state == PipelineState::Aborted {
            ExitCode::ConfigError
        } else if self.stages.iter().any(|s| s.cancelled) {
            ExitCode::Interrupted
        } else if self.is_clean() {
            ExitCode::Clean
        } else {
            ExitCode::PartialFail
        }
    }
}

/// Most severe exit code among `reports`.
pub fn combined_exit_code(reports: &[RunReport]) -> ExitCode {
    reports
        .iter()
        .map(RunReport::exit_code)
        .max()
        .unwrap_or(ExitCode::Clean)
}

/// Stage runner for one configuration.
#[derive(Clone, Copy)]
pub struct Pipeline<'a> {
    store: &'a PartitionedStore,
    layout: &'a Layout,
    config: &'a IntegrationToolConfig,
    collaborators: Collaborators<'a>,
    cancel: &'a CancelFlag,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        store: &'a PartitionedStore,
        layout: &'a Layout,
        config: &'a IntegrationToolConfig,
        collaborators: Collaborators<'a>,
        cancel: &'a CancelFlag,
    ) -> Self {
        Self {
            store,
            layout,
            config,
            collaborators,
            cancel,
        }
    }

    /// Run every stage for `unit`, in order.
    pub fn run(&self, unit: &AggregationUnit) -> RunReport {
        let run_id = RunId::new();
        let started_at = Utc::now();
        let ctx = self.context(unit);
        info!(run_id = %run_id, unit = %unit, "start processing");
        ctx.record("start processing");

        let mut state = PipelineState::Start;
        let mut stages = Vec::with_capacity(Stage::ALL.len());
        while let Some(next) = state.next() {
            debug_assert!(state.can_transition_to(next));
            if let Some(stage) = next.stage() {
                stages.push(self.run_stage(stage, &ctx));
            }
            state = next;
        }
        debug_assert!(state.is_terminal());

        ctx.record("Done");
        let report = RunReport {
            run_id,
            unit: unit.clone(),
            started_at,
            final_state: state,
            stages,
            error: None,
        };
        info!(
            run_id = %report.run_id,
            unit = %unit,
            failed = ?report.failed_stages(),
            "processing finished"
        );
        report
    }

    /// Run a single stage for `unit`, recording enter and leave messages.
    pub fn run_only(&self, unit: &AggregationUnit, stage: Stage) -> StageOutcome {
        self.run_stage(stage, &self.context(unit))
    }

    fn context<'u>(&'u self, unit: &'u AggregationUnit) -> StageContext<'u> {
        StageContext {
            unit,
            config: self.config,
            layout: self.layout,
            audit: AuditTrail::new(self.store),
            cancel: self.cancel,
        }
    }

    fn run_stage(&self, stage: Stage, ctx: &StageContext<'_>) -> StageOutcome {
        let started = Instant::now();
        ctx.record(stage.enter_message());

        let result = ctx.check_cancelled().and_then(|()| match stage {
            Stage::Download => stages::download::run(ctx, self.collaborators.downloader),
            Stage::Extract => stages::extract::run(ctx),
            Stage::Transform => stages::transform::run(ctx, self.collaborators.runner),
            Stage::Load => stages::load::run(ctx, self.collaborators.runner),
            Stage::DashboardDeploy => stages::dashboard::run(ctx, self.collaborators.dashboards),
        });
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(detail) => {
                ctx.record(stage.leave_message());
                info!(
                    unit = %ctx.unit,
                    stage = %stage,
                    duration_ms,
                    detail = %detail,
                    "stage completed"
                );
                StageOutcome {
                    stage,
                    succeeded: true,
                    cancelled: false,
                    detail,
                    duration_ms,
                }
            }
            Err(e) => {
                ctx.audit
                    .record_error(ctx.unit, &format!("{} step", stage.label()), &e);
                warn!(unit = %ctx.unit, stage = %stage, duration_ms, error = %e, "stage failed");
                StageOutcome {
                    stage,
                    succeeded: false,
                    cancelled: e.is_cancelled(),
                    detail: e.to_string(),
                    duration_ms,
                }
            }
        }
    }
}

/// Run `units` in parallel, one thread per unit, sharing `pipeline`.
pub fn run_units(pipeline: &Pipeline<'_>, units: &[AggregationUnit]) -> Vec<RunReport> {
    thread::scope(|scope| {
        let handles: Vec<_> = units
            .iter()
            .map(|unit| (unit, scope.spawn(move || pipeline.run(unit))))
            .collect();
        handles
            .into_iter()
            .map(|(unit, handle)| match handle.join() {
                Ok(report) => report,
                Err(_) => {
                    error!(unit = %unit, "pipeline thread panicked");
                    RunReport::aborted(unit, "pipeline thread panicked".to_string())
                }
            })
            .collect()
    })
}

/// Record a configuration failure for `unit` and return its aborted report.
pub fn abort_run(store: &PartitionedStore, unit: &AggregationUnit, err: &StageError) -> RunReport {
    AuditTrail::new(store).record(unit, format!("Configuration error: {err}"));
    error!(unit = %unit, error = %err, "configuration error, run aborted");
    RunReport::aborted(unit, err.to_string())
}

/// Load the configuration at `config_path` and run `unit` through it.
///
/// A configuration that fails to load or validate aborts the run before
/// any stage.
pub fn run_from_config_file(
    store: &PartitionedStore,
    layout: &Layout,
    config_path: &Path,
    unit: &AggregationUnit,
    collaborators: Collaborators<'_>,
    cancel: &CancelFlag,
) -> RunReport {
    match IntegrationToolConfig::load(config_path) {
        Ok(config) => Pipeline::new(store, layout, &config, collaborators, cancel).run(unit),
        Err(e) => abort_run(store, unit, &StageError::from(e)),
    }
}
