//! Pipeline state machine.
//!
//! ```text
//! START → DOWNLOADING → EXTRACTING → TRANSFORMING → LOADING → DASHBOARD_DEPLOY → DONE
//!   │
//!   └──→ ABORTED   (configuration failed to load or validate)
//! ```
//!
//! A failed stage does not change the path: the machine always advances to
//! the next state, so every stage is attempted and every run reaches `DONE`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline state of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Start,
    Downloading,
    Extracting,
    Transforming,
    Loading,
    DashboardDeploy,
    Done,
    Aborted,
}

impl PipelineState {
    /// Successor on the normal path. `None` for terminal states.
    pub fn next(self) -> Option<Self> {
        use PipelineState::*;
        match self {
            Start => Some(Downloading),
            Downloading => Some(Extracting),
            Extracting => Some(Transforming),
            Transforming => Some(Loading),
            Loading => Some(DashboardDeploy),
            DashboardDeploy => Some(Done),
            Done | Aborted => None,
        }
    }

    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == Some(target)
            || (self == PipelineState::Start && target == PipelineState::Aborted)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Aborted)
    }

    /// Stage executed while in this state.
    pub fn stage(self) -> Option<Stage> {
        match self {
            PipelineState::Downloading => Some(Stage::Download),
            PipelineState::Extracting => Some(Stage::Extract),
            PipelineState::Transforming => Some(Stage::Transform),
            PipelineState::Loading => Some(Stage::Load),
            PipelineState::DashboardDeploy => Some(Stage::DashboardDeploy),
            _ => None,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Start => "START",
            PipelineState::Downloading => "DOWNLOADING",
            PipelineState::Extracting => "EXTRACTING",
            PipelineState::Transforming => "TRANSFORMING",
            PipelineState::Loading => "LOADING",
            PipelineState::DashboardDeploy => "DASHBOARD_DEPLOY",
            PipelineState::Done => "DONE",
            PipelineState::Aborted => "ABORTED",
        };
        f.write_str(s)
    }
}

/// One pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Download,
    Extract,
    Transform,
    Load,
    DashboardDeploy,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Download,
        Stage::Extract,
        Stage::Transform,
        Stage::Load,
        Stage::DashboardDeploy,
    ];

    /// Name used in `Error on <label> step: ...` records.
    pub fn label(self) -> &'static str {
        match self {
            Stage::Download => "download",
            Stage::Extract => "extract",
            Stage::Transform => "transform",
            Stage::Load => "load",
            Stage::DashboardDeploy => "dashboard deploy",
        }
    }

    /// Audit message written when the stage starts.
    pub fn enter_message(self) -> &'static str {
        match self {
            Stage::Download => "downloading archives",
            Stage::Extract => "start unarchive process",
            Stage::Transform => "start transforming logs",
            Stage::Load => "start loading logs",
            Stage::DashboardDeploy => "deploying kibana dashboards",
        }
    }

    /// Audit message written when the stage succeeds.
    pub fn leave_message(self) -> &'static str {
        match self {
            Stage::Download => "Downloading completed. Step 1 of 5 finished",
            Stage::Extract => "Unarchive completed. Step 2 of 5 finished",
            Stage::Transform => "Transform completed. Step 3 of 5 finished",
            Stage::Load => "Loading completed. Step 4 of 5 finished",
            Stage::DashboardDeploy => "Dashboards deployment completed. Step 5 of 5 finished",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
