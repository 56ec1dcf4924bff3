//! Stage implementations.
//!
//! Each stage works through its items, records per-item progress and
//! failures in the audit trail, and returns a one-line summary. A stage with
//! failed items returns `StageError::Partial`; cancellation returns
//! `StageError::Cancelled` at the next item boundary.

pub mod dashboard;
pub mod download;
pub mod extract;
pub mod load;
pub mod transform;

use crate::error::StageError;
use logagg_common::{AggregationUnit, CancelFlag};
use logagg_config::{IntegrationToolConfig, Layout};
use logagg_store::AuditTrail;

/// Everything a stage needs for one unit.
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    pub unit: &'a AggregationUnit,
    pub config: &'a IntegrationToolConfig,
    pub layout: &'a Layout,
    pub audit: AuditTrail<'a>,
    pub cancel: &'a CancelFlag,
}

impl StageContext<'_> {
    pub(crate) fn record(&self, message: impl Into<String>) {
        self.audit.record(self.unit, message);
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), StageError> {
        if self.cancel.is_cancelled() {
            Err(StageError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Per-item failure tally.
#[derive(Debug, Default)]
pub(crate) struct Tally {
    pub total: usize,
    pub failed: usize,
}

impl Tally {
    pub(crate) fn finish(
        self,
        summary: impl FnOnce(usize) -> String,
    ) -> Result<String, StageError> {
        if self.failed > 0 {
            Err(StageError::Partial {
                failed: self.failed,
                total: self.total,
            })
        } else {
            Ok(summary(self.total))
        }
    }
}
