//! Append-only audit trail of pipeline events.
//!
//! Each aggregation unit's records live in the partition of the same name.
//! [`AuditTrail::record`] never fails: a record that cannot be written is
//! logged at `warn` and dropped, so reporting a failure cannot itself fail a
//! pipeline run.

use crate::error::Result;
use crate::store::PartitionedStore;
use logagg_common::{AggregationUnit, ProcessingKey, ProcessingMessage};
use std::fmt::Display;
use tracing::{debug, warn};

/// Audit writer borrowing a shared store.
#[derive(Debug, Clone, Copy)]
pub struct AuditTrail<'a> {
    store: &'a PartitionedStore,
}

impl<'a> AuditTrail<'a> {
    pub fn new(store: &'a PartitionedStore) -> Self {
        Self { store }
    }

    /// Record `message` for `unit`. Store failures are logged and swallowed.
    pub fn record(&self, unit: &AggregationUnit, message: impl Into<String>) {
        let message = message.into();
        if let Err(e) = self.try_record(unit, message.as_str()) {
            warn!(unit = %unit, error = %e, message = %message, "failed to write audit record");
        }
    }

    /// Record `message` for `unit`, returning the stored record.
    pub fn try_record(
        &self,
        unit: &AggregationUnit,
        message: impl Into<String>,
    ) -> Result<ProcessingMessage> {
        let record = ProcessingMessage::new(unit, message);
        self.store.put(unit.as_str(), &record.key, &record)?;
        debug!(
            unit = %unit,
            timestamp = record.key.timestamp,
            sequence = record.key.sequence,
            message = %record.message,
            "audit record written"
        );
        Ok(record)
    }

    /// Record `Error on {context}: {error}`.
    pub fn record_error(&self, unit: &AggregationUnit, context: &str, error: impl Display) {
        self.record(unit, format!("Error on {context}: {error}"));
    }

    /// All records of `unit` in creation order.
    pub fn read_all(&self, unit: &AggregationUnit) -> Result<Vec<ProcessingMessage>> {
        let records = self
            .store
            .list_all::<ProcessingKey, ProcessingMessage>(unit.as_str())?;
        Ok(records.into_iter().map(|(_, message)| message).collect())
    }
}
