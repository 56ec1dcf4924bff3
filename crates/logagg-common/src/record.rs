//! Audit record types.
//!
//! Every pipeline event for an aggregation unit is stored as one
//! [`ProcessingMessage`] under a [`ProcessingKey`]. Records are immutable:
//! written once, never updated, read back in bulk per unit.

use crate::error::{Error, Result};
use crate::id::AggregationUnit;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide sequence keeping keys created within one millisecond distinct.
static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Key of one audit record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessingKey {
    /// Unit (and partition) the record belongs to.
    pub aggregation_unit: String,
    /// Creation time, milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Tie-breaker for records sharing a timestamp.
    #[serde(default)]
    pub sequence: u64,
    /// ISO-8601 rendering of `timestamp`.
    pub derived_date: String,
}

impl ProcessingKey {
    /// Key stamped with the current time.
    pub fn now(unit: &AggregationUnit) -> Self {
        let now = Utc::now();
        Self {
            aggregation_unit: unit.to_string(),
            timestamp: now.timestamp_millis(),
            sequence: next_sequence(),
            derived_date: format_date(now),
        }
    }

    /// Key for an explicit timestamp.
    pub fn at(unit: &AggregationUnit, timestamp: i64) -> Result<Self> {
        let date = DateTime::from_timestamp_millis(timestamp)
            .ok_or(Error::TimestampOutOfRange(timestamp))?;
        Ok(Self {
            aggregation_unit: unit.to_string(),
            timestamp,
            sequence: next_sequence(),
            derived_date: format_date(date),
        })
    }

    /// Creation time as a `DateTime`, if the timestamp is representable.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// One audit record: the key plus a human-readable event line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingMessage {
    pub key: ProcessingKey,
    pub message: String,
}

impl ProcessingMessage {
    /// Create a message stamped with the current time.
    pub fn new(unit: &AggregationUnit, message: impl Into<String>) -> Self {
        Self {
            key: ProcessingKey::now(unit),
            message: message.into(),
        }
    }

    /// True if the message reports a failure.
    pub fn is_error(&self) -> bool {
        let lower = self.message.to_ascii_lowercase();
        lower.starts_with("error") || lower.contains("can't") || lower.starts_with("fail")
    }
}

fn next_sequence() -> u64 {
    NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

fn format_date(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}
