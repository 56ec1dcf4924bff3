//! Log aggregation common types, IDs, and errors.
//!
//! This crate provides foundational types shared across the workspace:
//! - Aggregation unit and run identity types with validation
//! - Audit record types (`ProcessingKey`, `ProcessingMessage`)
//! - A cloneable cancellation flag for long-running I/O
//! - Common error type for identifiers and timestamps

pub mod cancel;
pub mod error;
pub mod id;
pub mod record;

pub use cancel::CancelFlag;
pub use error::{Error, Result};
pub use id::{AggregationUnit, RunId, DEFAULT_PARTITION};
pub use record::{ProcessingKey, ProcessingMessage};
