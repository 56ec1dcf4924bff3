//! Persistent partitioned store and audit trail.
//!
//! This crate provides:
//! - [`PartitionedStore`]: a RocksDB-backed key/value store with one column
//!   family ("partition") per aggregation unit, rediscovered on reopen
//! - [`StoreKey`]: order-preserving key encoding
//! - [`AuditTrail`]: the append-only, log-only-on-failure record writer
//!   layered on the store

pub mod audit;
pub mod config;
pub mod error;
pub mod key;
pub mod store;

pub use audit::AuditTrail;
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use key::StoreKey;
pub use store::{PartitionHandle, PartitionedStore};
