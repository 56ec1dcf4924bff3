//! Order-preserving key encoding.
//!
//! RocksDB compares keys bytewise, so the encoding decides iteration order.
//! [`ProcessingKey`] puts a big-endian timestamp and sequence in front of its
//! JSON body: reading a partition front to back yields records in the order
//! they were created.

use crate::error::{Result, StoreError};
use logagg_common::ProcessingKey;
use std::fmt;

const TIMESTAMP_LEN: usize = 8;
const SEQUENCE_LEN: usize = 8;
const PREFIX_LEN: usize = TIMESTAMP_LEN + SEQUENCE_LEN;

/// A type usable as a store key.
pub trait StoreKey: Sized + fmt::Debug {
    fn to_key_bytes(&self) -> Result<Vec<u8>>;
    fn from_key_bytes(bytes: &[u8]) -> Result<Self>;
}

impl StoreKey for ProcessingKey {
    fn to_key_bytes(&self) -> Result<Vec<u8>> {
        let body = serde_json::to_vec(self)
            .map_err(|e| StoreError::codec(&self.aggregation_unit, e))?;
        let mut bytes = Vec::with_capacity(PREFIX_LEN + body.len());
        // Pre-epoch timestamps sort first; the body keeps the exact value.
        let timestamp = u64::try_from(self.timestamp).unwrap_or(0);
        bytes.extend_from_slice(&timestamp.to_be_bytes());
        bytes.extend_from_slice(&self.sequence.to_be_bytes());
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    fn from_key_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() <= PREFIX_LEN {
            return Err(StoreError::MalformedKey(format!(
                "processing key too short ({} bytes)",
                bytes.len()
            )));
        }
        serde_json::from_slice(&bytes[PREFIX_LEN..])
            .map_err(|e| StoreError::MalformedKey(format!("processing key body: {e}")))
    }
}

impl StoreKey for String {
    fn to_key_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.as_bytes().to_vec())
    }

    fn from_key_bytes(bytes: &[u8]) -> Result<Self> {
        String::from_utf8(bytes.to_vec()).map_err(|e| StoreError::MalformedKey(e.to_string()))
    }
}
