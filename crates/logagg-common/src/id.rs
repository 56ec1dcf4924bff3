//! Aggregation unit and run identity types.
//!
//! An aggregation unit name is used both as a store partition name and as a
//! directory name under the archive and data roots, so it is validated once
//! here and carried around as a newtype afterwards.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of the partition every store has before any unit writes to it.
pub const DEFAULT_PARTITION: &str = "default";

/// Maximum length of an aggregation unit name, in bytes.
const MAX_UNIT_LEN: usize = 200;

/// Validated aggregation unit name.
///
/// Allowed characters: ASCII alphanumerics, `-`, `_` and `.`.
/// `.`, `..` and the reserved [`DEFAULT_PARTITION`] name are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AggregationUnit(String);

impl AggregationUnit {
    /// Parse and validate a unit name.
    pub fn parse(name: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidUnit {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        if name.is_empty() {
            return Err(invalid("name is empty"));
        }
        if name.len() > MAX_UNIT_LEN {
            return Err(invalid("name is too long"));
        }
        if name == "." || name == ".." {
            return Err(invalid("name is a relative path component"));
        }
        if name == DEFAULT_PARTITION {
            return Err(invalid("name is reserved for the default partition"));
        }
        if let Some(c) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(invalid(&format!("character {:?} is not allowed", c)));
        }

        Ok(AggregationUnit(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AggregationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AggregationUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AggregationUnit {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<AggregationUnit> for String {
    fn from(unit: AggregationUnit) -> Self {
        unit.0
    }
}

impl AsRef<str> for AggregationUnit {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier for one pipeline run of one aggregation unit.
///
/// Format: `run-<date>-<time>-<random>`
/// Example: `run-20260115-143022-abc123`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new run ID.
    pub fn new() -> Self {
        let now = chrono::Utc::now();
        let random: String = uuid::Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(6)
            .collect();
        RunId(format!("run-{}-{}", now.format("%Y%m%d-%H%M%S"), random))
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
