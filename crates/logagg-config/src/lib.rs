//! Log aggregation configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for the tool's `config.json`
//! - Semantic validation (safe names, relative paths, supported URLs)
//! - Filesystem layout and root directory resolution (CLI → env → XDG → default)

pub mod error;
pub mod layout;
pub mod tool;
pub mod validate;

pub use error::ConfigError;
pub use layout::Layout;
pub use tool::{
    ArchiveConfig, ElasticConfig, IntegrationToolConfig, KibanaConfig, LogstashConfig,
    TransformConfig,
};
pub use validate::{is_safe_component, validate_relative_path};
