//! Integration tool configuration types.
//!
//! These types match the `config.json` consumed by the processing pipeline.
//! Keys are camelCase so existing configuration files load unchanged.

use crate::error::ConfigError;
use crate::validate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// Complete tool configuration for one processing request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationToolConfig {
    pub kibana: KibanaConfig,
    pub logstash: LogstashConfig,
    pub elastic: ElasticConfig,
    pub filebeat_image: String,
    pub kibana_tools_image: String,
    pub archives: Vec<ArchiveConfig>,

    /// Directories, relative to an extracted server directory, whose `*.gz`
    /// files are decompressed after extraction.
    #[serde(default = "default_log_directories")]
    pub log_directories: Vec<String>,

    /// Subtrees, relative to the archive's top-level directory, that
    /// extraction is allowed to write.
    #[serde(default = "default_allowed_subtrees")]
    pub allowed_subtrees: Vec<String>,

    #[serde(default)]
    pub loggers: Vec<String>,

    #[serde(default)]
    pub transform: Vec<TransformConfig>,

    /// Docker volume holding the data root, mounted by the loader container.
    #[serde(default = "default_docker_volume")]
    pub docker_volume: String,
}

fn default_log_directories() -> Vec<String> {
    vec!["var/log/corfu".to_string()]
}

fn default_allowed_subtrees() -> Vec<String> {
    vec!["var/log".to_string()]
}

fn default_docker_volume() -> String {
    "log-aggregation-data".to_string()
}

impl IntegrationToolConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content, path)
    }

    /// Parse and validate configuration JSON.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Self::parse(json, Path::new("<inline>"))
    }

    fn parse(json: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Run semantic validation, collecting every problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let issues = validate::collect_issues(self);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(issues))
        }
    }
}

/// Kibana endpoint used by the dashboard deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KibanaConfig {
    pub host: String,
    pub port: u16,
}

/// Logstash endpoint that filebeat ships to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogstashConfig {
    pub host: String,
    pub port: u16,
}

impl LogstashConfig {
    /// `host:port` form expected by filebeat's `output.logstash.hosts`.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Elasticsearch credentials passed to the dashboard tooling.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElasticConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
}

impl fmt::Debug for ElasticConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElasticConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("pass", &"<redacted>")
            .finish()
    }
}

/// One archive to download and unpack. `name` becomes the server directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    pub name: String,
    pub url: String,
}

impl ArchiveConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    /// Archive extension parsed from the URL path.
    ///
    /// `tar.gz` is recognised as a double extension; otherwise the last
    /// dot-suffix of the final path segment is returned.
    pub fn extension(&self) -> Option<String> {
        let segment = match Url::parse(&self.url) {
            Ok(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string)),
            Err(_) => self.url.rsplit('/').next().map(str::to_string),
        }?;

        let lower = segment.to_ascii_lowercase();
        if lower.ends_with(".tar.gz") {
            return Some("tar.gz".to_string());
        }
        match lower.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext.to_string()),
            _ => None,
        }
    }

    /// Local file name: `<name>.<ext>`, or just `<name>` without an extension.
    pub fn file_name(&self) -> String {
        match self.extension() {
            Some(ext) => format!("{}.{}", self.name, ext),
            None => self.name.clone(),
        }
    }
}

/// Shell commands to run against one subpath of a unit's data directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub commands: Vec<String>,
}
