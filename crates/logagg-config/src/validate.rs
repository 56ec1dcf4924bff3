//! Semantic validation for tool configuration.
//!
//! Parsing only checks shape. This module checks the values that later become
//! directory names, relative paths and download URLs.

use crate::tool::IntegrationToolConfig;
use std::collections::HashSet;
use std::path::{Component, Path};
use url::Url;

const SUPPORTED_SCHEMES: &[&str] = &["http", "https", "file"];

/// True if `name` can be used as a single directory name.
pub fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name.len() <= 255
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Check that `path` is a non-empty relative path made only of normal components.
pub fn validate_relative_path(path: &Path) -> Result<(), String> {
    if path.as_os_str().is_empty() {
        return Err("path is empty".to_string());
    }
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => return Err("path contains '..'".to_string()),
            Component::RootDir | Component::Prefix(_) => {
                return Err("path must be relative".to_string())
            }
        }
    }
    Ok(())
}

/// Collect every validation problem in `config`.
pub(crate) fn collect_issues(config: &IntegrationToolConfig) -> Vec<String> {
    let mut issues = Vec::new();

    if config.filebeat_image.trim().is_empty() {
        issues.push("filebeatImage must not be empty".to_string());
    }
    if config.kibana_tools_image.trim().is_empty() {
        issues.push("kibanaToolsImage must not be empty".to_string());
    }
    if !is_safe_component(&config.docker_volume) {
        issues.push(format!("dockerVolume '{}' is not a valid name", config.docker_volume));
    }

    let mut names = HashSet::new();
    for archive in &config.archives {
        if !is_safe_component(&archive.name) {
            issues.push(format!("archive name '{}' is not a valid directory name", archive.name));
        }
        if !names.insert(archive.name.as_str()) {
            issues.push(format!("archive name '{}' is used more than once", archive.name));
        }
        match Url::parse(&archive.url) {
            Ok(url) if SUPPORTED_SCHEMES.contains(&url.scheme()) => {}
            Ok(url) => issues.push(format!(
                "archive '{}' uses unsupported URL scheme '{}'",
                archive.name,
                url.scheme()
            )),
            Err(e) => issues.push(format!("archive '{}' has an invalid URL: {}", archive.name, e)),
        }
    }

    if config.allowed_subtrees.is_empty() {
        issues.push("allowedSubtrees must list at least one subtree".to_string());
    }
    for subtree in &config.allowed_subtrees {
        if let Err(reason) = validate_relative_path(Path::new(subtree)) {
            issues.push(format!("allowedSubtrees entry '{}': {}", subtree, reason));
        }
    }
    for dir in &config.log_directories {
        if let Err(reason) = validate_relative_path(Path::new(dir)) {
            issues.push(format!("logDirectories entry '{}': {}", dir, reason));
        }
    }
    for transform in &config.transform {
        if let Err(reason) = validate_relative_path(&transform.path) {
            issues.push(format!(
                "transform path '{}': {}",
                transform.path.display(),
                reason
            ));
        }
    }

    issues
}
