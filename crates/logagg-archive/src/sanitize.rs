//! Entry path sanitization and subtree containment.
//!
//! Archive entry names are untrusted. An entry is only ever written at
//! `destination_root.join(sanitize_entry_path(name)?)`, and only when
//! [`is_within_subtrees`] accepts the sanitized path.

use std::path::{Component, Path, PathBuf};

/// Reduce an entry path to plain relative components.
///
/// Rejects absolute paths, drive prefixes, `..`, non-UTF-8 components and
/// components with control characters or backslashes. `.` components are
/// dropped. The result is never empty.
pub fn sanitize_entry_path(raw: &Path) -> Result<PathBuf, &'static str> {
    let mut clean = PathBuf::new();
    for component in raw.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => return Err("absolute path"),
            Component::ParentDir => return Err("parent directory reference"),
            Component::CurDir => {}
            Component::Normal(part) => {
                let part = part.to_str().ok_or("non-UTF-8 component")?;
                if part.chars().any(|c| c.is_control()) {
                    return Err("control character in component");
                }
                if part.contains('\\') {
                    return Err("backslash in component");
                }
                clean.push(part);
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err("empty path");
    }
    Ok(clean)
}

/// Normalize a configured subtree (`./var/log/` → `var/log`).
pub(crate) fn normalize_subtree(subtree: &Path) -> PathBuf {
    subtree
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect()
}

/// True if `path` lies under `<top>/<subtree>` for one of `subtrees`.
///
/// Comparison is component-wise: `var/logs` is not under `var/log`.
pub(crate) fn is_within_subtrees(path: &Path, top: &str, subtrees: &[PathBuf]) -> bool {
    let top = Path::new(top);
    subtrees.iter().any(|subtree| path.starts_with(top.join(subtree)))
}

/// First component of a sanitized path.
pub(crate) fn top_level_name(path: &Path) -> Option<String> {
    match path.components().next() {
        Some(Component::Normal(part)) => part.to_str().map(str::to_string),
        _ => None,
    }
}
