//! Removal of a unit's downloaded archives and extracted data.

use crate::error::{ArchiveError, Result};
use logagg_common::AggregationUnit;
use logagg_config::Layout;
use std::fs;
use std::io;
use std::path::Path;
use tracing::info;

/// Delete `archives/<unit>`. Returns whether anything was removed.
pub fn remove_archives(layout: &Layout, unit: &AggregationUnit) -> Result<bool> {
    remove_tree(&layout.archives_dir(unit))
}

/// Delete `data/<unit>`. Returns whether anything was removed.
pub fn remove_unpacked(layout: &Layout, unit: &AggregationUnit) -> Result<bool> {
    remove_tree(&layout.data_dir(unit))
}

fn remove_tree(path: &Path) -> Result<bool> {
    match fs::remove_dir_all(path) {
        Ok(()) => {
            info!(path = %path.display(), "removed");
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ArchiveError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path());
        let unit = AggregationUnit::parse("u1").unwrap();
        fs::create_dir_all(layout.archives_dir(&unit)).unwrap();
        fs::write(layout.archives_dir(&unit).join("s.tgz"), b"x").unwrap();
        fs::create_dir_all(layout.data_dir(&unit).join("s/var")).unwrap();

        assert!(remove_archives(&layout, &unit).unwrap());
        assert!(!remove_archives(&layout, &unit).unwrap());
        assert!(remove_unpacked(&layout, &unit).unwrap());
        assert!(!layout.data_dir(&unit).exists());
        assert!(!remove_unpacked(&layout, &unit).unwrap());
    }
}
