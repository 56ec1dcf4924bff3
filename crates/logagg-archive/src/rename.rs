//! Renaming an extracted top-level directory to its configured server name.

use crate::error::{ArchiveError, Result};
use std::fs;
use std::io;
use std::path::{Component, Path};
use tracing::{debug, info};

/// Rename `parent/discovered` to `parent/target`.
///
/// Safe to repeat: the same name is a no-op, an existing target is replaced
/// while the source exists, and a missing source with an existing target
/// means the rename already happened.
pub fn rename_extracted_directory(parent: &Path, discovered: &str, target: &str) -> Result<()> {
    check_single_component(discovered)?;
    check_single_component(target)?;

    if discovered == target {
        debug!(name = discovered, "extracted directory already has its target name");
        return Ok(());
    }

    let from = parent.join(discovered);
    let to = parent.join(target);

    if from.is_dir() {
        match fs::symlink_metadata(&to) {
            Ok(meta) if meta.is_dir() => {
                fs::remove_dir_all(&to).map_err(|e| ArchiveError::io(&to, e))?
            }
            Ok(_) => fs::remove_file(&to).map_err(|e| ArchiveError::io(&to, e))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(ArchiveError::io(&to, e)),
        }
        fs::rename(&from, &to).map_err(|e| ArchiveError::io(&from, e))?;
        info!(from = %from.display(), to = %to.display(), "extracted directory renamed");
        Ok(())
    } else if to.is_dir() {
        debug!(to = %to.display(), "extracted directory already renamed");
        Ok(())
    } else {
        Err(ArchiveError::io(
            &from,
            io::Error::new(io::ErrorKind::NotFound, "extracted directory not found"),
        ))
    }
}

fn check_single_component(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == name => Ok(()),
        _ => Err(ArchiveError::InvalidName(name.to_string())),
    }
}
