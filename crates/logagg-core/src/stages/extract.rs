//! Extract stage: unpack each archive, rename its top-level directory to the
//! archive name, and decompress rotated logs in the configured directories.

use super::{StageContext, Tally};
use crate::error::StageError;
use logagg_archive::{
    rename_extracted_directory, unzip_secondary_logs_with_cancel, ArchiveExtractor,
};
use logagg_config::ArchiveConfig;
use std::path::Path;
use tracing::warn;

pub fn run(ctx: &StageContext<'_>) -> Result<String, StageError> {
    let extractor =
        ArchiveExtractor::new(&ctx.config.allowed_subtrees).with_cancel(ctx.cancel.clone());
    let data_dir = ctx.layout.data_dir(ctx.unit);

    let mut tally = Tally::default();
    for archive in &ctx.config.archives {
        ctx.check_cancelled()?;
        tally.total += 1;

        let source = ctx.layout.archive_path(ctx.unit, archive);
        match extract_one(ctx, &extractor, archive, &source, &data_dir) {
            Ok(()) => {}
            Err(StageError::Cancelled) => return Err(StageError::Cancelled),
            Err(e) => {
                warn!(unit = %ctx.unit, archive = %archive.name, error = %e, "extraction failed");
                ctx.record(format!(
                    "Fail to unpack the whole Archive: {}: {}",
                    source.display(),
                    e
                ));
                tally.failed += 1;
            }
        }
    }
    tally.finish(|n| format!("{n} archives extracted"))
}

fn extract_one(
    ctx: &StageContext<'_>,
    extractor: &ArchiveExtractor,
    archive: &ArchiveConfig,
    source: &Path,
    data_dir: &Path,
) -> Result<(), StageError> {
    let report = extractor.unpack_with_report(source, data_dir)?;
    ctx.record(format!(
        "Unpacked {}: {} files written, {} outside allowed subtrees, {} unsafe entries skipped",
        archive.file_name(),
        report.files_written,
        report.skipped_outside_subtrees,
        report.rejected_unsafe
    ));
    rename_extracted_directory(data_dir, &report.name, &archive.name)?;

    let server_dir = ctx.layout.server_dir(ctx.unit, &archive.name);
    for log_dir in &ctx.config.log_directories {
        let dir = server_dir.join(log_dir);
        if !dir.is_dir() {
            continue;
        }
        ctx.record(format!("Unzip logs: {}", dir.display()));
        let gunzip = unzip_secondary_logs_with_cancel(&dir, ctx.cancel)?;
        for file in &gunzip.decompressed {
            ctx.record(format!("Unzip file: {}", file.display()));
        }
        for (file, reason) in &gunzip.failed {
            ctx.record(format!("Can't unpack file: {}: {}", file.display(), reason));
        }
    }
    Ok(())
}
