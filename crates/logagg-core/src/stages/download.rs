//! Download stage: fetch every configured archive into `archives/<unit>/`.

use super::{StageContext, Tally};
use crate::downloader::Downloader;
use crate::error::StageError;
use tracing::warn;

pub fn run(ctx: &StageContext<'_>, downloader: &dyn Downloader) -> Result<String, StageError> {
    let mut tally = Tally::default();
    for archive in &ctx.config.archives {
        ctx.check_cancelled()?;
        tally.total += 1;

        let destination = ctx.layout.archive_path(ctx.unit, archive);
        ctx.record(format!("start downloading: {}", archive.url));
        match downloader.download(&archive.url, &destination, ctx.cancel) {
            Ok(outcome) => ctx.record(format!(
                "Downloaded {} ({} bytes, sha256 {})",
                archive.file_name(),
                outcome.bytes,
                outcome.sha256
            )),
            Err(StageError::Cancelled) => return Err(StageError::Cancelled),
            Err(e) => {
                warn!(unit = %ctx.unit, archive = %archive.name, error = %e, "download failed");
                ctx.record(format!("Can't download archive: {}: {}", archive.name, e));
                tally.failed += 1;
            }
        }
    }
    tally.finish(|n| format!("{n} archives downloaded"))
}
