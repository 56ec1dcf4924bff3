//! In-place decompression of rotated `*.gz` log files.

use crate::error::{ArchiveError, Result};
use crate::COPY_CHUNK;
use flate2::read::MultiGzDecoder;
use logagg_common::CancelFlag;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const GZ_SUFFIX: &str = ".gz";
const PARTIAL_SUFFIX: &str = ".partial";

/// Files handled by one [`unzip_secondary_logs`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GunzipReport {
    /// Decompressed outputs (originals removed).
    pub decompressed: Vec<PathBuf>,
    /// Inputs that could not be decompressed, with the reason. Originals kept.
    pub failed: Vec<(PathBuf, String)>,
}

/// Decompress every `*.gz` regular file directly inside `directory`.
pub fn unzip_secondary_logs(directory: &Path) -> Result<GunzipReport> {
    unzip_secondary_logs_with_cancel(directory, &CancelFlag::new())
}

/// Like [`unzip_secondary_logs`], stopping with `Cancelled` when `cancel` is set.
pub fn unzip_secondary_logs_with_cancel(
    directory: &Path,
    cancel: &CancelFlag,
) -> Result<GunzipReport> {
    let candidates = gz_candidates(directory)?;
    unzip_all(candidates, cancel, |original| fs::remove_file(original))
}

/// Sorted regular `*.gz` files directly inside `directory`.
fn gz_candidates(directory: &Path) -> Result<Vec<PathBuf>> {
    let mut candidates = Vec::new();
    for entry in fs::read_dir(directory).map_err(|e| ArchiveError::io(directory, e))? {
        let entry = entry.map_err(|e| ArchiveError::io(directory, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| ArchiveError::io(&path, e))?;
        let is_gz = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.len() > GZ_SUFFIX.len() && n.ends_with(GZ_SUFFIX));
        if file_type.is_file() && is_gz {
            candidates.push(path);
        }
    }
    candidates.sort();
    Ok(candidates)
}

/// Decompress each candidate. Any per-file failure, including failing to
/// remove the original, is reported and the pass moves on.
fn unzip_all<F>(
    candidates: Vec<PathBuf>,
    cancel: &CancelFlag,
    remove_original: F,
) -> Result<GunzipReport>
where
    F: Fn(&Path) -> io::Result<()>,
{
    let mut report = GunzipReport::default();
    for source in candidates {
        if cancel.is_cancelled() {
            return Err(ArchiveError::Cancelled);
        }
        let target = strip_gz(&source);
        let result = File::open(&source)
            .map_err(|e| ArchiveError::io(&source, e))
            .and_then(|input| decompress_from(input, &source, &target, cancel));
        match result {
            Ok(bytes) => match remove_original(&source) {
                Ok(()) => {
                    debug!(file = %target.display(), bytes, "log decompressed");
                    report.decompressed.push(target);
                }
                Err(e) => {
                    warn!(
                        file = %source.display(),
                        error = %e,
                        "failed to remove decompressed original"
                    );
                    report
                        .failed
                        .push((source, format!("failed to remove original: {e}")));
                }
            },
            Err(ArchiveError::Cancelled) => return Err(ArchiveError::Cancelled),
            Err(e) => {
                warn!(file = %source.display(), error = %e, "failed to decompress log");
                report.failed.push((source, e.to_string()));
            }
        }
    }
    Ok(report)
}

fn strip_gz(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    path.with_file_name(name.strip_suffix(GZ_SUFFIX).unwrap_or(name))
}

/// Decode `input` into `<target>.partial`, then rename it to `target`.
/// The partial file is removed on any failure, cancellation included.
fn decompress_from<R: Read>(
    input: R,
    source: &Path,
    target: &Path,
    cancel: &CancelFlag,
) -> Result<u64> {
    let mut partial = target.as_os_str().to_owned();
    partial.push(PARTIAL_SUFFIX);
    let partial = PathBuf::from(partial);

    let result = stream_to(input, source, &partial, cancel).and_then(|bytes| {
        fs::rename(&partial, target).map_err(|e| ArchiveError::io(target, e))?;
        Ok(bytes)
    });
    if result.is_err() {
        if let Err(e) = fs::remove_file(&partial) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %partial.display(), error = %e, "failed to remove partial output");
            }
        }
    }
    result
}

fn stream_to<R: Read>(
    input: R,
    source: &Path,
    partial: &Path,
    cancel: &CancelFlag,
) -> Result<u64> {
    let mut decoder = MultiGzDecoder::new(BufReader::new(input));
    let output = File::create(partial).map_err(|e| ArchiveError::io(partial, e))?;
    let mut out = BufWriter::new(output);

    let mut buf = vec![0u8; COPY_CHUNK];
    let mut total = 0u64;
    loop {
        if cancel.is_cancelled() {
            return Err(ArchiveError::Cancelled);
        }
        let n = match decoder.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ArchiveError::from_stream(source, e)),
        };
        out.write_all(&buf[..n])
            .map_err(|e| ArchiveError::io(partial, e))?;
        total += n as u64;
    }
    out.flush().map_err(|e| ArchiveError::io(partial, e))?;
    Ok(total)
}
