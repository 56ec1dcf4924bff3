//! Streaming, contained archive extraction.
//!
//! Entries are read in order and never buffered whole. For each entry:
//!
//! 1. the path is sanitized; unsafe paths are skipped;
//! 2. the first safe entry names the archive's top-level directory;
//! 3. only regular files under `<top>/<allowed subtree>` are written;
//! 4. parent directories are created one component at a time, refusing to
//!    follow symlinks, and the parent must canonicalize inside the root.

use crate::error::{ArchiveError, Result};
use crate::format::ArchiveFormat;
use crate::sanitize::{is_within_subtrees, normalize_subtree, sanitize_entry_path, top_level_name};
use crate::COPY_CHUNK;
use flate2::read::GzDecoder;
use logagg_common::CancelFlag;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Outcome of one extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnpackReport {
    /// Discovered top-level directory name.
    pub name: String,
    pub files_written: usize,
    pub bytes_written: u64,
    /// Regular files outside every allowed subtree.
    pub skipped_outside_subtrees: usize,
    /// Symlinks, hard links, devices and other non-regular entries.
    pub skipped_non_regular: usize,
    /// Entries whose path failed sanitization or whose parent was unsafe.
    pub rejected_unsafe: usize,
}

/// Extracts tar and tar.gz archives into a destination root.
#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    allowed_subtrees: Vec<PathBuf>,
    cancel: CancelFlag,
}

impl ArchiveExtractor {
    /// Create an extractor writing only under the given subtrees of the
    /// archive's top-level directory.
    pub fn new<I, S>(allowed_subtrees: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<Path>,
    {
        Self {
            allowed_subtrees: allowed_subtrees
                .into_iter()
                .map(|s| normalize_subtree(s.as_ref()))
                .collect(),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Extract `source` into `destination_root`, returning the archive's
    /// top-level directory name.
    pub fn unpack(&self, source: &Path, destination_root: &Path) -> Result<String> {
        self.unpack_with_report(source, destination_root)
            .map(|report| report.name)
    }

    /// Extract `source` into `destination_root` and report what was written.
    pub fn unpack_with_report(
        &self,
        source: &Path,
        destination_root: &Path,
    ) -> Result<UnpackReport> {
        let format = ArchiveFormat::detect(source)?;
        let file = File::open(source).map_err(|e| ArchiveError::io(source, e))?;
        let reader = BufReader::new(file);

        fs::create_dir_all(destination_root).map_err(|e| ArchiveError::io(destination_root, e))?;
        let root = destination_root
            .canonicalize()
            .map_err(|e| ArchiveError::io(destination_root, e))?;

        debug!(source = %source.display(), format = ?format, "unpacking archive");
        let report = match format {
            ArchiveFormat::TarGz => self.unpack_stream(GzDecoder::new(reader), source, &root)?,
            ArchiveFormat::Tar => self.unpack_stream(reader, source, &root)?,
        };

        info!(
            source = %source.display(),
            name = %report.name,
            files = report.files_written,
            bytes = report.bytes_written,
            outside = report.skipped_outside_subtrees,
            unsafe_entries = report.rejected_unsafe,
            "archive unpacked"
        );
        Ok(report)
    }

    fn unpack_stream<R: Read>(
        &self,
        reader: R,
        source: &Path,
        root: &Path,
    ) -> Result<UnpackReport> {
        let mut archive = tar::Archive::new(reader);
        let entries = archive
            .entries()
            .map_err(|e| ArchiveError::from_stream(source, e))?;

        let mut report = UnpackReport::default();
        let mut top: Option<String> = None;

        for entry in entries {
            self.check_cancelled()?;
            let mut entry = entry.map_err(|e| ArchiveError::from_stream(source, e))?;

            let raw = entry
                .path()
                .map_err(|e| ArchiveError::from_stream(source, e))?
                .into_owned();
            let path = match sanitize_entry_path(&raw) {
                Ok(path) => path,
                Err(reason) => {
                    debug!(entry = %raw.display(), reason, "skipping unsafe entry");
                    report.rejected_unsafe += 1;
                    continue;
                }
            };

            let Some(top_name) = top.clone().or_else(|| top_level_name(&path)) else {
                report.rejected_unsafe += 1;
                continue;
            };
            top.get_or_insert_with(|| top_name.clone());

            let kind = entry.header().entry_type();
            if kind.is_dir() {
                continue;
            }
            if !kind.is_file() {
                debug!(entry = %path.display(), kind = ?kind, "skipping non-regular entry");
                report.skipped_non_regular += 1;
                continue;
            }
            if !is_within_subtrees(&path, &top_name, &self.allowed_subtrees) {
                debug!(entry = %path.display(), "skipping entry outside allowed subtrees");
                report.skipped_outside_subtrees += 1;
                continue;
            }

            let size = entry.size();
            match self.write_entry(&mut entry, size, &path, root, source)? {
                Some(written) => {
                    report.files_written += 1;
                    report.bytes_written += written;
                }
                None => report.rejected_unsafe += 1,
            }
        }

        report.name = top.ok_or_else(|| ArchiveError::NoTopLevelDirectory(source.to_path_buf()))?;
        Ok(report)
    }

    /// Write one entry. `Ok(None)` means the target was refused as unsafe.
    fn write_entry<R: Read>(
        &self,
        entry: &mut R,
        size: u64,
        relative: &Path,
        root: &Path,
        source: &Path,
    ) -> Result<Option<u64>> {
        let target = root.join(relative);
        let Some(parent) = relative.parent() else {
            return Ok(None);
        };
        if !ensure_parent_dirs(root, parent)? {
            warn!(entry = %relative.display(), "refusing to write through a symlink");
            return Ok(None);
        }

        match fs::symlink_metadata(&target) {
            Ok(meta) if !meta.file_type().is_file() => {
                warn!(target = %target.display(), "refusing to replace non-regular file");
                return Ok(None);
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(ArchiveError::io(&target, e)),
        }

        let file = File::create(&target).map_err(|e| ArchiveError::io(&target, e))?;
        let mut out = BufWriter::new(file);
        let result = self
            .copy_entry(entry, &mut out, &target, source)
            .and_then(|written| {
                out.flush().map_err(|e| ArchiveError::io(&target, e))?;
                if written < size {
                    return Err(ArchiveError::Truncated(format!(
                        "{}: entry {} ended after {} of {} bytes",
                        source.display(),
                        relative.display(),
                        written,
                        size
                    )));
                }
                Ok(written)
            });
        drop(out);

        match result {
            Ok(written) => {
                debug!(target = %target.display(), bytes = written, "entry written");
                Ok(Some(written))
            }
            Err(e) => {
                discard_partial(&target);
                Err(e)
            }
        }
    }

    fn copy_entry<R: Read, W: Write>(
        &self,
        entry: &mut R,
        out: &mut W,
        target: &Path,
        source: &Path,
    ) -> Result<u64> {
        let mut buf = vec![0u8; COPY_CHUNK];
        let mut written = 0u64;
        loop {
            self.check_cancelled()?;
            let n = match entry.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ArchiveError::from_stream(source, e)),
            };
            out.write_all(&buf[..n])
                .map_err(|e| ArchiveError::io(target, e))?;
            written += n as u64;
        }
        Ok(written)
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(ArchiveError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Create `root/relative` one directory at a time.
///
/// Returns `false` if an existing component is a symlink or the result does
/// not canonicalize inside `root`.
fn ensure_parent_dirs(root: &Path, relative: &Path) -> Result<bool> {
    let mut current = root.to_path_buf();
    for component in relative.components() {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => return Ok(false),
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(ArchiveError::io(
                    &current,
                    io::Error::new(io::ErrorKind::AlreadyExists, "not a directory"),
                ))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                fs::create_dir(&current).map_err(|e| ArchiveError::io(&current, e))?;
            }
            Err(e) => return Err(ArchiveError::io(&current, e)),
        }
    }

    let canonical = current
        .canonicalize()
        .map_err(|e| ArchiveError::io(&current, e))?;
    Ok(canonical.starts_with(root))
}

fn discard_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove partial file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tar_with(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_entry_type(tar::EntryType::Regular);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_only_allowed_subtree_is_written() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("dump.tar");
        fs::write(
            &archive,
            tar_with(&[
                ("srv/var/log/a.log", b"a"),
                ("srv/etc/hosts", b"h"),
                ("srv/var/logs/b.log", b"b"),
            ]),
        )
        .unwrap();

        let out = dir.path().join("out");
        let report = ArchiveExtractor::new(["var/log"])
            .unpack_with_report(&archive, &out)
            .unwrap();

        assert_eq!(report.name, "srv");
        assert_eq!(report.files_written, 1);
        assert_eq!(report.skipped_outside_subtrees, 2);
        assert_eq!(fs::read(out.join("srv/var/log/a.log")).unwrap(), b"a");
        assert!(!out.join("srv/etc").exists());
        assert!(!out.join("srv/var/logs").exists());
    }

    #[test]
    fn test_cancelled_before_start() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("dump.tar");
        fs::write(&archive, tar_with(&[("srv/var/log/a.log", b"a")])).unwrap();

        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = ArchiveExtractor::new(["var/log"])
            .with_cancel(cancel)
            .unpack(&archive, &dir.path().join("out"))
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Cancelled));
        assert!(!dir.path().join("out/srv/var/log/a.log").exists());
    }

    /// Sets `cancel` once `limit` bytes have been read through it.
    struct CancelAfter<R> {
        inner: R,
        read: usize,
        limit: usize,
        cancel: CancelFlag,
    }

    impl<R: Read> Read for CancelAfter<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.inner.read(buf)?;
            self.read += n;
            if self.read >= self.limit {
                self.cancel.cancel();
            }
            Ok(n)
        }
    }

    #[test]
    fn test_cancelled_mid_entry_discards_partial_file() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("dump.tar");
        let big = vec![b'x'; 1024 * 1024];
        fs::write(&archive, tar_with(&[("srv/var/log/big.log", big.as_slice())])).unwrap();
        let root = dir.path().join("out");
        fs::create_dir_all(&root).unwrap();
        let root = root.canonicalize().unwrap();

        let cancel = CancelFlag::new();
        let reader = CancelAfter {
            inner: File::open(&archive).unwrap(),
            read: 0,
            limit: COPY_CHUNK,
            cancel: cancel.clone(),
        };
        let err = ArchiveExtractor::new(["var/log"])
            .with_cancel(cancel)
            .unpack_stream(reader, &archive, &root)
            .unwrap_err();

        assert!(matches!(err, ArchiveError::Cancelled));
        assert!(!root.join("srv/var/log/big.log").exists());
        let leftovers: Vec<_> = fs::read_dir(root.join("srv/var/log"))
            .map(|entries| entries.map(|e| e.unwrap().path()).collect())
            .unwrap_or_default();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[test]
    fn test_empty_archive_has_no_top_level() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("empty.tar");
        fs::write(&archive, tar_with(&[])).unwrap();

        let err = ArchiveExtractor::new(["var/log"])
            .unpack(&archive, &dir.path().join("out"))
            .unwrap_err();
        assert!(matches!(err, ArchiveError::NoTopLevelDirectory(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_preexisting_symlink_parent_is_refused() {
        let dir = TempDir::new().unwrap();
        let outside = dir.path().join("outside");
        fs::create_dir_all(&outside).unwrap();
        let out = dir.path().join("out");
        fs::create_dir_all(out.join("srv/var")).unwrap();
        std::os::unix::fs::symlink(&outside, out.join("srv/var/log")).unwrap();

        let archive = dir.path().join("dump.tar");
        fs::write(&archive, tar_with(&[("srv/var/log/a.log", b"a")])).unwrap();

        let report = ArchiveExtractor::new(["var/log"])
            .unpack_with_report(&archive, &out)
            .unwrap();
        assert_eq!(report.files_written, 0);
        assert_eq!(report.rejected_unsafe, 1);
        assert!(!outside.join("a.log").exists());
    }
}
