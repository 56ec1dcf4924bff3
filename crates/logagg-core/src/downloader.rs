//! Archive downloads.

use crate::error::StageError;
use logagg_common::CancelFlag;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const CHUNK: usize = 64 * 1024;
const PARTIAL_SUFFIX: &str = ".partial";

/// Result of one download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub path: PathBuf,
    pub bytes: u64,
    /// Hex SHA-256 of the downloaded content.
    pub sha256: String,
}

/// Trait for fetching an archive to a local path.
pub trait Downloader: Send + Sync {
    fn download(
        &self,
        url: &str,
        destination: &Path,
        cancel: &CancelFlag,
    ) -> Result<DownloadOutcome, StageError>;
}

/// Downloads `http(s)://` URLs with ureq and copies `file://` URLs.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    agent: ureq::Agent,
}

impl HttpDownloader {
    pub fn new() -> Self {
        Self::with_timeouts(Duration::from_secs(30), Duration::from_secs(300))
    }

    pub fn with_timeouts(connect: Duration, read: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(connect)
            .timeout_read(read)
            .build();
        Self { agent }
    }

    fn open(&self, url: &str) -> Result<Box<dyn Read>, StageError> {
        let parsed = Url::parse(url).map_err(|e| StageError::download(url, e))?;
        match parsed.scheme() {
            "file" => {
                let path = parsed
                    .to_file_path()
                    .map_err(|()| StageError::download(url, "not a local file path"))?;
                let file = File::open(&path).map_err(|e| StageError::download(url, e))?;
                Ok(Box::new(file))
            }
            "http" | "https" => match self.agent.get(url).call() {
                Ok(response) => Ok(Box::new(response.into_reader())),
                Err(ureq::Error::Status(code, _)) => {
                    Err(StageError::download(url, format!("HTTP status {code}")))
                }
                Err(ureq::Error::Transport(transport)) => {
                    Err(StageError::download(url, transport))
                }
            },
            other => Err(StageError::download(
                url,
                format!("unsupported URL scheme '{other}'"),
            )),
        }
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl Downloader for HttpDownloader {
    fn download(
        &self,
        url: &str,
        destination: &Path,
        cancel: &CancelFlag,
    ) -> Result<DownloadOutcome, StageError> {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| StageError::io(parent, e))?;
        }
        let mut reader = self.open(url)?;

        let mut partial = destination.as_os_str().to_owned();
        partial.push(PARTIAL_SUFFIX);
        let partial = PathBuf::from(partial);

        let result = copy_hashed(&mut reader, &partial, url, cancel).and_then(|outcome| {
            fs::rename(&partial, destination).map_err(|e| StageError::io(destination, e))?;
            Ok(outcome)
        });

        match result {
            Ok((bytes, sha256)) => {
                debug!(url, path = %destination.display(), bytes, "download finished");
                Ok(DownloadOutcome {
                    path: destination.to_path_buf(),
                    bytes,
                    sha256,
                })
            }
            Err(e) => {
                if let Err(rm) = fs::remove_file(&partial) {
                    if rm.kind() != io::ErrorKind::NotFound {
                        warn!(
                            path = %partial.display(),
                            error = %rm,
                            "failed to remove partial download"
                        );
                    }
                }
                Err(e)
            }
        }
    }
}

fn copy_hashed(
    reader: &mut dyn Read,
    partial: &Path,
    url: &str,
    cancel: &CancelFlag,
) -> Result<(u64, String), StageError> {
    let file = File::create(partial).map_err(|e| StageError::io(partial, e))?;
    let mut out = BufWriter::new(file);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK];
    let mut total = 0u64;

    loop {
        if cancel.is_cancelled() {
            return Err(StageError::Cancelled);
        }
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(StageError::download(url, e)),
        };
        hasher.update(&buf[..n]);
        out.write_all(&buf[..n])
            .map_err(|e| StageError::io(partial, e))?;
        total += n as u64;
    }
    out.flush().map_err(|e| StageError::io(partial, e))?;
    Ok((total, hex::encode(hasher.finalize())))
}
