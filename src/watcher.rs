//! Polling file follower.
//!
//! A watcher attaches at the current end of a file and yields every line
//! appended afterwards. It survives truncation (rewinds to the start) and
//! replacement of the path by a new file (drains the old handle, then reopens
//! the path and reads it from the beginning). Only polling is used, so it
//! works on filesystems without change notification.

use futures::Stream;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tracing::{debug, info, warn};

use crate::error::WatchError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Device and inode of an open file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    dev: u64,
    ino: u64,
}

#[cfg(unix)]
fn identity(meta: &std::fs::Metadata) -> Option<FileIdentity> {
    use std::os::unix::fs::MetadataExt;
    Some(FileIdentity {
        dev: meta.dev(),
        ino: meta.ino(),
    })
}

// Without inode numbers only truncation can be detected.
#[cfg(not(unix))]
fn identity(_meta: &std::fs::Metadata) -> Option<FileIdentity> {
    None
}

pub struct FileWatcher {
    path: PathBuf,
    reader: BufReader<File>,
    identity: Option<FileIdentity>,
    /// Bytes consumed from the current file, including `pending`
    position: u64,
    /// Bytes of a line whose newline has not been written yet
    pending: Vec<u8>,
    /// Set once a replacement file has been seen; the old handle gets one
    /// more poll to be drained before switching.
    rotation_seen: bool,
    poll_interval: Duration,
}

impl FileWatcher {
    /// Attach to `path` at its current end.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, WatchError> {
        let path = path.into();
        let mut file = File::open(&path).await.map_err(|source| WatchError::Open {
            path: path.clone(),
            source,
        })?;
        let position = file
            .seek(SeekFrom::End(0))
            .await
            .map_err(|source| WatchError::Seek {
                path: path.clone(),
                source,
            })?;
        let identity = file.metadata().await.ok().as_ref().and_then(identity);

        debug!(path = %path.display(), offset = position, "Attached watcher");

        Ok(Self {
            path,
            reader: BufReader::new(file),
            identity,
            position,
            pending: Vec::new(),
            rotation_seen: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the next complete line. Never returns an error: read
    /// failures are logged and retried on the next poll.
    pub async fn next_line(&mut self) -> String {
        loop {
            match self.reader.read_until(b'\n', &mut self.pending).await {
                Ok(0) => {}
                Ok(n) => {
                    self.position += n as u64;
                    if self.pending.last() == Some(&b'\n') {
                        return self.take_line();
                    }
                    continue;
                }
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Failed to read source file");
                }
            }

            if let Some(line) = self.check_rotation().await {
                return line;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Turn the watcher into an infinite stream of lines
    pub fn into_lines(self) -> impl Stream<Item = String> {
        futures::stream::unfold(self, |mut watcher| async move {
            let line = watcher.next_line().await;
            Some((line, watcher))
        })
    }

    /// Called at end of file. Returns a leftover partial line when the
    /// current file is abandoned.
    async fn check_rotation(&mut self) -> Option<String> {
        let meta = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "Source file unavailable, waiting");
                return None;
            }
        };

        let current = identity(&meta);
        if current.is_some() && current != self.identity {
            if !self.rotation_seen {
                self.rotation_seen = true;
                return None;
            }

            let file = match File::open(&self.path).await {
                Ok(file) => file,
                Err(e) => {
                    debug!(path = %self.path.display(), error = %e, "Replacement file not readable yet");
                    return None;
                }
            };
            info!(path = %self.path.display(), "Source file rotated, reopening");

            let leftover = self.take_partial();
            self.reader = BufReader::new(file);
            self.identity = current;
            self.position = 0;
            self.rotation_seen = false;
            return leftover;
        }

        if meta.len() < self.position {
            info!(
                path = %self.path.display(),
                size = meta.len(),
                offset = self.position,
                "Source file truncated, rewinding"
            );
            if let Err(e) = self.reader.seek(SeekFrom::Start(0)).await {
                warn!(path = %self.path.display(), error = %e, "Failed to rewind source file");
                return None;
            }
            self.position = 0;
            return self.take_partial();
        }

        None
    }

    fn take_line(&mut self) -> String {
        while matches!(self.pending.last(), Some(&b'\n') | Some(&b'\r')) {
            self.pending.pop();
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        line
    }

    fn take_partial(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.take_line())
        }
    }
}
