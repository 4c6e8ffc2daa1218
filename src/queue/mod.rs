//! # Durable Queue Module
//!
//! Append-only JSON Lines log of undelivered telemetry records.
//!
//! This module handles:
//! - Appending one record per line, oldest first
//! - Reading every pending line in order
//! - Whole-file clear and pending-line count
//! - Recovering from a torn final line left by a crash
//!
//! Complete lines are never edited or reordered; the file only grows by
//! whole-line appends or goes away entirely on clear. Every operation takes
//! the same lock, so a reader never observes a half-written append.

use std::io::{self, ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::Result;
use crate::telemetry::TelemetryRecord;

/// On-disk FIFO of pending records
#[derive(Debug)]
pub struct DurableQueue {
    path: PathBuf,
    lock: Mutex<()>,
}

impl DurableQueue {
    /// Create a queue handle for `path`.
    ///
    /// Nothing touches the disk until the first operation; the file is
    /// created on first append.
    #[must_use]
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    /// Path of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single line.
    ///
    /// The line and its newline go out in one write and are synced before
    /// returning.
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be encoded or the file cannot be
    /// written.
    pub async fn append(&self, record: &TelemetryRecord) -> Result<()> {
        let line = record.to_json_line()?;
        self.append_line(&line).await
    }

    /// Append an already-encoded line (without its newline).
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written.
    pub async fn append_line(&self, line: &str) -> Result<()> {
        let _guard = self.lock.lock().await;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        self.truncate_torn_tail().await?;

        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&buf).await?;
        file.sync_data().await?;

        debug!("Queued record ({} bytes) to {}", buf.len(), self.path.display());
        Ok(())
    }

    /// Read every complete pending line, oldest first.
    ///
    /// A missing file reads as an empty queue. Blank lines are skipped.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read.
    pub async fn read_all(&self) -> Result<Vec<String>> {
        let _guard = self.lock.lock().await;
        self.read_lines().await
    }

    /// Number of pending lines
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read.
    pub async fn count(&self) -> Result<usize> {
        Ok(self.read_all().await?.len())
    }

    /// Delete the queue file. Clearing an absent queue is a no-op.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be removed.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!("Cleared queue at {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_lines(&self) -> Result<Vec<String>> {
        let contents = match fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let keep = complete_prefix_len(&contents);
        if keep < contents.len() {
            warn!(
                "Ignoring unterminated {}-byte fragment at end of {}",
                contents.len() - keep,
                self.path.display()
            );
        }

        let complete = std::str::from_utf8(&contents[..keep])
            .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;

        Ok(complete
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Cut an unterminated trailing fragment so the next append starts on
    /// a fresh line. Complete lines are left alone.
    async fn truncate_torn_tail(&self) -> Result<()> {
        let mut file = match OpenOptions::new().read(true).write(true).open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let len = file.metadata().await?.len();
        if len == 0 {
            return Ok(());
        }

        let mut last = [0u8; 1];
        file.seek(SeekFrom::Start(len - 1)).await?;
        file.read_exact(&mut last).await?;
        if last[0] == b'\n' {
            return Ok(());
        }

        let contents = fs::read(&self.path).await?;
        let keep = complete_prefix_len(&contents);

        warn!(
            "Truncating {}-byte torn tail in {}",
            contents.len() - keep,
            self.path.display()
        );

        file.set_len(keep as u64).await?;
        file.sync_data().await?;
        Ok(())
    }
}

/// Length of the prefix made of whole `\n`-terminated lines
fn complete_prefix_len(contents: &[u8]) -> usize {
    contents
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |idx| idx + 1)
}
