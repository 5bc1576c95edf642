// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Newline-delimited JSON queue file.
//!
//! Each line is one serialized [`Sample`], in arrival order. Appends go to
//! the end of the file. A drain reads the whole file, takes the first
//! `limit` lines and rewrites the remainder through a temp file + rename,
//! so other operations see either the old or the new content.
//!
//! This is NOT a log-structured store. Record counts are expected in the
//! hundreds to low thousands, and every drain rewrites what is left.
//!
//! A line without a terminating newline is an append interrupted by a
//! crash. It is not counted, not drained, and is cut off when the queue is
//! reopened.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::traits::{check_finite, QueueError, SampleQueue};
use crate::config::SyncConfig;
use crate::sample::Sample;

/// Counters for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Samples appended since open
    pub total_appended: u64,
    /// Samples returned by drain since open
    pub total_drained: u64,
    /// Undecodable records removed by drain since open
    pub total_rejected: u64,
}

/// File-backed durable queue.
pub struct JsonlQueue {
    path: PathBuf,
    tmp_path: PathBuf,
    /// Where undecodable records go. `None` drops them.
    quarantine_path: Option<PathBuf>,
    /// Serializes every file operation
    lock: Mutex<()>,
    total_appended: AtomicU64,
    total_drained: AtomicU64,
    total_rejected: AtomicU64,
}

impl JsonlQueue {
    /// Open (or create) the queue file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, QueueError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let queue = Self {
            tmp_path: sibling_with_suffix(&path, ".tmp"),
            path,
            quarantine_path: None,
            lock: Mutex::new(()),
            total_appended: AtomicU64::new(0),
            total_drained: AtomicU64::new(0),
            total_rejected: AtomicU64::new(0),
        };

        // Create empty if missing
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&queue.path)
            .await?;

        queue.repair_partial_tail().await?;

        let pending = queue.count().await?;
        if pending > 0 {
            warn!(pending, path = %queue.path.display(), "Queue has records from previous run");
        }
        info!(path = %queue.path.display(), pending, "Sample queue opened");

        Ok(queue)
    }

    /// Open `queue_path`, quarantining to `quarantine_path` when set.
    pub async fn from_config(config: &SyncConfig) -> Result<Self, QueueError> {
        let queue = Self::open(&config.queue_path).await?;
        Ok(match &config.quarantine_path {
            Some(path) => queue.with_quarantine(path),
            None => queue,
        })
    }

    /// Keep undecodable records in `path` instead of dropping them.
    #[must_use]
    pub fn with_quarantine(mut self, path: impl Into<PathBuf>) -> Self {
        self.quarantine_path = Some(path.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            total_appended: self.total_appended.load(Ordering::Relaxed),
            total_drained: self.total_drained.load(Ordering::Relaxed),
            total_rejected: self.total_rejected.load(Ordering::Relaxed),
        }
    }

    /// Store size in bytes.
    pub async fn file_size_bytes(&self) -> Result<u64, QueueError> {
        match fs::metadata(&self.path).await {
            Ok(m) => Ok(m.len()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_store(&self) -> Result<Vec<u8>, QueueError> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(bytes),
            // Deleted underneath us: same as empty, recreated on next write
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically replace the store with `contents`.
    async fn replace_contents(&self, contents: &[u8]) -> Result<(), QueueError> {
        let mut tmp = fs::File::create(&self.tmp_path).await?;
        tmp.write_all(contents).await?;
        tmp.sync_all().await?;
        drop(tmp);
        fs::rename(&self.tmp_path, &self.path).await?;
        Ok(())
    }

    async fn repair_partial_tail(&self) -> Result<(), QueueError> {
        let _guard = self.lock.lock().await;
        let bytes = self.read_store().await?;
        let end = complete_len(&bytes);
        if end < bytes.len() {
            warn!(
                discarded_bytes = bytes.len() - end,
                path = %self.path.display(),
                "Discarding unterminated trailing record from interrupted append"
            );
            self.replace_contents(&bytes[..end]).await?;
        }
        Ok(())
    }

    async fn quarantine(&self, lines: &[&[u8]]) {
        let Some(ref qpath) = self.quarantine_path else {
            return;
        };

        let mut buf = Vec::new();
        for line in lines {
            buf.extend_from_slice(line);
            buf.push(b'\n');
        }

        let result = async {
            let mut file = OpenOptions::new().create(true).append(true).open(qpath).await?;
            file.write_all(&buf).await?;
            file.sync_data().await
        }
        .await;

        if let Err(e) = result {
            error!(error = %e, path = %qpath.display(), count = lines.len(), "Failed to quarantine malformed records");
        }
    }
}

#[async_trait]
impl SampleQueue for JsonlQueue {
    async fn append_batch(&self, samples: &[Sample]) -> Result<(), QueueError> {
        if samples.is_empty() {
            return Ok(());
        }

        // Encode everything up front so a bad sample never leaves half a batch behind
        check_finite(samples)?;
        let mut buf = Vec::with_capacity(samples.len() * 96);
        for sample in samples {
            serde_json::to_writer(&mut buf, sample)?;
            buf.push(b'\n');
        }

        let _guard = self.lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let original_len = file.metadata().await?.len();

        let written = async {
            file.write_all(&buf).await?;
            file.sync_data().await
        }
        .await;

        if let Err(e) = written {
            // Roll back so the next append does not glue onto a partial line
            if let Err(trunc) = file.set_len(original_len).await {
                error!(error = %trunc, "Failed to roll back partial append");
            }
            return Err(e.into());
        }

        self.total_appended.fetch_add(samples.len() as u64, Ordering::Relaxed);
        debug!(count = samples.len(), bytes = buf.len(), "Samples appended to queue");
        Ok(())
    }

    async fn drain(&self, limit: usize) -> Result<Vec<Sample>, QueueError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let _guard = self.lock.lock().await;
        let bytes = self.read_store().await?;
        let records: Vec<&[u8]> = complete_records(&bytes).collect();
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let (head, rest) = records.split_at(limit.min(records.len()));

        let mut drained = Vec::with_capacity(head.len());
        let mut rejected: Vec<&[u8]> = Vec::new();
        for line in head {
            match serde_json::from_slice::<Sample>(line) {
                Ok(sample) => drained.push(sample),
                Err(e) => {
                    debug!(error = %e, "Undecodable queue record");
                    rejected.push(*line);
                }
            }
        }

        let mut remainder = Vec::with_capacity(bytes.len());
        for line in rest {
            remainder.extend_from_slice(line);
            remainder.push(b'\n');
        }

        self.replace_contents(&remainder).await?;

        // Only once the lines are gone from the store, or a retry copies them twice
        if !rejected.is_empty() {
            self.quarantine(&rejected).await;
            warn!(
                rejected = rejected.len(),
                quarantined = self.quarantine_path.is_some(),
                "Removed undecodable records from queue"
            );
            self.total_rejected.fetch_add(rejected.len() as u64, Ordering::Relaxed);
            crate::metrics::record_rejected_records(rejected.len());
        }
        self.total_drained.fetch_add(drained.len() as u64, Ordering::Relaxed);
        debug!(drained = drained.len(), remaining = rest.len(), limit, "Queue drained");

        Ok(drained)
    }

    async fn count(&self) -> Result<usize, QueueError> {
        let _guard = self.lock.lock().await;
        let bytes = self.read_store().await?;
        Ok(complete_records(&bytes).count())
    }

    async fn clear(&self) -> Result<(), QueueError> {
        let _guard = self.lock.lock().await;
        self.replace_contents(&[]).await?;
        info!(path = %self.path.display(), "Sample queue cleared");
        Ok(())
    }
}

/// Length of the prefix that ends in a newline.
fn complete_len(bytes: &[u8]) -> usize {
    bytes.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1)
}

/// Newline-terminated, non-empty lines.
fn complete_records(bytes: &[u8]) -> impl Iterator<Item = &[u8]> {
    bytes[..complete_len(bytes)]
        .split(|&b| b == b'\n')
        .filter(|line| !line.is_empty())
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
