// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync scheduler.
//!
//! The [`SyncScheduler`] decides when to deliver and what happens to a batch
//! that could not be delivered:
//! - collect → drain → send, one cycle at a time
//! - on failure the exact drained batch is appended back to the queue
//! - a periodic timer and the operator trigger feed one flush executor
//!
//! # Flow
//!
//! ```text
//!   timer task ──(Scheduled)──┐
//!                             ├──► request channel ──► run() executor ──► flush()
//!   request_flush(reason) ────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use telemetry_sync::{
//!     CollectorSet, FlushReason, HttpUploader, JsonlQueue, SyncConfig, SyncScheduler,
//! };
//! use tokio::sync::watch;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SyncConfig::default();
//! let queue = Arc::new(JsonlQueue::from_config(&config).await?);
//! let uploader = Arc::new(HttpUploader::from_config(&config)?);
//! let scheduler = Arc::new(SyncScheduler::new(
//!     config,
//!     queue,
//!     uploader,
//!     Arc::new(CollectorSet::new()),
//! ));
//!
//! let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//! scheduler.spawn_executor(shutdown_rx);
//!
//! scheduler.resume();
//! let delivered = scheduler.request_flush(FlushReason::Manual).await;
//! # Ok(())
//! # }
//! ```

mod flush;
mod lifecycle;
mod types;

pub use types::{FlushOutcome, FlushReason, FlushStatus, SchedulerStats};
use types::FlushRequest;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::collector::Collector;
use crate::config::SyncConfig;
use crate::queue::{QueueError, SampleQueue};
use crate::uploader::Uploader;

#[derive(Default)]
pub(super) struct Counters {
    attempts: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    samples_delivered: AtomicU64,
    samples_requeued: AtomicU64,
    consecutive_failures: AtomicU64,
}

/// Flush scheduler for one device.
///
/// All collaborators are injected, so tests can swap in an in-memory queue
/// and a scripted uploader.
///
/// # Thread Safety
///
/// `Send + Sync`; share it through an `Arc`. Concurrent [`flush`] calls are
/// serialized, so at most one drain+send is in flight.
///
/// [`flush`]: SyncScheduler::flush
pub struct SyncScheduler {
    pub(super) config: SyncConfig,

    pub(super) queue: Arc<dyn SampleQueue>,
    pub(super) uploader: Arc<dyn Uploader>,
    pub(super) collector: Arc<dyn Collector>,

    /// Operator toggle (broadcast to watchers)
    pub(super) enabled: watch::Sender<bool>,

    /// Last flush status (broadcast to watchers)
    pub(super) status: watch::Sender<FlushStatus>,

    /// Held for the whole collect→drain→send→requeue cycle
    pub(super) flush_lock: Mutex<()>,

    /// Periodic tick task, present while running
    pub(super) timer: parking_lot::Mutex<Option<JoinHandle<()>>>,

    /// Producer side of the executor channel
    pub(super) requests_tx: mpsc::Sender<FlushRequest>,

    /// Consumer side, owned by whoever is inside `run()`
    pub(super) requests_rx: Mutex<mpsc::Receiver<FlushRequest>>,

    /// A `run()` loop is consuming requests
    pub(super) executor: watch::Sender<bool>,

    /// A scheduled tick is queued and not yet picked up
    pub(super) scheduled_pending: Arc<AtomicBool>,

    pub(super) counters: Counters,
}

impl SyncScheduler {
    pub fn new(
        config: SyncConfig,
        queue: Arc<dyn SampleQueue>,
        uploader: Arc<dyn Uploader>,
        collector: Arc<dyn Collector>,
    ) -> Self {
        let (requests_tx, requests_rx) = mpsc::channel(config.executor_queue_depth.max(1));
        let (enabled, _) = watch::channel(config.enabled);
        let (status, _) = watch::channel(FlushStatus::Idle);
        let (executor, _) = watch::channel(false);

        info!(
            device_id = %config.device_id,
            batch_limit = config.batch_limit,
            interval_secs = config.flush_interval_secs,
            enabled = config.enabled,
            "Sync scheduler created"
        );

        Self {
            config,
            queue,
            uploader,
            collector,
            enabled,
            status,
            flush_lock: Mutex::new(()),
            timer: parking_lot::Mutex::new(None),
            requests_tx,
            requests_rx: Mutex::new(requests_rx),
            executor,
            scheduled_pending: Arc::new(AtomicBool::new(false)),
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        *self.enabled.borrow()
    }

    /// Watch the enable toggle.
    #[must_use]
    pub fn enabled_receiver(&self) -> watch::Receiver<bool> {
        self.enabled.subscribe()
    }

    /// Flip the enable toggle. false→true resumes the timer, true→false stops it.
    pub fn set_enabled(&self, enabled: bool) {
        let previous = self.enabled.send_replace(enabled);
        if previous == enabled {
            return;
        }
        info!(enabled, "Scheduler toggled");
        if enabled {
            self.resume();
        } else {
            self.stop();
        }
    }

    #[must_use]
    pub fn status(&self) -> FlushStatus {
        *self.status.borrow()
    }

    #[must_use]
    pub fn status_receiver(&self) -> watch::Receiver<FlushStatus> {
        self.status.subscribe()
    }

    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        let c = &self.counters;
        SchedulerStats {
            attempts: c.attempts.load(Ordering::Relaxed),
            succeeded: c.succeeded.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            skipped: c.skipped.load(Ordering::Relaxed),
            samples_delivered: c.samples_delivered.load(Ordering::Relaxed),
            samples_requeued: c.samples_requeued.load(Ordering::Relaxed),
            consecutive_failures: c.consecutive_failures.load(Ordering::Acquire),
        }
    }

    /// Samples currently waiting in the queue.
    pub async fn queue_count(&self) -> Result<usize, QueueError> {
        self.queue.count().await
    }

    /// Operator "clear buffer": discard every queued sample.
    ///
    /// Waits for an in-flight flush, so a batch that is being requeued is
    /// cleared too.
    pub async fn clear_queue(&self) -> Result<(), QueueError> {
        let _in_flight = self.flush_lock.lock().await;
        let dropped = self.queue.count().await.unwrap_or(0);
        self.queue.clear().await?;
        warn!(dropped, "Queue cleared by operator");
        crate::metrics::set_queue_depth(0);
        Ok(())
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().take() {
            handle.abort();
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::ScriptedUploader;
    use super::*;
    use crate::collector::CollectorSet;
    use crate::queue::InMemoryQueue;

    fn scheduler(enabled: bool) -> SyncScheduler {
        let config = SyncConfig { enabled, ..Default::default() };
        SyncScheduler::new(
            config,
            Arc::new(InMemoryQueue::new()),
            Arc::new(ScriptedUploader::always(true)),
            Arc::new(CollectorSet::new()),
        )
    }

    #[tokio::test]
    async fn test_initial_state() {
        let s = scheduler(true);
        assert!(s.is_enabled());
        assert_eq!(s.status(), FlushStatus::Idle);
        assert_eq!(s.stats(), SchedulerStats::default());
        assert!(!s.is_running());
    }

    #[tokio::test]
    async fn test_toggle_drives_timer() {
        let s = scheduler(false);
        assert!(!s.is_running());

        s.set_enabled(true);
        assert!(s.is_running());
        assert!(*s.enabled_receiver().borrow());

        s.set_enabled(false);
        assert!(!s.is_running());
        assert!(!s.is_enabled());
    }

    #[tokio::test]
    async fn test_set_enabled_same_value_is_noop() {
        let s = scheduler(true);
        s.set_enabled(true);
        assert!(!s.is_running(), "no transition, timer untouched");
    }

    #[tokio::test]
    async fn test_clear_queue() {
        let queue = Arc::new(InMemoryQueue::new());
        let s = SyncScheduler::new(
            SyncConfig::default(),
            queue.clone(),
            Arc::new(ScriptedUploader::always(true)),
            Arc::new(CollectorSet::new()),
        );
        queue
            .append(&crate::Sample::event(chrono::Utc::now(), "x"))
            .await
            .unwrap();
        assert_eq!(s.queue_count().await.unwrap(), 1);

        s.clear_queue().await.unwrap();

        assert_eq!(s.queue_count().await.unwrap(), 0);
    }

    /// Fails every delivery once released.
    #[derive(Default)]
    struct GatedUploader {
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait::async_trait]
    impl crate::uploader::Uploader for GatedUploader {
        async fn send(&self, _device_id: &str, _samples: &[crate::Sample]) -> bool {
            self.entered.notify_one();
            self.release.notified().await;
            false
        }
    }

    #[tokio::test]
    async fn test_clear_during_failing_flush_is_final() {
        let queue = Arc::new(InMemoryQueue::new());
        let uploader = Arc::new(GatedUploader::default());
        let s = Arc::new(SyncScheduler::new(
            SyncConfig::default(),
            queue.clone(),
            uploader.clone(),
            Arc::new(CollectorSet::new()),
        ));
        queue
            .append(&crate::Sample::event(chrono::Utc::now(), "in flight"))
            .await
            .unwrap();

        let flush = {
            let s = s.clone();
            tokio::spawn(async move { s.flush(FlushReason::Manual).await })
        };
        uploader.entered.notified().await;

        let clear = {
            let s = s.clone();
            tokio::spawn(async move { s.clear_queue().await })
        };
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!clear.is_finished(), "clear waits for the in-flight flush");

        uploader.release.notify_one();
        assert!(!flush.await.unwrap());
        clear.await.unwrap().unwrap();

        assert_eq!(s.queue_count().await.unwrap(), 0);
    }
}
