// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The flush pipeline: collect → drain → send, requeue on failure.

use std::sync::atomic::Ordering;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use super::{FlushOutcome, FlushReason, FlushStatus, SyncScheduler};

impl SyncScheduler {
    /// Run one flush cycle. Returns `true` only if the batch was delivered.
    ///
    /// Never fails: storage and delivery errors are logged and reported as
    /// `false`, and the next cycle tries again.
    pub async fn flush(&self, reason: FlushReason) -> bool {
        self.flush_detailed(reason).await.is_success()
    }

    /// Like [`flush`](Self::flush) but reports what happened to the batch.
    #[tracing::instrument(skip_all, fields(reason = %reason))]
    pub async fn flush_detailed(&self, reason: FlushReason) -> FlushOutcome {
        if !self.is_enabled() && reason != FlushReason::Manual {
            debug!("Scheduler disabled, flush skipped");
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            crate::metrics::record_flush(reason, FlushOutcome::Skipped.label());
            return FlushOutcome::Skipped;
        }

        // One cycle at a time; a second caller waits and then drains what is left
        let _in_flight = self.flush_lock.lock().await;
        let start = Instant::now();
        self.counters.attempts.fetch_add(1, Ordering::Relaxed);
        self.status.send_replace(FlushStatus::Flushing);

        let outcome = self.run_pipeline().await;

        self.record_outcome(reason, outcome);
        crate::metrics::record_flush_duration(start.elapsed());
        if let Ok(depth) = self.queue.count().await {
            crate::metrics::set_queue_depth(depth);
        }

        outcome
    }

    async fn run_pipeline(&self) -> FlushOutcome {
        if let Err(e) = self.collector.collect(self.queue.as_ref()).await {
            warn!(error = %e, "Collection failed, continuing with drain");
            crate::metrics::record_collector_failure(self.collector.name());
        }

        let batch = match self.queue.drain(self.config.batch_limit).await {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %e, "Queue drain failed, skipping this cycle");
                return FlushOutcome::StorageFailed;
            }
        };

        if batch.is_empty() {
            debug!("Queue empty, nothing to deliver");
            return FlushOutcome::Delivered(0);
        }

        crate::metrics::record_batch_size(batch.len());

        if self.uploader.send(&self.config.device_id, &batch).await {
            return FlushOutcome::Delivered(batch.len());
        }

        // Back on the tail; samples collected meanwhile may now precede it
        match self.queue.append_batch(&batch).await {
            Ok(()) => {
                debug!(count = batch.len(), "Undelivered batch requeued");
                FlushOutcome::Requeued(batch.len())
            }
            Err(e) => {
                error!(error = %e, lost = batch.len(), "Failed to requeue undelivered batch");
                crate::metrics::record_samples_lost(batch.len());
                FlushOutcome::RequeueFailed(batch.len())
            }
        }
    }

    fn record_outcome(&self, reason: FlushReason, outcome: FlushOutcome) {
        let c = &self.counters;
        crate::metrics::record_flush(reason, outcome.label());

        match outcome {
            FlushOutcome::Delivered(count) => {
                c.succeeded.fetch_add(1, Ordering::Relaxed);
                c.samples_delivered.fetch_add(count as u64, Ordering::Relaxed);
                c.consecutive_failures.store(0, Ordering::Release);
                crate::metrics::record_samples_delivered(count);
                self.status.send_replace(FlushStatus::Succeeded);
                if count > 0 {
                    info!(count, "Flush delivered batch");
                }
            }
            FlushOutcome::Requeued(count) => {
                c.samples_requeued.fetch_add(count as u64, Ordering::Relaxed);
                crate::metrics::record_samples_requeued(count);
                self.mark_failed();
            }
            FlushOutcome::RequeueFailed(_) | FlushOutcome::StorageFailed => {
                self.mark_failed();
            }
            FlushOutcome::Skipped => {}
        }
    }

    fn mark_failed(&self) {
        let c = &self.counters;
        c.failed.fetch_add(1, Ordering::Relaxed);
        let streak = c.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        self.status.send_replace(FlushStatus::Failed);
        warn!(consecutive_failures = streak, "Flush failed, will retry next cycle");
    }
}
