// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Timer control and the flush executor loop.
//!
//! The timer never flushes by itself. It submits `Scheduled` requests into
//! the same channel that [`SyncScheduler::request_flush`] uses, and `run()`
//! executes them one at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::types::FlushRequest;
use super::{FlushReason, SyncScheduler};

impl SyncScheduler {
    /// (Re)start the periodic timer.
    ///
    /// Any previous timer is cancelled first, so repeated calls never stack
    /// ticks. The first tick fires one full interval from now. Does nothing
    /// beyond cancelling while disabled, or outside a Tokio runtime.
    pub fn resume(&self) {
        let mut timer = self.timer.lock();
        if let Some(handle) = timer.take() {
            handle.abort();
        }

        if !self.is_enabled() {
            debug!("Scheduler disabled, flush timer not started");
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No Tokio runtime available, flush timer not started");
            return;
        };

        let period = self.config.flush_interval();
        *timer = Some(runtime.spawn(tick_loop(
            self.requests_tx.clone(),
            self.scheduled_pending.clone(),
            period,
        )));
        info!(interval_secs = period.as_secs(), "Flush timer started");
    }

    /// Cancel the timer. An executing flush is not interrupted.
    pub fn stop(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
            info!("Flush timer stopped");
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.timer
            .lock()
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    /// Submit a flush to the executor and wait for its result.
    ///
    /// Returns `false` straight away when no executor is running, and
    /// `false` if the executor shuts down before handling the request. Use
    /// this for the operator "flush now" and for app-foreground triggers so
    /// they queue behind any scheduled flush instead of racing it.
    pub async fn request_flush(&self, reason: FlushReason) -> bool {
        let mut executor = self.executor.subscribe();
        if !*executor.borrow_and_update() {
            warn!(%reason, "Flush executor not running");
            return false;
        }

        let (reply, result) = oneshot::channel();
        let request = FlushRequest {
            reason,
            reply: Some(reply),
        };
        let requests = &self.requests_tx;
        let submitted = async move {
            requests.send(request).await.ok()?;
            result.await.ok()
        };

        tokio::select! {
            biased;

            ok = submitted => ok.unwrap_or(false),

            _ = executor.wait_for(|running| !*running) => {
                warn!(%reason, "Flush executor stopped before handling request");
                false
            }
        }
    }

    #[must_use]
    pub fn is_executor_running(&self) -> bool {
        *self.executor.borrow()
    }

    /// Spawn [`run`](Self::run) on the current runtime.
    ///
    /// The executor counts as running as soon as this returns, so a
    /// `request_flush` issued right after is accepted even if the task has
    /// not been polled yet.
    pub fn spawn_executor(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        self.executor.send_replace(true);
        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.run(shutdown).await })
    }

    /// Single-consumer flush executor.
    ///
    /// Runs until `shutdown` becomes `true` (or its sender is dropped). A
    /// flush that has started when shutdown arrives runs to completion.
    /// Requests still queued at exit are dropped and their callers get
    /// `false`.
    #[tracing::instrument(skip_all)]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let Ok(mut requests) = self.requests_rx.try_lock() else {
            warn!("Flush executor already running");
            return;
        };
        let _running = ExecutorRunning::mark(&self.executor);
        info!("Flush executor running");

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                request = requests.recv() => {
                    let Some(request) = request else {
                        break;
                    };
                    if request.reason == FlushReason::Scheduled {
                        self.scheduled_pending.store(false, Ordering::Release);
                    }
                    let ok = self.flush(request.reason).await;
                    if let Some(reply) = request.reply {
                        let _ = reply.send(ok);
                    }
                }
            }
        }

        self.executor.send_replace(false);
        let mut abandoned = 0usize;
        while requests.try_recv().is_ok() {
            abandoned += 1;
        }
        self.scheduled_pending.store(false, Ordering::Release);
        if abandoned > 0 {
            warn!(abandoned, "Dropped flush requests queued at shutdown");
        }
        info!("Flush executor stopped");
    }
}

/// Clears the executor flag when `run()` ends, including when its task is
/// aborted.
struct ExecutorRunning<'a>(&'a watch::Sender<bool>);

impl<'a> ExecutorRunning<'a> {
    fn mark(flag: &'a watch::Sender<bool>) -> Self {
        flag.send_replace(true);
        Self(flag)
    }
}

impl Drop for ExecutorRunning<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

async fn tick_loop(
    requests: mpsc::Sender<FlushRequest>,
    scheduled_pending: Arc<AtomicBool>,
    period: Duration,
) {
    let mut ticks = interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticks.tick().await;

        // One queued scheduled flush is enough; a second would drain nothing new
        if scheduled_pending.swap(true, Ordering::AcqRel) {
            debug!("Scheduled flush still pending, tick dropped");
            continue;
        }

        match requests.try_send(FlushRequest::scheduled()) {
            Ok(()) => debug!("Scheduled flush submitted"),
            Err(TrySendError::Full(_)) => {
                scheduled_pending.store(false, Ordering::Release);
                debug!("Executor queue full, tick dropped");
            }
            Err(TrySendError::Closed(_)) => break,
        }
    }
}
