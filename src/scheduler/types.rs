// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the sync scheduler.

use tokio::sync::oneshot;

/// What triggered a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlushReason {
    /// Periodic timer tick
    Scheduled,
    /// The host app came to the foreground
    AppForeground,
    /// Operator "flush now". Runs even while the scheduler is disabled.
    Manual,
}

impl std::fmt::Display for FlushReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::AppForeground => write!(f, "app_foreground"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Operator-facing indicator of the last flush.
///
/// Use [`super::SyncScheduler::status()`] for the current value or
/// [`super::SyncScheduler::status_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    /// No flush has run yet
    Idle,
    /// A flush is in progress
    Flushing,
    /// Last flush delivered its batch
    Succeeded,
    /// Last flush failed (batch requeued or storage error)
    Failed,
}

impl std::fmt::Display for FlushStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Flushing => write!(f, "Flushing"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Result of one flush cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Disabled and not a manual flush; nothing touched
    Skipped,
    /// Batch (possibly empty) delivered
    Delivered(usize),
    /// Delivery failed, batch appended back to the queue
    Requeued(usize),
    /// Delivery failed and so did the requeue; the batch is gone
    RequeueFailed(usize),
    /// Queue could not be drained
    StorageFailed,
}

impl FlushOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }

    pub(super) fn label(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Delivered(_) => "delivered",
            Self::Requeued(_) => "requeued",
            Self::RequeueFailed(_) => "requeue_failed",
            Self::StorageFailed => "storage_failed",
        }
    }
}

/// Counter snapshot for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Flushes that ran the pipeline
    pub attempts: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Flushes skipped because the scheduler was disabled
    pub skipped: u64,
    pub samples_delivered: u64,
    pub samples_requeued: u64,
    /// Failures since the last success
    pub consecutive_failures: u64,
}

/// A unit of work for the flush executor.
#[derive(Debug)]
pub(crate) struct FlushRequest {
    pub reason: FlushReason,
    pub reply: Option<oneshot::Sender<bool>>,
}

impl FlushRequest {
    pub(crate) fn scheduled() -> Self {
        Self {
            reason: FlushReason::Scheduled,
            reply: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_reason_display() {
        assert_eq!(FlushReason::Scheduled.to_string(), "scheduled");
        assert_eq!(FlushReason::AppForeground.to_string(), "app_foreground");
        assert_eq!(FlushReason::Manual.to_string(), "manual");
    }

    #[test]
    fn test_flush_status_display() {
        assert_eq!(format!("{}", FlushStatus::Idle), "Idle");
        assert_eq!(format!("{}", FlushStatus::Failed), "Failed");
    }

    #[test]
    fn test_outcome_is_success() {
        assert!(FlushOutcome::Delivered(0).is_success());
        assert!(FlushOutcome::Delivered(10).is_success());
        assert!(!FlushOutcome::Skipped.is_success());
        assert!(!FlushOutcome::Requeued(3).is_success());
        assert!(!FlushOutcome::RequeueFailed(3).is_success());
        assert!(!FlushOutcome::StorageFailed.is_success());
    }
}
