// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the telemetry pipeline.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for choosing the exporter.
//!
//! # Metric Naming Convention
//! - `telemetry_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//! - `_bytes` suffix for size histograms
//!
//! # Labels
//! - `reason`: scheduled, app_foreground, manual
//! - `outcome`: delivered, requeued, requeue_failed, storage_failed, skipped
//! - `status`: success, encode, timeout, transport, status

use metrics::{counter, gauge, histogram};
use std::time::Duration;

use crate::scheduler::FlushReason;

/// Record one flush attempt and how it ended
pub fn record_flush(reason: FlushReason, outcome: &str) {
    counter!(
        "telemetry_sync_flushes_total",
        "reason" => reason.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record wall time of a full collect→drain→send cycle
pub fn record_flush_duration(duration: Duration) {
    histogram!("telemetry_sync_flush_seconds").record(duration.as_secs_f64());
}

/// Record size of a drained batch
pub fn record_batch_size(count: usize) {
    histogram!("telemetry_sync_batch_size").record(count as f64);
}

pub fn record_samples_delivered(count: usize) {
    counter!("telemetry_sync_samples_delivered_total").increment(count as u64);
}

pub fn record_samples_requeued(count: usize) {
    counter!("telemetry_sync_samples_requeued_total").increment(count as u64);
}

/// Samples dropped because requeue after a failed delivery also failed
pub fn record_samples_lost(count: usize) {
    counter!("telemetry_sync_samples_lost_total").increment(count as u64);
}

/// Undecodable queue records removed during drain
pub fn record_rejected_records(count: usize) {
    counter!("telemetry_sync_rejected_records_total").increment(count as u64);
}

/// Set samples currently waiting in the queue
pub fn set_queue_depth(count: usize) {
    gauge!("telemetry_sync_queue_depth").set(count as f64);
}

/// Record one delivery request result
pub fn record_upload(status: &str) {
    counter!(
        "telemetry_sync_uploads_total",
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_upload_latency(duration: Duration) {
    histogram!("telemetry_sync_upload_seconds").record(duration.as_secs_f64());
}

/// Record encoded envelope size
pub fn record_upload_bytes(bytes: usize) {
    histogram!("telemetry_sync_upload_bytes").record(bytes as f64);
}

pub fn record_collector_failure(collector: &str) {
    counter!(
        "telemetry_sync_collector_failures_total",
        "collector" => collector.to_string()
    )
    .increment(1);
}
