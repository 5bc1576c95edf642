// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic telemetry-sync usage example.
//!
//! Demonstrates:
//! 1. Opening a durable queue and appending samples of every kind
//! 2. Running the flush executor against a local stub ingest server
//! 3. A failed delivery (503) being requeued, then delivered
//! 4. Collectors running before each drain
//! 5. Displaying metrics
//! 6. Clean shutdown
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_pipeline
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{Duration, Utc};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use telemetry_sync::sample::AMBIENT_NOISE_DB;
use telemetry_sync::{
    CollectorSet, FlushReason, HttpUploader, InstantCollector, JsonlQueue, MotionContext, Sample,
    SampleQueue, SyncConfig, SyncScheduler,
};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Default)]
struct Ingest {
    requests: AtomicUsize,
    accepted_samples: AtomicUsize,
}

// First request is refused so the requeue path is visible
async fn ingest(
    State(state): State<Arc<Ingest>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> StatusCode {
    let n = state.requests.fetch_add(1, Ordering::SeqCst);
    let samples = body["data"].as_array().map_or(0, Vec::len);
    println!(
        "   └─ [ingest] request #{} device={} key={} samples={}",
        n + 1,
        body["metadata"]["device_id"],
        headers.get("x-api-key").and_then(|v| v.to_str().ok()).unwrap_or("-"),
        samples
    );
    if n == 0 {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    state.accepted_samples.fetch_add(samples, Ordering::SeqCst);
    StatusCode::OK
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║          telemetry-sync: Basic Pipeline Example               ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Stub ingest server
    // ─────────────────────────────────────────────────────────────────────────
    let ingest_state = Arc::new(Ingest::default());
    let app = Router::new()
        .route("/ingest", post(ingest))
        .with_state(ingest_state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    println!("🌐 Stub ingest listening on http://{}/ingest", addr);

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Queue and samples
    // ─────────────────────────────────────────────────────────────────────────
    let dir = tempfile::tempdir()?;
    let config = SyncConfig {
        queue_path: dir.path().join("sensor_buffer.jsonl").display().to_string(),
        endpoint_url: format!("http://{}/ingest", addr),
        api_key: "demo-key".into(),
        device_id: "demo-device".into(),
        batch_limit: 4,
        ..Default::default()
    };
    config.validate()?;

    let queue = Arc::new(JsonlQueue::from_config(&config).await?);
    let now = Utc::now();
    queue
        .append_batch(&[
            Sample::vital(now - Duration::minutes(5), 1, 61.0),
            Sample::vital(now - Duration::minutes(4), 2, 0.98),
            Sample::location(now - Duration::minutes(3), 51.5072, -0.1276, 12.0)
                .with_motion_context(MotionContext::Walking),
            Sample::event(now - Duration::minutes(2), "workout_start").with_text("run"),
            Sample::event(now - Duration::minutes(1), "sleep_core")
                .with_metadata([("duration_min", "95")]),
        ])
        .await?;
    println!("\n📝 Queued {} samples at {}", queue.count().await?, queue.path().display());

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Scheduler with one instant collector
    // ─────────────────────────────────────────────────────────────────────────
    let uploader = Arc::new(HttpUploader::from_config(&config)?);
    let collectors = CollectorSet::new().with(Arc::new(InstantCollector::new(
        "ambient_noise",
        AMBIENT_NOISE_DB,
        || Some(38.5),
    )));
    let scheduler = Arc::new(SyncScheduler::new(config, queue.clone(), uploader, Arc::new(collectors)));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let executor = scheduler.spawn_executor(shutdown_rx);
    scheduler.resume();

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Flush until empty
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🚀 Flushing...");
    for reason in [FlushReason::Manual, FlushReason::AppForeground, FlushReason::Manual, FlushReason::Manual] {
        let ok = scheduler.request_flush(reason).await;
        println!(
            "   ├─ {} → {} (status: {}, remaining: {})",
            reason,
            if ok { "delivered" } else { "requeued" },
            scheduler.status(),
            scheduler.queue_count().await?
        );
    }

    let stats = scheduler.stats();
    println!("\n📊 Scheduler Stats:");
    println!("   ┌─ attempts: {}", stats.attempts);
    println!("   ├─ succeeded: {} / failed: {}", stats.succeeded, stats.failed);
    println!("   ├─ delivered: {} / requeued: {}", stats.samples_delivered, stats.samples_requeued);
    println!(
        "   └─ ingest accepted {} samples over {} requests",
        ingest_state.accepted_samples.load(Ordering::SeqCst),
        ingest_state.requests.load(Ordering::SeqCst)
    );

    println!("\n📈 Raw Metrics:");
    dump_metrics(&snapshotter);

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Shutdown
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🛑 Shutting down...");
    scheduler.stop();
    let _ = shutdown_tx.send(true);
    executor.await?;
    println!("   ✅ Shutdown complete!");

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

/// Dump all captured metrics, grouped by kind
fn dump_metrics(snapshotter: &Snapshotter) {
    let mut counters = vec![];
    let mut gauges = vec![];
    let mut histograms = vec![];

    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let (_, key) = composite_key.into_parts();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };
        let name = format!("{}{}", key.name(), label_str);

        match value {
            DebugValue::Counter(v) => counters.push((name, v)),
            DebugValue::Gauge(v) => gauges.push((name, v.into_inner())),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                histograms.push((name, count, sum));
            }
        }
    }

    counters.sort();
    gauges.sort_by(|a, b| a.0.cmp(&b.0));
    histograms.sort_by(|a, b| a.0.cmp(&b.0));

    println!("   ┌─ Counters");
    for (name, value) in &counters {
        println!("   │  └─ {} = {}", name, value);
    }
    println!("   ├─ Gauges");
    for (name, value) in &gauges {
        println!("   │  └─ {} = {:.2}", name, value);
    }
    println!("   └─ Histograms");
    for (name, count, sum) in &histograms {
        println!("      └─ {} count={} sum={:.4}", name, count, sum);
    }
}
