//! # Telemetry Sync
//!
//! On-device buffering and batched delivery of sensor telemetry.
//!
//! ## Architecture
//!
//! Samples are written to a durable local queue as they are produced and
//! delivered in bounded batches whenever the scheduler decides to flush:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Collectors                           │
//! │  • Polling sources read since a watermark                  │
//! │  • Instant gauges add one reading per cycle                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Durable Queue (JSONL file)                 │
//! │  • One JSON record per line, appended with fsync           │
//! │  • Drain removes the oldest N, remainder rewritten atomically│
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                  (flush: timer, app foreground, manual)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Batch Uploader                         │
//! │  • One envelope per batch: { metadata, data }              │
//! │  • 2xx is the only success; failures are requeued          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chrono::Utc;
//! use telemetry_sync::{
//!     CollectorSet, FlushReason, HttpUploader, JsonlQueue, Sample, SampleQueue, SyncConfig,
//!     SyncScheduler,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SyncConfig {
//!         endpoint_url: "https://ingest.example.com/ingest".into(),
//!         api_key: "secret".into(),
//!         device_id: "A1B2-C3".into(),
//!         ..Default::default()
//!     };
//!     config.validate()?;
//!
//!     let queue = Arc::new(JsonlQueue::from_config(&config).await?);
//!     queue.append(&Sample::vital(Utc::now(), 1, 62.0)).await?;
//!
//!     let uploader = Arc::new(HttpUploader::from_config(&config)?);
//!     let scheduler = SyncScheduler::new(config, queue, uploader, Arc::new(CollectorSet::new()));
//!
//!     let delivered = scheduler.flush(FlushReason::Manual).await;
//!     println!("delivered: {delivered}");
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`sample`]: Sample records and the upload envelope
//! - [`queue`]: Durable and in-memory sample queues
//! - [`uploader`]: HTTP batch delivery
//! - [`collector`]: Pre-drain collection hooks
//! - [`scheduler`]: The [`SyncScheduler`] driving collect → drain → send
//! - [`metrics`]: Metrics instrumentation

pub mod config;
pub mod sample;
pub mod queue;
pub mod uploader;
pub mod collector;
pub mod scheduler;
pub mod metrics;

pub use config::{ConfigError, SyncConfig};
pub use sample::{Envelope, EventRecord, LocationFix, MotionContext, Sample, SampleKind, VitalReading};
pub use queue::{InMemoryQueue, JsonlQueue, QueueError, QueueStats, SampleQueue};
pub use uploader::{HttpUploader, UploadError, Uploader};
pub use collector::{CollectError, Collector, CollectorSet, InstantCollector, PollingCollector, SampleSource};
pub use scheduler::{FlushOutcome, FlushReason, FlushStatus, SchedulerStats, SyncScheduler};
