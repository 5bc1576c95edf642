// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Collection hooks run before each drain.
//!
//! A flush first asks its [`Collector`] to push fresh samples into the queue
//! (health metrics since the last poll, an instantaneous noise reading, ...)
//! and only then drains. The scheduler never looks at what was collected.
//!
//! A failing collector is logged and skipped. It never blocks the
//! drain/send half of the flush.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::queue::{QueueError, SampleQueue};
use crate::sample::Sample;

#[derive(Error, Debug)]
pub enum CollectError {
    #[error("Sample source failed: {0}")]
    Source(String),
    #[error("Failed to enqueue collected samples: {0}")]
    Queue(#[from] QueueError),
}

/// Pushes zero or more new samples into the queue.
#[async_trait]
pub trait Collector: Send + Sync {
    fn name(&self) -> &str;

    /// Returns the number of samples appended.
    async fn collect(&self, queue: &dyn SampleQueue) -> Result<usize, CollectError>;
}

/// Ordered set of collectors. Individual failures are logged, never returned.
#[derive(Default)]
pub struct CollectorSet {
    collectors: Vec<Arc<dyn Collector>>,
}

impl CollectorSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, collector: Arc<dyn Collector>) -> Self {
        self.collectors.push(collector);
        self
    }

    pub fn push(&mut self, collector: Arc<dyn Collector>) {
        self.collectors.push(collector);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }
}

#[async_trait]
impl Collector for CollectorSet {
    fn name(&self) -> &str {
        "collector_set"
    }

    async fn collect(&self, queue: &dyn SampleQueue) -> Result<usize, CollectError> {
        let mut total = 0;
        for collector in &self.collectors {
            match collector.collect(queue).await {
                Ok(count) => {
                    debug!(collector = collector.name(), count, "Collected samples");
                    total += count;
                }
                Err(e) => {
                    warn!(collector = collector.name(), error = %e, "Collection failed, skipping this cycle");
                    crate::metrics::record_collector_failure(collector.name());
                }
            }
        }
        Ok(total)
    }
}

/// A history-capable producer (health store, sleep stages, ...).
#[async_trait]
pub trait SampleSource: Send + Sync {
    /// Samples recorded at or after `since`. May be out of timestamp order.
    async fn fetch_since(&self, since: DateTime<Utc>) -> Result<Vec<Sample>, CollectError>;
}

/// Polls a [`SampleSource`] from a last-sync watermark.
///
/// The watermark only advances after the fetched samples are safely in the
/// queue, so a failed cycle is polled again on the next one.
pub struct PollingCollector<S> {
    name: String,
    source: S,
    watermark: Mutex<DateTime<Utc>>,
}

impl<S: SampleSource> PollingCollector<S> {
    /// First poll looks back `lookback` from now.
    pub fn new(name: impl Into<String>, source: S, lookback: Duration) -> Self {
        Self::starting_at(name, source, Utc::now() - lookback)
    }

    pub fn starting_at(name: impl Into<String>, source: S, watermark: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            source,
            watermark: Mutex::new(watermark),
        }
    }

    #[must_use]
    pub fn watermark(&self) -> DateTime<Utc> {
        *self.watermark.lock()
    }
}

#[async_trait]
impl<S: SampleSource> Collector for PollingCollector<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn collect(&self, queue: &dyn SampleQueue) -> Result<usize, CollectError> {
        let poll_start = Utc::now();
        let since = self.watermark();

        let samples = self.source.fetch_since(since).await?;
        queue.append_batch(&samples).await?;

        *self.watermark.lock() = poll_start;
        Ok(samples.len())
    }
}

type Gauge = dyn Fn() -> Option<f64> + Send + Sync;

/// Records one vital sample per cycle from an instantaneous gauge
/// (e.g. current ambient noise level).
pub struct InstantCollector {
    name: String,
    code: i64,
    gauge: Box<Gauge>,
}

impl InstantCollector {
    pub fn new<F>(name: impl Into<String>, code: i64, gauge: F) -> Self
    where
        F: Fn() -> Option<f64> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            code,
            gauge: Box::new(gauge),
        }
    }
}

#[async_trait]
impl Collector for InstantCollector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn collect(&self, queue: &dyn SampleQueue) -> Result<usize, CollectError> {
        let Some(value) = (self.gauge)() else {
            return Ok(0);
        };
        if !value.is_finite() {
            debug!(collector = %self.name, value, "Gauge reading not finite, skipped");
            return Ok(0);
        }
        queue.append(&Sample::vital(Utc::now(), self.code, value)).await?;
        Ok(1)
    }
}
