// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Batch delivery to the ingestion endpoint.
//!
//! One call to [`Uploader::send`] is one delivery attempt: the batch is
//! wrapped in an [`Envelope`] and POSTed once. There is no retry here; the
//! scheduler requeues the batch and tries again on a later cycle.
//!
//! Every failure mode (encode error, timeout, connection error, non-2xx)
//! collapses to `false`, so the caller has a single failure path.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::sample::{Envelope, Sample};

/// Header carrying the ingestion API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Why a delivery attempt failed. Internal to the uploader; callers only see `bool`.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Ingestion endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
}

impl UploadError {
    /// Short label for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Encode(_) => "encode",
            Self::Transport(e) if e.is_timeout() => "timeout",
            Self::Transport(_) => "transport",
            Self::Status { .. } => "status",
        }
    }
}

/// One delivery attempt for a bounded batch.
///
/// Implementations hold no state between calls.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Deliver `samples` for `device_id`. An empty batch succeeds without I/O.
    async fn send(&self, device_id: &str, samples: &[Sample]) -> bool;
}

/// POSTs one JSON envelope per batch.
pub struct HttpUploader {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpUploader {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self, UploadError> {
        Self::new(
            config.endpoint_url.clone(),
            config.api_key.clone(),
            config.request_timeout(),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Single attempt with the failure reason preserved.
    pub async fn try_send(&self, device_id: &str, samples: &[Sample]) -> Result<(), UploadError> {
        let body = Envelope::new(device_id, samples).to_json_bytes()?;
        let bytes = body.len();

        let mut request = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if !self.api_key.is_empty() {
            request = request.header(API_KEY_HEADER, self.api_key.as_str());
        }

        debug!(endpoint = %self.endpoint, count = samples.len(), bytes, "Posting envelope");
        crate::metrics::record_upload_bytes(bytes);

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(UploadError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn send(&self, device_id: &str, samples: &[Sample]) -> bool {
        if samples.is_empty() {
            return true;
        }

        let start = Instant::now();
        let result = self.try_send(device_id, samples).await;
        crate::metrics::record_upload_latency(start.elapsed());

        match result {
            Ok(()) => {
                info!(count = samples.len(), elapsed_ms = start.elapsed().as_millis() as u64, "Batch delivered");
                crate::metrics::record_upload("success");
                true
            }
            Err(e) => {
                warn!(error = %e, kind = e.kind(), count = samples.len(), "Batch delivery failed");
                crate::metrics::record_upload(e.kind());
                false
            }
        }
    }
}
