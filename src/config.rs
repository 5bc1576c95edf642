// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the telemetry pipeline.
//!
//! # Example
//!
//! ```
//! use telemetry_sync::SyncConfig;
//!
//! // Minimal config (uses defaults)
//! let config = SyncConfig::default();
//! assert_eq!(config.batch_limit, 100);
//! assert_eq!(config.flush_interval_secs, 15 * 60);
//!
//! // Full config
//! let config = SyncConfig {
//!     endpoint_url: "https://ingest.example.com/ingest".into(),
//!     api_key: "secret".into(),
//!     device_id: "A1B2-C3".into(),
//!     batch_limit: 250,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for the queue, uploader and scheduler.
///
/// All fields have defaults. Production use needs at least
/// `endpoint_url`, `api_key` and `device_id`.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Queue file (newline-delimited JSON)
    #[serde(default = "default_queue_path")]
    pub queue_path: String,

    /// Where undecodable queue records are kept. Unset drops them.
    #[serde(default)]
    pub quarantine_path: Option<String>,

    /// Ingestion endpoint (POST target)
    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: String,

    /// API key sent in `X-API-Key`. Empty omits the header.
    #[serde(default)]
    pub api_key: String,

    /// Device identity stamped on every envelope
    #[serde(default = "default_device_id")]
    pub device_id: String,

    /// Scheduled flush period
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    /// Max samples per delivery attempt
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,

    /// Per-request timeout for delivery
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Scheduled/app-foreground flushes run only while enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Pending flush requests the executor will buffer
    #[serde(default = "default_executor_queue_depth")]
    pub executor_queue_depth: usize,
}

fn default_queue_path() -> String { "./sensor_buffer.jsonl".to_string() }
fn default_endpoint_url() -> String { "http://localhost:8000/ingest".to_string() }
fn default_device_id() -> String { "unknown-device".to_string() }
fn default_flush_interval_secs() -> u64 { 15 * 60 }
fn default_batch_limit() -> usize { 100 }
fn default_request_timeout_ms() -> u64 { 30_000 }
fn default_enabled() -> bool { true }
fn default_executor_queue_depth() -> usize { 16 }

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            queue_path: default_queue_path(),
            quarantine_path: None,
            endpoint_url: default_endpoint_url(),
            api_key: String::new(),
            device_id: default_device_id(),
            flush_interval_secs: default_flush_interval_secs(),
            batch_limit: default_batch_limit(),
            request_timeout_ms: default_request_timeout_ms(),
            enabled: default_enabled(),
            executor_queue_depth: default_executor_queue_depth(),
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_limit == 0 {
            return Err(ConfigError::Invalid("batch_limit must be > 0".into()));
        }
        if self.flush_interval_secs == 0 {
            return Err(ConfigError::Invalid("flush_interval_secs must be > 0".into()));
        }
        if self.endpoint_url.trim().is_empty() {
            return Err(ConfigError::Invalid("endpoint_url is empty".into()));
        }
        if self.device_id.trim().is_empty() {
            return Err(ConfigError::Invalid("device_id is empty".into()));
        }
        if self.executor_queue_depth == 0 {
            return Err(ConfigError::Invalid("executor_queue_depth must be > 0".into()));
        }
        Ok(())
    }
}
