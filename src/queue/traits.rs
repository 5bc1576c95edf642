// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use thiserror::Error;

use crate::sample::Sample;

/// Storage failure of a queue operation.
///
/// Callers treat this as "this cycle produced nothing" and retry on the next
/// schedule. It is never fatal to the process.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode sample: {0}")]
    Encode(#[from] serde_json::Error),
    /// Rejected before anything was written; the whole batch is refused.
    #[error("Sample {index} has a non-finite `{field}`")]
    InvalidSample { index: usize, field: &'static str },
}

/// Refuse a batch containing a value JSON cannot represent.
pub(crate) fn check_finite(samples: &[Sample]) -> Result<(), QueueError> {
    match samples
        .iter()
        .enumerate()
        .find_map(|(index, s)| s.non_finite_field().map(|field| (index, field)))
    {
        Some((index, field)) => Err(QueueError::InvalidSample { index, field }),
        None => Ok(()),
    }
}

/// FIFO of pending samples.
///
/// Implementations serialize all operations internally; callers never
/// coordinate access themselves.
#[async_trait]
pub trait SampleQueue: Send + Sync {
    /// Append one sample at the tail.
    async fn append(&self, sample: &Sample) -> Result<(), QueueError> {
        self.append_batch(std::slice::from_ref(sample)).await
    }

    /// Append samples at the tail, preserving their order. No-op when empty.
    ///
    /// All or nothing: a batch holding a NaN or infinite reading is refused
    /// with [`QueueError::InvalidSample`] and nothing is stored.
    async fn append_batch(&self, samples: &[Sample]) -> Result<(), QueueError>;

    /// Remove and return up to `limit` samples from the head, oldest first.
    async fn drain(&self, limit: usize) -> Result<Vec<Sample>, QueueError>;

    /// Number of records currently held.
    async fn count(&self) -> Result<usize, QueueError>;

    /// Discard every record. Irreversible.
    async fn clear(&self) -> Result<(), QueueError>;
}
