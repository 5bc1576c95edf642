// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::traits::{check_finite, QueueError, SampleQueue};
use crate::sample::Sample;

/// Volatile FIFO with the same contract as the file queue.
pub struct InMemoryQueue {
    items: Mutex<VecDeque<Sample>>,
}

impl InMemoryQueue {
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Copy of the current contents, head first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Sample> {
        self.items.lock().iter().cloned().collect()
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SampleQueue for InMemoryQueue {
    async fn append_batch(&self, samples: &[Sample]) -> Result<(), QueueError> {
        if samples.is_empty() {
            return Ok(());
        }
        check_finite(samples)?;
        self.items.lock().extend(samples.iter().cloned());
        Ok(())
    }

    async fn drain(&self, limit: usize) -> Result<Vec<Sample>, QueueError> {
        let mut items = self.items.lock();
        let n = limit.min(items.len());
        Ok(items.drain(..n).collect())
    }

    async fn count(&self) -> Result<usize, QueueError> {
        Ok(self.items.lock().len())
    }

    async fn clear(&self) -> Result<(), QueueError> {
        self.items.lock().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(label: &str) -> Sample {
        Sample::event(Utc::now(), label)
    }

    #[tokio::test]
    async fn test_new_queue_is_empty() {
        let queue = InMemoryQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_drain_bounded_fifo() {
        let queue = InMemoryQueue::new();
        queue
            .append_batch(&[event("a"), event("b"), event("c")])
            .await
            .unwrap();

        let head = queue.drain(2).await.unwrap();
        assert_eq!(labels(&head), vec!["a", "b"]);
        assert_eq!(queue.len(), 1);

        let rest = queue.drain(2).await.unwrap();
        assert_eq!(labels(&rest), vec!["c"]);
        assert!(queue.drain(2).await.unwrap().is_empty());
    }

    fn labels(samples: &[Sample]) -> Vec<&str> {
        samples
            .iter()
            .filter_map(|s| match s {
                Sample::Event(e) => Some(e.label.as_str()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_single_append_goes_through_batch() {
        let queue = InMemoryQueue::new();
        queue.append(&event("x")).await.unwrap();
        assert_eq!(queue.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_non_finite_reading_refused() {
        let queue = InMemoryQueue::new();
        let now = Utc::now();

        let err = queue
            .append_batch(&[event("ok"), Sample::vital(now, 10, f64::INFINITY)])
            .await
            .unwrap_err();

        assert!(matches!(err, QueueError::InvalidSample { index: 1, field: "val" }));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_clear() {
        let queue = InMemoryQueue::default();
        queue.append_batch(&[event("a"), event("b")]).await.unwrap();

        queue.clear().await.unwrap();

        assert!(queue.is_empty());
        assert!(queue.drain(10).await.unwrap().is_empty());
    }
}
