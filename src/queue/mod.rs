// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Durable sample queue.
//!
//! - [`JsonlQueue`]: newline-delimited JSON file, crash-safe rewrite on drain
//! - [`InMemoryQueue`]: volatile FIFO for tests and ephemeral pipelines

pub mod file;
pub mod memory;
pub mod traits;

pub use file::{JsonlQueue, QueueStats};
pub use memory::InMemoryQueue;
pub use traits::{QueueError, SampleQueue};
