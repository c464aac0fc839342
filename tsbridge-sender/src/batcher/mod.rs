//! Batch sending with bounded concurrency, retry and backpressure.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              send(metric, tags, points, ...)             │
//! └───────────────────────────┬─────────────────────────────┘
//!                             │ split_batches
//!              ┌──────────────┴──────────────┐
//!              │ worker_count <= 1           │ worker_count > 1
//!     ┌────────▼────────┐           ┌────────▼────────┐
//!     │  one session,   │           │   WorkQueue     │ ← blocking put
//!     │  batch by batch │           │ (queue_capacity)│   (backpressure)
//!     └────────┬────────┘           └────────┬────────┘
//!              │                    ┌────────▼────────┐
//!              │                    │  worker pool    │ ← one session
//!              │                    │ (min(workers,   │   per worker
//!              │                    │  parallelism))  │
//!              │                    └────────┬────────┘
//!              └──────────────┬──────────────┘
//!                    ┌────────▼────────┐
//!                    │ up to 3 attempts│ ← stop once failed == 0
//!                    └────────┬────────┘
//!                    ┌────────▼────────┐
//!                    │  BatchResult    │ ← merged per call
//!                    └─────────────────┘
//! ```
//!
//! # Features
//!
//! - **Backpressure**: a full queue suspends the producer
//! - **Retry**: every batch gets up to [`MAX_ATTEMPTS`] write requests
//! - **Cooperative abort**: in-flight writes finish, queued ones are reported as failed
//! - **Panic isolation**: a panicking send fails its batch, not its worker
//! - **Metrics**: queue depth, attempts, retries, throughput

mod attempt;
mod config;
mod metrics;
mod queue;
mod sender;
mod worker;

#[cfg(test)]
mod sender_tests;

pub use attempt::{send_batch, MAX_ATTEMPTS};
pub use config::SenderConfig;
pub use metrics::{MetricsSnapshot, SenderMetrics};
pub use queue::{QueueError, WorkItem, WorkQueue};
pub use sender::{BatchSender, SenderState};
