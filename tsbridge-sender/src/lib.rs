//! tsbridge batch sender
//!
//! Writes in-memory point sequences to a remote time-series store through a
//! size-limited batch-write API. Points are split into fixed-size batches and
//! sent either one after the other or through a fixed pool of workers fed by
//! a bounded queue.
//!
//! # Example
//! ```no_run
//! use std::time::Duration;
//! use tsbridge_core::{BatchTransport, Point, Tags};
//! use tsbridge_sender::{BatchSender, SenderConfig};
//!
//! async fn ingest<T: BatchTransport>(transport: T) -> Result<(), tsbridge_sender::SendError> {
//!     let sender = BatchSender::new(SenderConfig::default(), transport)?;
//!     let points: Vec<Point> = (0..25).map(|t| Point::new(t, 1.0)).collect();
//!
//!     let result = sender
//!         .send("sys.cpu.user", &Tags::new(), points, 10, Duration::from_secs(5))
//!         .await?;
//!     println!("{} written, {} failed", result.success, result.failed);
//!
//!     sender.wait().await
//! }
//! ```

pub mod batcher;
pub mod error;

pub use batcher::{
    BatchSender, MetricsSnapshot, SenderConfig, SenderMetrics, SenderState, MAX_ATTEMPTS,
};
pub use error::SendError;
