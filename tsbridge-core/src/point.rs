//! Points and fixed-size write batches.

use std::num::NonZeroUsize;
use std::ops::Range;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// One `(timestamp, value)` sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub value: f64,
}

impl Point {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

impl From<(i64, f64)> for Point {
    fn from((timestamp, value): (i64, f64)) -> Self {
        Self { timestamp, value }
    }
}

/// An immutable window over a shared point sequence
///
/// Batches never copy points: every batch of one split shares the same
/// backing buffer and only records its own range. Cloning a batch is cheap,
/// which is what retries rely on.
#[derive(Debug, Clone)]
pub struct PointBatch {
    index: usize,
    source: Arc<[Point]>,
    range: Range<usize>,
}

impl PointBatch {
    /// Position of this batch in its split
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn points(&self) -> &[Point] {
        &self.source[self.range.clone()]
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// First and last timestamps of the batch
    pub fn time_bounds(&self) -> Option<(i64, i64)> {
        let points = self.points();
        Some((points.first()?.timestamp, points.last()?.timestamp))
    }
}

/// Split `points` into consecutive batches of at most `max_points_per_batch`
///
/// Batch order matches input order and only the last batch may be shorter.
/// An empty input yields no batches.
pub fn split_batches(points: impl Into<Arc<[Point]>>, max_points_per_batch: NonZeroUsize) -> Vec<PointBatch> {
    let source: Arc<[Point]> = points.into();
    let size = max_points_per_batch.get();
    let total = source.len();

    (0..total)
        .step_by(size)
        .enumerate()
        .map(|(index, start)| PointBatch {
            index,
            source: Arc::clone(&source),
            range: start..(start + size).min(total),
        })
        .collect()
}
