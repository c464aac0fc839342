//! Range chunk planner
//!
//! Splits the date span of a series into sub-ranges holding roughly
//! `chunk_size` points each, so that reads can be fanned out without
//! fetching the data first.
//!
//! The duration of a chunk is extrapolated from the point density of the
//! whole series:
//!
//! ```text
//! delta   = floor((end - start) * chunk_size / point_count)
//! start_i = start + i * delta
//! end_i   = start_i + delta        (snapped to `end` on the final chunk)
//! ```
//!
//! Integer division drifts, so the final chunk absorbs whatever is left up
//! to the true end of the series and no trailing point is dropped.
//!
//! # Example
//!
//! ```rust
//! use tsbridge_core::planner::RangeChunkPlanner;
//! use tsbridge_core::SeriesMetadata;
//!
//! let meta = SeriesMetadata::new(100, 0, 1000).unwrap();
//! let planner = RangeChunkPlanner::new(30).unwrap();
//!
//! let chunks = planner.all_chunks(&meta);
//! assert_eq!(chunks.len(), 4);
//! assert_eq!((chunks[3].start_timestamp, chunks[3].end_timestamp), (900, 1000));
//! ```

use serde::{Deserialize, Serialize};

use crate::error::PlanError;
use crate::metadata::{MetadataRecord, SeriesMetadata};

/// One contiguous timestamp sub-range of a series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDescriptor {
    /// 0-based position of the chunk in the plan
    pub index: u64,
    pub start_timestamp: i64,
    pub end_timestamp: i64,
}

impl ChunkDescriptor {
    /// Duration covered by the chunk, in milliseconds
    pub fn span(&self) -> i64 {
        self.end_timestamp.saturating_sub(self.start_timestamp)
    }
}

/// Plans read chunks of a fixed point budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeChunkPlanner {
    chunk_size: u64,
}

impl RangeChunkPlanner {
    /// Create a planner targeting `chunk_size` points per chunk
    pub fn new(chunk_size: i64) -> Result<Self, PlanError> {
        if chunk_size <= 0 {
            return Err(PlanError::invalid(format!(
                "chunk size must be positive, got {}",
                chunk_size
            )));
        }
        Ok(Self {
            chunk_size: chunk_size as u64,
        })
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Number of chunks: `ceil(point_count / chunk_size)`
    pub fn chunk_count(&self, metadata: &SeriesMetadata) -> u64 {
        (metadata.point_count() as u64).div_ceil(self.chunk_size)
    }

    /// Extrapolated duration of one chunk, in milliseconds
    ///
    /// Saturates at `i64::MAX` when a chunk is far wider than the series,
    /// which only happens on single-chunk plans.
    pub fn delta(&self, metadata: &SeriesMetadata) -> i64 {
        let scaled = metadata.span() as i128 * self.chunk_size as i128;
        // both operands are positive, so truncation is a floor
        i64::try_from(scaled / metadata.point_count() as i128).unwrap_or(i64::MAX)
    }

    /// Descriptor of the chunk at `index`
    pub fn chunk(&self, metadata: &SeriesMetadata, index: u64) -> Result<ChunkDescriptor, PlanError> {
        let count = self.chunk_count(metadata);
        if index >= count {
            return Err(PlanError::invalid(format!(
                "chunk index {} out of range (chunk count is {})",
                index, count
            )));
        }
        Ok(self.descriptor(metadata, index, count, self.delta(metadata)))
    }

    /// Every chunk of the plan, in ascending index order
    pub fn all_chunks(&self, metadata: &SeriesMetadata) -> Vec<ChunkDescriptor> {
        let count = self.chunk_count(metadata);
        let delta = self.delta(metadata);
        (0..count)
            .map(|index| self.descriptor(metadata, index, count, delta))
            .collect()
    }

    /// Bounds of chunk `index`; only the final chunk is snapped to the
    /// series end, instead of snapping any chunk where `end + delta`
    /// would pass it
    fn descriptor(&self, metadata: &SeriesMetadata, index: u64, count: u64, delta: i64) -> ChunkDescriptor {
        // (count - 1) * delta never exceeds the span, so only the final
        // chunk can overshoot or fall short of the series end
        let offset = index as i128 * delta as i128;
        let start = i64::try_from(metadata.start_timestamp() as i128 + offset)
            .unwrap_or(metadata.end_timestamp());
        let end = if index + 1 == count {
            metadata.end_timestamp()
        } else {
            start.saturating_add(delta)
        };

        ChunkDescriptor {
            index,
            start_timestamp: start,
            end_timestamp: end,
        }
    }
}

/// `ceil(point_count / chunk_size)` for a raw metadata record
pub fn chunk_count(record: &MetadataRecord, chunk_size: i64) -> Result<u64, PlanError> {
    let planner = RangeChunkPlanner::new(chunk_size)?;
    Ok(planner.chunk_count(&SeriesMetadata::try_from(record)?))
}

/// Descriptor of chunk `index` for a raw metadata record
pub fn chunk(record: &MetadataRecord, index: u64, chunk_size: i64) -> Result<ChunkDescriptor, PlanError> {
    let planner = RangeChunkPlanner::new(chunk_size)?;
    planner.chunk(&SeriesMetadata::try_from(record)?, index)
}

/// All chunk descriptors for a raw metadata record
pub fn all_chunks(record: &MetadataRecord, chunk_size: i64) -> Result<Vec<ChunkDescriptor>, PlanError> {
    let planner = RangeChunkPlanner::new(chunk_size)?;
    Ok(planner.all_chunks(&SeriesMetadata::try_from(record)?))
}
