//! Per-series metadata consumed by the chunk planner.
//!
//! The metadata store is external: the core only needs the point count and
//! the inclusive date range of a series. [`MetadataRecord`] is the raw shape
//! a store hands back (any field may be absent) and [`SeriesMetadata`] is the
//! validated form the planner works on.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{MetadataError, PlanError};

/// Metadata name holding the number of points of a series
pub const POINT_COUNT_KEY: &str = "qual_nb_points";

/// Metadata name holding the first timestamp (ms) of a series
pub const START_DATE_KEY: &str = "ikats_start_date";

/// Metadata name holding the last timestamp (ms) of a series
pub const END_DATE_KEY: &str = "ikats_end_date";

/// Raw metadata as returned by a store, before validation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub point_count: Option<i64>,
    pub start_timestamp: Option<i64>,
    pub end_timestamp: Option<i64>,
}

impl MetadataRecord {
    /// Build a fully populated record
    pub fn new(point_count: i64, start_timestamp: i64, end_timestamp: i64) -> Self {
        Self {
            point_count: Some(point_count),
            start_timestamp: Some(start_timestamp),
            end_timestamp: Some(end_timestamp),
        }
    }

    /// Build a record from `(name, value)` pairs as stored by the metadata API
    ///
    /// Unknown names are ignored. Values that are present but not integers
    /// are reported as [`MetadataError::InvalidValue`].
    pub fn from_entries<'a, I>(series: &str, entries: I) -> Result<Self, MetadataError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut record = Self::default();
        for (name, value) in entries {
            let slot = match name {
                POINT_COUNT_KEY => &mut record.point_count,
                START_DATE_KEY => &mut record.start_timestamp,
                END_DATE_KEY => &mut record.end_timestamp,
                _ => continue,
            };
            let parsed = value
                .trim()
                .parse::<i64>()
                .map_err(|e| MetadataError::invalid_value(series, name, e.to_string()))?;
            *slot = Some(parsed);
        }
        Ok(record)
    }

    /// Name of the first required field that is absent, if any
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.point_count.is_none() {
            Some(POINT_COUNT_KEY)
        } else if self.start_timestamp.is_none() {
            Some(START_DATE_KEY)
        } else if self.end_timestamp.is_none() {
            Some(END_DATE_KEY)
        } else {
            None
        }
    }
}

/// Validated metadata of one series
///
/// Invariants: `point_count > 0` and `start_timestamp < end_timestamp`.
/// Both timestamps are inclusive milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesMetadata {
    point_count: i64,
    start_timestamp: i64,
    end_timestamp: i64,
}

impl SeriesMetadata {
    /// Validate and build series metadata
    pub fn new(point_count: i64, start_timestamp: i64, end_timestamp: i64) -> Result<Self, PlanError> {
        if point_count <= 0 {
            return Err(PlanError::invalid(format!(
                "point count must be positive, got {}",
                point_count
            )));
        }
        if start_timestamp >= end_timestamp {
            return Err(PlanError::invalid(format!(
                "start timestamp {} must precede end timestamp {}",
                start_timestamp, end_timestamp
            )));
        }
        if end_timestamp.checked_sub(start_timestamp).is_none() {
            return Err(PlanError::invalid(format!(
                "span from {} to {} does not fit in i64 milliseconds",
                start_timestamp, end_timestamp
            )));
        }
        Ok(Self {
            point_count,
            start_timestamp,
            end_timestamp,
        })
    }

    pub fn point_count(&self) -> i64 {
        self.point_count
    }

    pub fn start_timestamp(&self) -> i64 {
        self.start_timestamp
    }

    pub fn end_timestamp(&self) -> i64 {
        self.end_timestamp
    }

    /// Span covered by the series, in milliseconds
    pub fn span(&self) -> i64 {
        self.end_timestamp.saturating_sub(self.start_timestamp)
    }
}

impl TryFrom<&MetadataRecord> for SeriesMetadata {
    type Error = PlanError;

    fn try_from(record: &MetadataRecord) -> Result<Self, Self::Error> {
        match (record.point_count, record.start_timestamp, record.end_timestamp) {
            (Some(count), Some(start), Some(end)) => Self::new(count, start, end),
            _ => Err(PlanError::missing(record.missing_field().unwrap_or_default())),
        }
    }
}

/// Source of per-series metadata
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Fetch the raw metadata record of a series
    ///
    /// Fails with [`MetadataError::NotFound`] when the series is unknown.
    async fn record(&self, series: &str) -> Result<MetadataRecord, MetadataError>;

    /// Fetch and validate the metadata of a series
    ///
    /// Fails with [`MetadataError::IncompleteMetadata`] when the point count
    /// or the date range is missing.
    async fn metadata(&self, series: &str) -> Result<SeriesMetadata, MetadataError> {
        let record = self.record(series).await?;
        if let Some(field) = record.missing_field() {
            return Err(MetadataError::incomplete(series, field));
        }
        SeriesMetadata::try_from(&record)
            .map_err(|e| MetadataError::invalid_value(series, "range", e.to_string()))
    }
}

/// Metadata provider backed by a map, for tests and offline planning
#[derive(Debug, Default)]
pub struct InMemoryMetadataProvider {
    records: RwLock<HashMap<String, MetadataRecord>>,
}

impl InMemoryMetadataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the record of a series
    pub fn insert(&self, series: impl Into<String>, record: MetadataRecord) {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.insert(series.into(), record);
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MetadataProvider for InMemoryMetadataProvider {
    async fn record(&self, series: &str) -> Result<MetadataRecord, MetadataError> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records
            .get(series)
            .cloned()
            .ok_or_else(|| MetadataError::not_found(series))
    }
}
