//! Error types for the tsbridge core library
//!
//! This module provides structured error types using `thiserror` for
//! type-safe error handling across the workspace.
//!
//! # Error Hierarchy
//!
//! ```text
//! PlanError       - Chunk planning (bad chunk size, incomplete metadata)
//! MetadataError   - Metadata lookups (unknown series, missing fields)
//! TransportError  - One batch write call (timeout, connection, status)
//! ```
//!
//! # Usage
//!
//! Library code should use the specific error types:
//!
//! ```rust,ignore
//! use tsbridge_core::error::PlanError;
//!
//! fn plan(meta: &SeriesMetadata) -> Result<Vec<ChunkDescriptor>, PlanError> {
//!     // ...
//! }
//! ```
//!
//! Application code should use `anyhow` with context:
//!
//! ```rust,ignore
//! use anyhow::Context;
//!
//! let chunks = planner.all_chunks(&meta)
//!     .context("Failed to plan read chunks")?;
//! ```

use thiserror::Error;

/// Errors that can occur while planning read chunks
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    /// A caller-supplied argument is out of range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A metadata field required for planning is absent
    #[error("Metadata field '{0}' is missing")]
    MetadataMissing(String),
}

impl PlanError {
    /// Create an invalid argument error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a missing metadata error
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MetadataMissing(field.into())
    }
}

/// Errors returned by a metadata provider
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetadataError {
    /// The series identifier is unknown to the provider
    #[error("Series '{0}' not found")]
    NotFound(String),

    /// The point count or date range is missing for the series
    #[error("Metadata for series '{series}' is incomplete: missing {field}")]
    IncompleteMetadata { series: String, field: String },

    /// A metadata value exists but could not be interpreted
    #[error("Metadata '{field}' for series '{series}' is invalid: {message}")]
    InvalidValue {
        series: String,
        field: String,
        message: String,
    },

    /// The metadata store could not be reached
    #[error("Metadata store unavailable: {0}")]
    Transport(String),
}

impl MetadataError {
    /// Create a not found error
    pub fn not_found(series: impl Into<String>) -> Self {
        Self::NotFound(series.into())
    }

    /// Create an incomplete metadata error
    pub fn incomplete(series: impl Into<String>, field: impl Into<String>) -> Self {
        Self::IncompleteMetadata {
            series: series.into(),
            field: field.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value(
        series: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            series: series.into(),
            field: field.into(),
            message: msg.into(),
        }
    }
}

/// Errors raised by a single batch write call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The request did not complete within its timeout
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    /// The destination could not be reached
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The destination answered with an unexpected status
    #[error("Destination returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The request body could not be encoded
    #[error("Failed to encode request: {0}")]
    Encode(String),
}

impl TransportError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a status error
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Whether this error counts as a timeout in a [`crate::BatchResult`]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
