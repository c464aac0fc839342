//! Error types for the batch sender.
//!
//! Partial write failures are not errors: they are reported in the
//! [`tsbridge_core::BatchResult`] returned by a send. These variants cover
//! structurally invalid input and misuse of the sender lifecycle.

use std::time::Duration;

/// Sender error types
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SendError {
    /// Invalid call arguments or configuration
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The sender was aborted and accepts no more work
    #[error("Sender was aborted")]
    Aborted,

    /// The sender was shut down and accepts no more work
    #[error("Sender is closed")]
    Closed,

    /// The worker pool needs a Tokio runtime
    #[error("No Tokio runtime available: {0}")]
    Runtime(String),

    /// Workers did not exit within the join timeout and were aborted
    #[error("Workers did not stop within {0:?}")]
    JoinTimeout(Duration),
}

impl SendError {
    /// Create an invalid argument error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}
