//! The "send one batch" capability injected into a batch sender.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::wire::{PutRequest, PutSummary};

/// Performs one write call against the remote store
///
/// A transport value is a session: the synchronous sender keeps one for its
/// whole lifetime and each concurrent worker opens its own through
/// [`BatchTransport::session`]. Sessions are never shared between workers.
#[async_trait]
pub trait BatchTransport: Send + Sync + 'static {
    /// Open a new session towards the same store
    fn session(&self) -> Self
    where
        Self: Sized;

    /// Send one encoded batch and return the store's summary
    ///
    /// A summary with `failed > 0` is a valid answer, not an error: the
    /// caller decides whether to retry.
    async fn put(&self, request: &PutRequest) -> Result<PutSummary, TransportError>;
}
