//! Error types for the sync module.

use std::time::Duration;

use brique_core::PeerId;
use thiserror::Error;

/// Failures reported by a transport collaborator.
///
/// These are surfaced unchanged; the orchestrator never retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Nothing answered at the address.
    #[error("peer unreachable: {0}")]
    Unreachable(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The peer answered with something that could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The peer reported an error while serving the request.
    #[error("remote error: {0}")]
    Remote(String),
}

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("peer not found: {0}")]
    PeerNotFound(PeerId),

    /// Transport-level error; aborts the whole sync attempt.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] brique_store::StoreError),

    #[error("trust error: {0}")]
    Trust(#[from] brique_trust::TrustError),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
