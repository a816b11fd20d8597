//! Error types for the node facade.

use brique_core::{CoreError, RecordId};
use brique_store::StoreError;
use brique_sync::SyncError;
use brique_trust::TrustError;
use thiserror::Error;

/// Errors that can occur during node operations.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Configuration could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The node's signing identity is not a device.
    #[error("node identity must be a device")]
    NotADevice,

    /// A local edit lost the merge to the copy already stored.
    #[error("stored copy of {id} outranks the edit signed at {signed_at}")]
    Superseded { id: RecordId, signed_at: i64 },

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("trust error: {0}")]
    Trust(#[from] TrustError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// A tracing subscriber is already installed.
    #[error("telemetry error: {0}")]
    Telemetry(String),
}

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;
