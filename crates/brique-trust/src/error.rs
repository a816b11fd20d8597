//! Error types for trust and merge operations.

use brique_core::{CoreError, IdentityId, RecordId};
use brique_store::StoreError;
use thiserror::Error;

/// Errors that can occur while registering identities or ingesting records.
///
/// A record that loses the merge is not an error; see
/// [`IngestOutcome::Conflict`](crate::IngestOutcome::Conflict).
#[derive(Debug, Error)]
pub enum TrustError {
    /// The record's author is not a known identity.
    #[error("unknown author: {0}")]
    UnknownAuthor(IdentityId),

    /// The record signature does not verify against its author's key.
    #[error("invalid signature")]
    InvalidSignature,

    /// A tutorial's hash does not describe its content.
    #[error("tutorial hash mismatch: {0}")]
    HashMismatch(String),

    /// A product's id is not derived from its category, manufacturer and name.
    #[error("product id {0} does not match its content")]
    IdMismatch(RecordId),

    /// The delegation issuer is not a known identity.
    #[error("unknown delegation issuer: {0}")]
    UnknownIssuer(IdentityId),

    /// The delegation certificate was rejected.
    #[error("delegation rejected: {0}")]
    Delegation(#[source] CoreError),

    /// The certificate names a different device.
    #[error("certificate subject does not match device")]
    SubjectMismatch,

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for trust operations.
pub type Result<T> = std::result::Result<T, TrustError>;
