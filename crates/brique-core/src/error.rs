//! Error types for Brique core.

use thiserror::Error;

/// Errors raised by key handling, delegation and canonical encoding.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The secure random source could not produce key material.
    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    /// Delegation certificate is past its `valid_until` (unix seconds).
    #[error("delegation expired at {valid_until}, now {now}")]
    Expired { valid_until: u64, now: u64 },

    /// Certificate issuer does not match the key it was checked against.
    #[error("certificate issuer does not match verifying key")]
    IssuerMismatch,

    #[error("invalid delegation: {0}")]
    InvalidDelegation(String),

    #[error("unsupported schema version: {0}")]
    UnsupportedVersion(u64),

    /// A tutorial's stored `hash` disagrees with its content.
    #[error("content hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("no step at index {0}")]
    StepNotFound(u32),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("decoding error: {0}")]
    Decoding(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
