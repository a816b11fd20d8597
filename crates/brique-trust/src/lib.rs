//! # Brique Trust
//!
//! Known-identity registry and the merge engine that decides which signed
//! records a node keeps.
//!
//! ## Overview
//!
//! Ingestion is a two-step gate:
//!
//! 1. **Verification**: the author must be known to the [`TrustStore`] and
//!    the signature must verify against its key. Tutorials must also carry a
//!    hash matching their content. Failures are errors and never touch state.
//! 2. **Merge**: a verified record replaces the stored copy only if it
//!    strictly outranks it. Losing is an [`IngestOutcome::Conflict`], which
//!    callers count rather than report.
//!
//! Read-decide-write runs under a per-record lock ([`KeyLocks`]), so
//! concurrent syncs with different peers cannot lose updates.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use brique_store::MemoryStore;
//! use brique_trust::{MergeEngine, TrustStore};
//!
//! async fn example(record: brique_core::Record) {
//!     let engine = MergeEngine::new(Arc::new(MemoryStore::new()), Arc::new(TrustStore::new()));
//!     let outcome = engine.ingest(record).await;
//! }
//! ```

pub mod error;
pub mod locks;
pub mod merge;
pub mod trust;

pub use error::{Result, TrustError};
pub use locks::{KeyGuard, KeyLocks};
pub use merge::{select_best_tutorial_version, IngestOutcome, MergeEngine};
pub use trust::TrustStore;
