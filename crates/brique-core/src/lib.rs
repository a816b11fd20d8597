//! # Brique Core
//!
//! Pure primitives for Brique, an offline-first repair-documentation network:
//! identities, delegation certificates, canonical encoding and signed records.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Identity`] - A Human or Device keypair; its id is `blake3(public_key)`
//! - [`DelegationCertificate`] - A Human's signed authorization of a Device
//! - [`SignedRecord`] - Signing contract shared by [`Product`] and [`Tutorial`]
//! - [`Record`] - Any record carried in a sync batch
//! - [`Peer`], [`SyncLogEntry`] - Values persisted by the peer registry
//!
//! ## Canonicalization
//!
//! Records are signed over deterministic CBOR with frozen integer field tags.
//! See the [`canonical`] module. Delegation certificates use a fixed binary
//! layout described in [`delegation`].

pub mod canonical;
pub mod crypto;
pub mod delegation;
pub mod error;
pub mod identity;
pub mod peer;
pub mod product;
pub mod record;
pub mod time;
pub mod tutorial;
pub mod types;

pub use canonical::RECORD_SCHEMA_VERSION;
pub use crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair};
pub use delegation::{
    check_delegation_at, issue_delegation, issue_delegation_at, verify_delegation,
    verify_delegation_at, DelegationCertificate, DEFAULT_PERMISSIONS, DELEGATION_SCHEMA_VERSION,
};
pub use error::{CoreError, Result};
pub use identity::{generate_identity, Identity, IdentityKind, PublicIdentity};
pub use peer::{Peer, PeerId, PeerStatus, SyncLogEntry};
pub use product::{product_id, Product, ProductData};
pub use record::{CrdtMeta, Record, RecordKind, SignedRecord};
pub use time::{now_millis, now_secs, Clock, ManualClock, SystemClock};
pub use tutorial::{tutorial_id, ToolRequirement, Tutorial, TutorialStep};
pub use types::{IdentityId, RecordId};
