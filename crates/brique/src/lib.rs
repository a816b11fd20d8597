//! # Brique
//!
//! An offline-first, peer-to-peer network for repair documentation.
//!
//! ## Overview
//!
//! Workshops, repair cafés and individual fixers each run a node. Nodes
//! exchange signed records directly, without a central server:
//!
//! - **Products**: What can be repaired, identified by category, manufacturer and name
//! - **Tutorials**: Step-by-step guides with multilingual text and a version history
//! - **Delegation**: A person's root key authorizes the devices that sign for them
//! - **Sync**: Pull-based exchange of changes with known peers
//!
//! ## Key Concepts
//!
//! - **Signed record**: Every write is signed by a device over canonical CBOR.
//! - **Last-writer-wins**: The newest version of a record is its primary one;
//!   ties prefer trusted authors.
//! - **Versions are kept**: Every tutorial version ever received stays stored.
//! - **Trust is local**: Each node decides which roots and peers it trusts.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use brique::{Node, NodeConfig};
//! use brique::core::{generate_identity, IdentityKind, Product};
//!
//! async fn example() -> brique::Result<()> {
//!     let device = generate_identity(IdentityKind::Device)?;
//!     let node = Node::open(NodeConfig::load("brique.toml")?, device).await?;
//!
//!     let product = node
//!         .publish_product(Product::new("phone", "Fairphone", "FP4"))
//!         .await?;
//!
//!     let mut tutorial = node.new_tutorial(product.id);
//!     tutorial.set_title("en", "Replace Battery");
//!     tutorial.add_step(None, "en", "Remove the back cover");
//!     node.publish_tutorial(tutorial).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `brique::core` - Identities, delegation and signed records
//! - `brique::store` - Storage abstraction, in-memory and SQLite
//! - `brique::trust` - Trust store and merge engine
//! - `brique::sync` - Peer registry, sync messages and orchestration

pub mod config;
pub mod error;
pub mod node;
pub mod telemetry;

// Re-export component crates
pub use brique_core as core;
pub use brique_store as store;
pub use brique_sync as sync;
pub use brique_trust as trust;

// Re-export main types for convenience
pub use config::{DelegationSection, NodeConfig, SyncSection};
pub use error::{NodeError, Result};
pub use node::Node;
pub use telemetry::init_tracing;

// Re-export commonly used types
pub use brique_core::{
    DelegationCertificate, Identity, IdentityId, IdentityKind, PeerId, Product, PublicIdentity,
    Record, RecordId, SignedRecord, Tutorial,
};
pub use brique_sync::{MemoryNetwork, PeerInfo, SyncResult};
pub use brique_trust::IngestOutcome;
