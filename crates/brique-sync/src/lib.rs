//! # Brique Sync
//!
//! Peer bookkeeping and pull-based synchronization.
//!
//! ## Overview
//!
//! - [`PeerRegistry`] keeps the known peers, absorbs discovery sightings and
//!   derives each peer's Online / Offline / Syncing status.
//! - [`SyncOrchestrator`] pulls a peer's changes since the local cursor,
//!   merges them through the [`MergeEngine`](brique_trust::MergeEngine),
//!   tallies conflicts and rejections, and writes one audit entry per attempt.
//! - [`PeerTransport`] and [`ChangeSource`] are the seams to the outside
//!   world. [`MemoryNetwork`] wires orchestrators together in-process.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use brique_core::PeerId;
//! use brique_store::MemoryStore;
//! use brique_sync::{MemoryTransport, SyncOrchestrator};
//!
//! async fn example(orchestrator: &SyncOrchestrator<MemoryStore>, transport: &MemoryTransport) {
//!     let result = orchestrator.pull_from_peer(&PeerId::new("bench-2"), transport).await;
//!     if let Ok(result) = result {
//!         println!("{} received, {} conflicts", result.items_received, result.conflicts);
//!     }
//! }
//! ```
//!
//! ## Message Flow
//!
//! ```text
//! Node A                              Node B
//!   |-------- Info ------------------->|
//!   |<------- PeerInfo ----------------|
//!   |-------- ChangesSince(cursor) --->|
//!   |<------- Changes { more: true } --|
//!   |-------- ChangesSince(after) ---->|
//!   |<------- Changes { more: false } -|
//!   merge, advance cursor, audit
//! ```

pub mod discovery;
pub mod error;
pub mod messages;
pub mod orchestrator;
pub mod registry;
pub mod transport;

pub use discovery::{sighting_channel, PeerSighting, SightingSender, SightingStream};
pub use error::{Result, SyncError, TransportError};
pub use messages::{
    limits, ChangeCursor, ChangePage, PeerInfo, SyncRequest, SyncResponse, PROTOCOL_VERSION,
};
pub use orchestrator::{SyncConfig, SyncOrchestrator, SyncResult};
pub use registry::{PeerRegistry, RegistryConfig, SyncingGuard};
pub use transport::{memory::MemoryNetwork, memory::MemoryTransport, ChangeSource, PeerTransport};
