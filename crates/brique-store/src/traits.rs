//! Store trait: the abstract interface for record, peer and audit persistence.
//!
//! The store is deliberately dumb: it keeps whatever it is given. Signature
//! checks and merge decisions belong to the merge engine, which serializes
//! access per record id before calling `put_*`.

use async_trait::async_trait;
use brique_core::{
    Blake3Hash, Peer, PeerId, Product, Record, RecordId, SyncLogEntry, Tutorial,
};

use crate::error::Result;

/// Result of indexing a tutorial version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// The version was new.
    Inserted,
    /// A version with this hash is already indexed (idempotent, not an error).
    AlreadyExists,
}

/// Async interface for persistence.
///
/// For SQLite, operations run under `spawn_blocking` to keep the runtime free.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Products
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the stored (primary) copy of a product.
    async fn get_product(&self, id: &RecordId) -> Result<Option<Product>>;

    /// Insert or overwrite the primary copy of a product.
    async fn put_product(&self, product: &Product) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Tutorials
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the primary version of a tutorial.
    async fn get_tutorial(&self, id: &RecordId) -> Result<Option<Tutorial>>;

    /// Insert or overwrite the primary version of a tutorial.
    async fn put_tutorial(&self, tutorial: &Tutorial) -> Result<()>;

    /// Add a sealed version to the per-tutorial index, keyed by its hash.
    ///
    /// Versions are never removed from the index.
    async fn insert_tutorial_version(&self, tutorial: &Tutorial) -> Result<InsertResult>;

    /// Get an indexed version by content hash.
    async fn get_tutorial_version(&self, hash: &Blake3Hash) -> Result<Option<Tutorial>>;

    /// All indexed versions of a tutorial, ordered by generation then hash.
    async fn list_tutorial_versions(&self, id: &RecordId) -> Result<Vec<Tutorial>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Change sets (for sync)
    // ─────────────────────────────────────────────────────────────────────────

    /// Primary records with `updated_at > since`, oldest first.
    async fn changes_since(&self, since: i64) -> Result<Vec<Record>>;

    /// Number of primary records (products plus tutorials).
    async fn record_count(&self) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Peers
    // ─────────────────────────────────────────────────────────────────────────

    async fn get_peer(&self, id: &PeerId) -> Result<Option<Peer>>;

    /// Insert or replace a peer.
    async fn upsert_peer(&self, peer: &Peer) -> Result<()>;

    /// All peers, most recently seen first.
    async fn list_peers(&self) -> Result<Vec<Peer>>;

    /// Remove a peer. Returns false if it was not known.
    async fn remove_peer(&self, id: &PeerId) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Sync log
    // ─────────────────────────────────────────────────────────────────────────

    /// Append an audit entry.
    async fn append_sync_log(&self, entry: &SyncLogEntry) -> Result<()>;

    /// Newest entries first, optionally for one peer only.
    async fn sync_log(&self, peer: Option<&PeerId>, limit: usize) -> Result<Vec<SyncLogEntry>>;
}

/// Convenience queries built on [`Store`].
#[async_trait]
pub trait StoreExt: Store {
    /// Most recent completed sync with any peer.
    async fn last_sync(&self) -> Result<Option<i64>> {
        Ok(self
            .list_peers()
            .await?
            .iter()
            .filter_map(|p| p.last_sync)
            .max())
    }
}

impl<S: Store + ?Sized> StoreExt for S {}
