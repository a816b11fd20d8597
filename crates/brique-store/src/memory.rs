//! In-memory implementation of the Store trait.
//!
//! Same semantics as SQLite, no persistence. Used by tests and by nodes
//! configured without a database path.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use brique_core::{
    Blake3Hash, Peer, PeerId, Product, Record, RecordId, SyncLogEntry, Tutorial,
};

use crate::error::{Result, StoreError};
use crate::traits::{InsertResult, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    products: HashMap<RecordId, Product>,
    tutorials: HashMap<RecordId, Tutorial>,

    /// Version index: hash -> version.
    versions: HashMap<Blake3Hash, Tutorial>,
    /// tutorial id -> hashes of its versions.
    versions_by_tutorial: HashMap<RecordId, BTreeSet<Blake3Hash>>,

    peers: HashMap<PeerId, Peer>,

    /// Append-only, oldest first.
    sync_log: Vec<SyncLogEntry>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_product(&self, id: &RecordId) -> Result<Option<Product>> {
        Ok(self.inner.read().await.products.get(id).cloned())
    }

    async fn put_product(&self, product: &Product) -> Result<()> {
        self.inner
            .write()
            .await
            .products
            .insert(product.id, product.clone());
        Ok(())
    }

    async fn get_tutorial(&self, id: &RecordId) -> Result<Option<Tutorial>> {
        Ok(self.inner.read().await.tutorials.get(id).cloned())
    }

    async fn put_tutorial(&self, tutorial: &Tutorial) -> Result<()> {
        self.inner
            .write()
            .await
            .tutorials
            .insert(tutorial.id, tutorial.clone());
        Ok(())
    }

    async fn insert_tutorial_version(&self, tutorial: &Tutorial) -> Result<InsertResult> {
        let hash = tutorial
            .hash
            .ok_or_else(|| StoreError::InvalidData("tutorial version has no hash".into()))?;

        let mut inner = self.inner.write().await;
        if inner.versions.contains_key(&hash) {
            return Ok(InsertResult::AlreadyExists);
        }

        inner.versions.insert(hash, tutorial.clone());
        inner
            .versions_by_tutorial
            .entry(tutorial.id)
            .or_default()
            .insert(hash);
        Ok(InsertResult::Inserted)
    }

    async fn get_tutorial_version(&self, hash: &Blake3Hash) -> Result<Option<Tutorial>> {
        Ok(self.inner.read().await.versions.get(hash).cloned())
    }

    async fn list_tutorial_versions(&self, id: &RecordId) -> Result<Vec<Tutorial>> {
        let inner = self.inner.read().await;
        let mut versions: Vec<Tutorial> = inner
            .versions_by_tutorial
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|h| inner.versions.get(h).cloned())
            .collect();
        versions.sort_by(|a, b| (a.generation, a.hash).cmp(&(b.generation, b.hash)));
        Ok(versions)
    }

    async fn changes_since(&self, since: i64) -> Result<Vec<Record>> {
        let inner = self.inner.read().await;
        let mut changes: Vec<Record> = inner
            .products
            .values()
            .filter(|p| p.crdt_meta.updated_at > since)
            .cloned()
            .map(Record::Product)
            .chain(
                inner
                    .tutorials
                    .values()
                    .filter(|t| t.crdt_meta.updated_at > since)
                    .cloned()
                    .map(Record::Tutorial),
            )
            .collect();
        changes.sort_by_key(|r| (r.updated_at(), r.kind().to_u8(), r.id()));
        Ok(changes)
    }

    async fn record_count(&self) -> Result<u64> {
        let inner = self.inner.read().await;
        Ok((inner.products.len() + inner.tutorials.len()) as u64)
    }

    async fn get_peer(&self, id: &PeerId) -> Result<Option<Peer>> {
        Ok(self.inner.read().await.peers.get(id).cloned())
    }

    async fn upsert_peer(&self, peer: &Peer) -> Result<()> {
        self.inner
            .write()
            .await
            .peers
            .insert(peer.id.clone(), peer.clone());
        Ok(())
    }

    async fn list_peers(&self) -> Result<Vec<Peer>> {
        let inner = self.inner.read().await;
        let mut peers: Vec<Peer> = inner.peers.values().cloned().collect();
        peers.sort_by(|a, b| b.last_seen.cmp(&a.last_seen).then_with(|| a.id.cmp(&b.id)));
        Ok(peers)
    }

    async fn remove_peer(&self, id: &PeerId) -> Result<bool> {
        Ok(self.inner.write().await.peers.remove(id).is_some())
    }

    async fn append_sync_log(&self, entry: &SyncLogEntry) -> Result<()> {
        self.inner.write().await.sync_log.push(entry.clone());
        Ok(())
    }

    async fn sync_log(&self, peer: Option<&PeerId>, limit: usize) -> Result<Vec<SyncLogEntry>> {
        let inner = self.inner.read().await;
        let mut entries: Vec<SyncLogEntry> = inner
            .sync_log
            .iter()
            .rev()
            .filter(|e| peer.map_or(true, |p| &e.peer_id == p))
            .cloned()
            .collect();
        // Stable sort keeps newest-appended first among equal timestamps.
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(limit);
        Ok(entries)
    }
}
