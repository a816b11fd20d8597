//! Known peers and their liveness.
//!
//! The registry owns every mutation of a [`Peer`]. Mutations are serialized
//! so a discovery sighting and a completed sync touching the same peer never
//! overwrite each other's fields.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::Mutex as AsyncMutex;

use brique_core::{Clock, Peer, PeerId, PeerStatus, SystemClock};
use brique_store::Store;

use crate::discovery::PeerSighting;
use crate::error::{Result, SyncError};

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// This instance's id; sightings of it are ignored.
    pub local_id: PeerId,
    /// A peer seen within this window is Online.
    pub online_window: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            local_id: PeerId::new("local"),
            online_window: Duration::from_secs(5 * 60),
        }
    }
}

/// Persistent set of known peers.
pub struct PeerRegistry<S: Store> {
    store: Arc<S>,
    config: RegistryConfig,
    clock: Arc<dyn Clock>,
    writes: AsyncMutex<()>,
    /// In-flight syncs per peer.
    syncing: Mutex<HashMap<PeerId, usize>>,
}

impl<S: Store> PeerRegistry<S> {
    pub fn new(store: Arc<S>, config: RegistryConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<S>, config: RegistryConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            config,
            clock,
            writes: AsyncMutex::new(()),
            syncing: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Add a peer, or refresh the name, address and `last_seen` of a known
    /// one. Trust and sync cursor of a known peer are kept.
    pub async fn add_peer(&self, id: PeerId, name: &str, address: &str) -> Result<Peer> {
        let _writes = self.writes.lock().await;
        let now = self.clock.now_millis();

        let peer = match self.store.get_peer(&id).await? {
            Some(mut peer) => {
                peer.name = name.to_owned();
                peer.address = address.to_owned();
                peer.last_seen = peer.last_seen.max(now);
                peer
            }
            None => {
                tracing::info!(peer = %id, address, "discovered new peer");
                Peer::new(id, name, address, now)
            }
        };
        self.store.upsert_peer(&peer).await?;
        Ok(peer)
    }

    /// Record a discovery sighting. Sightings of this instance are ignored.
    pub async fn observe(&self, sighting: PeerSighting) -> Result<Option<Peer>> {
        if sighting.peer_id == self.config.local_id {
            return Ok(None);
        }
        self.add_peer(sighting.peer_id, &sighting.display_name, &sighting.address)
            .await
            .map(Some)
    }

    /// Drain a sighting stream until it ends. Returns how many sightings
    /// were recorded; failed ones are logged and skipped.
    pub async fn absorb(&self, sightings: impl Stream<Item = PeerSighting>) -> usize {
        futures::pin_mut!(sightings);
        let mut recorded = 0;
        while let Some(sighting) = sightings.next().await {
            let peer_id = sighting.peer_id.clone();
            match self.observe(sighting).await {
                Ok(Some(_)) => recorded += 1,
                Ok(None) => {}
                Err(e) => tracing::warn!(peer = %peer_id, error = %e, "failed to record sighting"),
            }
        }
        recorded
    }

    /// All peers, most recently seen first.
    pub async fn peers(&self) -> Result<Vec<Peer>> {
        Ok(self.store.list_peers().await?)
    }

    pub async fn trusted_peers(&self) -> Result<Vec<Peer>> {
        let mut peers = self.peers().await?;
        peers.retain(|p| p.trusted);
        Ok(peers)
    }

    pub async fn peer(&self, id: &PeerId) -> Result<Option<Peer>> {
        Ok(self.store.get_peer(id).await?)
    }

    /// Set whether records pulled from this peer are sought automatically.
    pub async fn set_trust(&self, id: &PeerId, trusted: bool) -> Result<Peer> {
        self.update(id, |peer| peer.trusted = trusted).await
    }

    pub async fn remove_peer(&self, id: &PeerId) -> Result<bool> {
        let _writes = self.writes.lock().await;
        Ok(self.store.remove_peer(id).await?)
    }

    /// Mark a peer as just contacted, taking the name it announced.
    pub async fn touch(&self, id: &PeerId, name: &str) -> Result<Peer> {
        let now = self.clock.now_millis();
        self.update(id, |peer| {
            peer.name = name.to_owned();
            peer.last_seen = peer.last_seen.max(now);
        })
        .await
    }

    /// Advance the sync cursor after a completed sync.
    pub async fn record_sync(&self, id: &PeerId, at: i64) -> Result<Peer> {
        self.update(id, |peer| {
            peer.last_sync = Some(at);
            peer.last_seen = peer.last_seen.max(at);
        })
        .await
    }

    /// Current status of a peer.
    pub fn status(&self, peer: &Peer) -> PeerStatus {
        if self.is_syncing(&peer.id) {
            return PeerStatus::Syncing;
        }
        let window = i64::try_from(self.config.online_window.as_millis()).unwrap_or(i64::MAX);
        peer.liveness_at(self.clock.now_millis(), window)
    }

    pub fn is_syncing(&self, id: &PeerId) -> bool {
        self.syncing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Mark a peer as Syncing until every outstanding guard drops.
    pub fn begin_sync(&self, id: &PeerId) -> SyncingGuard<'_, S> {
        *self
            .syncing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id.clone())
            .or_insert(0) += 1;
        SyncingGuard {
            registry: self,
            id: id.clone(),
        }
    }

    async fn update(&self, id: &PeerId, f: impl FnOnce(&mut Peer)) -> Result<Peer> {
        let _writes = self.writes.lock().await;
        let mut peer = self
            .store
            .get_peer(id)
            .await?
            .ok_or_else(|| SyncError::PeerNotFound(id.clone()))?;
        f(&mut peer);
        self.store.upsert_peer(&peer).await?;
        Ok(peer)
    }
}

/// Keeps a peer in the Syncing state while alive.
pub struct SyncingGuard<'a, S: Store> {
    registry: &'a PeerRegistry<S>,
    id: PeerId,
}

impl<S: Store> Drop for SyncingGuard<'_, S> {
    fn drop(&mut self) {
        let mut syncing = self
            .registry
            .syncing
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = syncing.get_mut(&self.id) {
            *count -= 1;
            if *count == 0 {
                syncing.remove(&self.id);
            }
        }
    }
}
