//! Pull-based sync with peers.
//!
//! A sync fetches a peer's change set since the local cursor for that peer,
//! page by page, merges every record through the [`MergeEngine`], advances the cursor to
//! the local wall clock and appends an audit entry.
//!
//! This is a pull: nothing is pushed to the peer. Two nodes converge when
//! each pulls from the other. `items_sent` reports how many local records
//! the peer would receive if it pulled with the same cursor.
//!
//! The cursor is `now`, not the newest timestamp applied. A peer whose clock
//! runs behind ours can sign records that fall below a cursor we already
//! advanced past; such records arrive only once they are edited again.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;

use brique_core::{Clock, PeerId, Record, SyncLogEntry, SystemClock};
use brique_store::{Store, StoreExt};
use brique_trust::{IngestOutcome, MergeEngine, TrustError};

use crate::error::{Result, SyncError, TransportError};
use crate::messages::{limits, ChangeCursor, ChangePage, PeerInfo};
use crate::registry::PeerRegistry;
use crate::transport::{ChangeSource, PeerTransport};

/// Configuration for sync behavior.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Announced to peers as `instance_id`.
    pub instance_id: PeerId,
    pub instance_name: String,
    /// Bound on each transport request.
    pub transport_timeout: Duration,
    /// Records asked for per page of changes.
    pub page_size: usize,
    /// Default page size for history queries.
    pub history_limit: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            instance_id: PeerId::new("local"),
            instance_name: "brique-node".into(),
            transport_timeout: Duration::from_secs(30),
            page_size: limits::MAX_RECORDS_PER_RESPONSE,
            history_limit: 50,
        }
    }
}

/// Tally of one sync attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncResult {
    /// Records in the incoming batch.
    pub items_received: u64,
    /// Local records changed since the peer's cursor.
    pub items_sent: u64,
    /// Verified records that lost the merge.
    pub conflicts: u64,
    /// Records that failed verification.
    pub rejected: u64,
    pub duration: Duration,
}

/// Drives sync with peers.
pub struct SyncOrchestrator<S: Store> {
    config: SyncConfig,
    store: Arc<S>,
    engine: Arc<MergeEngine<S>>,
    registry: Arc<PeerRegistry<S>>,
    clock: Arc<dyn Clock>,
}

impl<S: Store> SyncOrchestrator<S> {
    pub fn new(
        config: SyncConfig,
        engine: Arc<MergeEngine<S>>,
        registry: Arc<PeerRegistry<S>>,
    ) -> Self {
        Self::with_clock(config, engine, registry, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: SyncConfig,
        engine: Arc<MergeEngine<S>>,
        registry: Arc<PeerRegistry<S>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            store: Arc::clone(engine.store()),
            engine,
            registry,
            clock,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<PeerRegistry<S>> {
        &self.registry
    }

    pub fn engine(&self) -> &Arc<MergeEngine<S>> {
        &self.engine
    }

    /// Merge a batch received from `peer_id`.
    ///
    /// Records failing verification are counted as rejected and skipped; the
    /// rest of the batch still applies. The peer's cursor advances whatever
    /// the per-record outcomes.
    pub async fn sync_with_peer(&self, peer_id: &PeerId, batch: Vec<Record>) -> Result<SyncResult> {
        let peer = self
            .registry
            .peer(peer_id)
            .await?
            .ok_or_else(|| SyncError::PeerNotFound(peer_id.clone()))?;

        let _syncing = self.registry.begin_sync(peer_id);
        let started = Instant::now();

        match self.apply_batch(peer_id, peer.sync_cursor(), batch, started).await {
            Ok(result) => {
                tracing::info!(
                    peer = %peer_id,
                    received = result.items_received,
                    sent = result.items_sent,
                    conflicts = result.conflicts,
                    rejected = result.rejected,
                    "sync complete"
                );
                self.append_log(peer_id, &result, None).await;
                Ok(result)
            }
            Err(e) => {
                let result = SyncResult {
                    duration: started.elapsed(),
                    ..SyncResult::default()
                };
                self.append_log(peer_id, &result, Some(e.to_string())).await;
                Err(e)
            }
        }
    }

    async fn apply_batch(
        &self,
        peer_id: &PeerId,
        since: i64,
        batch: Vec<Record>,
        started: Instant,
    ) -> Result<SyncResult> {
        let local_changes = self.store.changes_since(since).await?;

        let mut result = SyncResult {
            items_received: batch.len() as u64,
            items_sent: local_changes.len() as u64,
            ..SyncResult::default()
        };

        for record in batch {
            let id = record.id();
            match self.engine.ingest(record).await {
                Ok(IngestOutcome::Conflict) => result.conflicts += 1,
                Ok(_) => {}
                Err(TrustError::Store(e)) => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(peer = %peer_id, record = %id, error = %e, "rejected record");
                    result.rejected += 1;
                }
            }
        }

        self.registry
            .record_sync(peer_id, self.clock.now_millis())
            .await?;
        result.duration = started.elapsed();
        Ok(result)
    }

    /// Fetch a peer's changes through `transport` and merge them.
    ///
    /// Every page is fetched before anything is merged, so the batch is
    /// applied and logged once and the cursor only moves after the whole
    /// change set arrived. Transport failures abort the attempt, are written to the audit log
    /// and returned unchanged. Nothing is retried.
    pub async fn pull_from_peer<T>(&self, peer_id: &PeerId, transport: &T) -> Result<SyncResult>
    where
        T: PeerTransport + ?Sized,
    {
        let peer = self
            .registry
            .peer(peer_id)
            .await?
            .ok_or_else(|| SyncError::PeerNotFound(peer_id.clone()))?;

        let started = Instant::now();
        let fetched = {
            let _syncing = self.registry.begin_sync(peer_id);
            self.fetch(&peer.id, &peer.address, peer.sync_cursor(), transport)
                .await
        };

        match fetched {
            Ok(batch) => self.sync_with_peer(peer_id, batch).await,
            Err(e) => {
                tracing::warn!(peer = %peer_id, address = %peer.address, error = %e, "pull failed");
                let result = SyncResult {
                    duration: started.elapsed(),
                    ..SyncResult::default()
                };
                self.append_log(peer_id, &result, Some(e.to_string())).await;
                Err(e)
            }
        }
    }

    async fn fetch<T>(&self, peer_id: &PeerId, address: &str, since: i64, transport: &T) -> Result<Vec<Record>>
    where
        T: PeerTransport + ?Sized,
    {
        let timeout = self.config.transport_timeout;

        let info = tokio::time::timeout(timeout, transport.info(address))
            .await
            .map_err(|_| TransportError::Timeout(timeout))??;
        if &info.instance_id != peer_id {
            return Err(TransportError::Malformed(format!(
                "{} answered as {}",
                address, info.instance_id
            ))
            .into());
        }
        self.registry.touch(peer_id, &info.instance_name).await?;

        let mut batch = Vec::new();
        let mut after: Option<ChangeCursor> = None;
        loop {
            let page = tokio::time::timeout(
                timeout,
                transport.changes_page(address, since, after, self.config.page_size),
            )
            .await
            .map_err(|_| TransportError::Timeout(timeout))??;

            let more = page.more;
            let next = page.next_cursor();
            if more && next.map_or(true, |next| after.map_or(false, |prev| next <= prev)) {
                return Err(TransportError::Malformed(format!(
                    "{} sent a page that does not advance",
                    address
                ))
                .into());
            }
            tracing::debug!(peer = %peer_id, records = page.records.len(), more, "fetched page");
            batch.extend(page.records);
            if !more {
                return Ok(batch);
            }
            after = next;
        }
    }

    /// Pull from every trusted peer concurrently.
    pub async fn pull_from_trusted_peers<T>(&self, transport: &T) -> Result<Vec<(PeerId, Result<SyncResult>)>>
    where
        T: PeerTransport + ?Sized,
    {
        let peers = self.registry.trusted_peers().await?;
        let pulls = peers.into_iter().map(|peer| async move {
            let result = self.pull_from_peer(&peer.id, transport).await;
            (peer.id, result)
        });
        Ok(join_all(pulls).await)
    }

    /// Audit entries for one peer, newest first.
    pub async fn sync_history(&self, peer_id: &PeerId, limit: usize) -> Result<Vec<SyncLogEntry>> {
        Ok(self.store.sync_log(Some(peer_id), limit).await?)
    }

    /// Audit entries for all peers, newest first.
    pub async fn recent_sync_history(&self, limit: usize) -> Result<Vec<SyncLogEntry>> {
        Ok(self.store.sync_log(None, limit).await?)
    }

    /// What this instance announces to peers.
    pub async fn local_info(&self) -> Result<PeerInfo> {
        Ok(PeerInfo {
            instance_id: self.config.instance_id.clone(),
            instance_name: self.config.instance_name.clone(),
            last_sync: self.store.last_sync().await?,
            item_count: self.store.record_count().await?,
        })
    }

    /// Primary records with `updated_at > since`, oldest first.
    pub async fn changes_since(&self, since: i64) -> Result<Vec<Record>> {
        Ok(self.store.changes_since(since).await?)
    }

    async fn append_log(&self, peer_id: &PeerId, result: &SyncResult, error: Option<String>) {
        let entry = SyncLogEntry {
            peer_id: peer_id.clone(),
            timestamp: self.clock.now_millis(),
            items_received: result.items_received,
            items_sent: result.items_sent,
            conflicts: result.conflicts,
            rejected: result.rejected,
            duration_ms: u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX),
            error,
        };
        if let Err(e) = self.store.append_sync_log(&entry).await {
            tracing::warn!(peer = %peer_id, error = %e, "failed to write sync log");
        }
    }
}

#[async_trait]
impl<S: Store + 'static> ChangeSource for SyncOrchestrator<S> {
    async fn local_info(&self) -> Result<PeerInfo> {
        SyncOrchestrator::local_info(self).await
    }

    async fn changes_page(
        &self,
        since: i64,
        after: Option<ChangeCursor>,
        limit: usize,
    ) -> Result<ChangePage> {
        let records = SyncOrchestrator::changes_since(self, since).await?;
        Ok(ChangePage::from_sorted(records, after.as_ref(), limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryConfig;
    use crate::transport::memory::MemoryNetwork;
    use brique_core::{Identity, IdentityKind, ManualClock, PeerStatus, Product, SignedRecord};
    use brique_store::MemoryStore;
    use brique_trust::TrustStore;

    fn device(seed: u8) -> Identity {
        Identity::from_seed(IdentityKind::Device, &[seed; 32])
    }

    struct Harness {
        orchestrator: Arc<SyncOrchestrator<MemoryStore>>,
        clock: Arc<ManualClock>,
    }

    async fn harness(name: &str, authors: &[&Identity]) -> Harness {
        harness_paged(name, authors, limits::MAX_RECORDS_PER_RESPONSE).await
    }

    async fn harness_paged(name: &str, authors: &[&Identity], page_size: usize) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let trust = Arc::new(TrustStore::new());
        for author in authors {
            trust.register_identity(author.public()).await;
            trust.set_trusted(&author.id(), true).await;
        }
        let clock = Arc::new(ManualClock::new(1_000_000));
        let engine = Arc::new(MergeEngine::new(Arc::clone(&store), trust));
        let registry = Arc::new(PeerRegistry::with_clock(
            Arc::clone(&store),
            RegistryConfig {
                local_id: PeerId::new(name),
                ..RegistryConfig::default()
            },
            clock.clone(),
        ));
        let config = SyncConfig {
            instance_id: PeerId::new(name),
            instance_name: name.to_uppercase(),
            page_size,
            ..SyncConfig::default()
        };
        Harness {
            orchestrator: Arc::new(SyncOrchestrator::with_clock(config, engine, registry, clock.clone())),
            clock,
        }
    }

    fn product(author: &Identity, name: &str, at: i64) -> Product {
        let mut p = Product::new("radio", "Tecsun", name);
        p.sign_at(author, at).unwrap();
        p
    }

    #[tokio::test]
    async fn test_unknown_peer() {
        let h = harness("a", &[]).await;
        let err = h
            .orchestrator
            .sync_with_peer(&PeerId::new("nobody"), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::PeerNotFound(_)));
    }

    #[tokio::test]
    async fn test_batch_counts_and_cursor() {
        let author = device(1);
        let stranger = device(2);
        let h = harness("a", &[&author]).await;
        let o = &h.orchestrator;
        let peer = PeerId::new("b");
        o.registry().add_peer(peer.clone(), "B", "mem://b").await.unwrap();

        // Local copy newer than the incoming PL-660.
        let local = product(&author, "PL-660", 500);
        o.engine().ingest_product(local.clone()).await.unwrap();

        let batch = vec![
            product(&author, "PL-660", 400).into(),
            product(&author, "PL-330", 400).into(),
            product(&stranger, "S-8800", 400).into(),
        ];
        h.clock.set(2_000_000);
        let result = o.sync_with_peer(&peer, batch).await.unwrap();

        assert_eq!(result.items_received, 3);
        assert_eq!(result.items_sent, 1);
        assert_eq!(result.conflicts, 1);
        assert_eq!(result.rejected, 1);

        let stored = o.registry().peer(&peer).await.unwrap().unwrap();
        assert_eq!(stored.last_sync, Some(2_000_000));
        assert_eq!(o.registry().status(&stored), PeerStatus::Online);

        let log = o.sync_history(&peer, 10).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].conflicts, 1);
        assert!(log[0].is_success());
    }

    #[tokio::test]
    async fn test_pull_between_two_nodes() {
        let author = device(1);
        let a = harness("a", &[&author]).await;
        let b = harness("b", &[&author]).await;

        let network = MemoryNetwork::new();
        network.register("mem://a", a.orchestrator.clone()).await;
        network.register("mem://b", b.orchestrator.clone()).await;
        let transport = network.transport();

        for name in ["PL-310", "PL-880"] {
            b.orchestrator
                .engine()
                .ingest_product(product(&author, name, 100))
                .await
                .unwrap();
        }

        let peer_b = PeerId::new("b");
        a.orchestrator
            .registry()
            .add_peer(peer_b.clone(), "unnamed", "mem://b")
            .await
            .unwrap();

        let first = a.orchestrator.pull_from_peer(&peer_b, &transport).await.unwrap();
        assert_eq!(first.items_received, 2);
        assert_eq!(a.orchestrator.local_info().await.unwrap().item_count, 2);

        let known = a.orchestrator.registry().peer(&peer_b).await.unwrap().unwrap();
        assert_eq!(known.name, "B");

        // Nothing new on b since the cursor.
        a.clock.advance(1_000);
        let second = a.orchestrator.pull_from_peer(&peer_b, &transport).await.unwrap();
        assert_eq!(second.items_received, 0);
    }

    #[tokio::test]
    async fn test_pull_pages_through_shared_timestamp() {
        let author = device(1);
        let a = harness_paged("a", &[&author], 4).await;
        let b = harness("b", &[&author]).await;
        let network = MemoryNetwork::new();
        network.register("mem://b", b.orchestrator.clone()).await;

        // Ten records on one millisecond, so pages split inside it.
        for i in 0..10 {
            b.orchestrator
                .engine()
                .ingest_product(product(&author, &format!("R-{}", i), 100))
                .await
                .unwrap();
        }
        b.orchestrator
            .engine()
            .ingest_product(product(&author, "R-late", 200))
            .await
            .unwrap();

        let peer = PeerId::new("b");
        a.orchestrator.registry().add_peer(peer.clone(), "B", "mem://b").await.unwrap();
        let result = a.orchestrator.pull_from_peer(&peer, &network.transport()).await.unwrap();

        assert_eq!(result.items_received, 11);
        assert_eq!(result.rejected, 0);
        assert_eq!(a.orchestrator.local_info().await.unwrap().item_count, 11);
        assert_eq!(a.orchestrator.sync_history(&peer, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pull_larger_than_one_response() {
        let author = device(1);
        let a = harness("a", &[&author]).await;
        let b = harness("b", &[&author]).await;
        let network = MemoryNetwork::new();
        network.register("mem://b", b.orchestrator.clone()).await;

        let total = limits::MAX_RECORDS_PER_RESPONSE + 1;
        for i in 0..total {
            let p = product(&author, &format!("D-{}", i), 100 + (i % 7) as i64);
            b.orchestrator.store.put_product(&p).await.unwrap();
        }

        let peer = PeerId::new("b");
        a.orchestrator.registry().add_peer(peer.clone(), "B", "mem://b").await.unwrap();
        let result = a.orchestrator.pull_from_peer(&peer, &network.transport()).await.unwrap();

        assert_eq!(result.items_received, total as u64);
        assert_eq!(a.orchestrator.local_info().await.unwrap().item_count, total as u64);
    }

    #[tokio::test]
    async fn test_transport_failure_is_logged() {
        let h = harness("a", &[]).await;
        let network = MemoryNetwork::new();
        let peer = PeerId::new("b");
        h.orchestrator
            .registry()
            .add_peer(peer.clone(), "B", "mem://gone")
            .await
            .unwrap();

        let err = h
            .orchestrator
            .pull_from_peer(&peer, &network.transport())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Transport(TransportError::Unreachable(_))));

        let log = h.orchestrator.recent_sync_history(10).await.unwrap();
        assert_eq!(log.len(), 1);
        assert!(log[0].error.as_deref().unwrap_or_default().contains("unreachable"));

        let peer = h.orchestrator.registry().peer(&peer).await.unwrap().unwrap();
        assert_eq!(peer.last_sync, None);
    }

    #[tokio::test]
    async fn test_address_answering_as_other_instance() {
        let a = harness("a", &[]).await;
        let c = harness("c", &[]).await;
        let network = MemoryNetwork::new();
        network.register("mem://b", c.orchestrator.clone()).await;

        let peer = PeerId::new("b");
        a.orchestrator
            .registry()
            .add_peer(peer.clone(), "B", "mem://b")
            .await
            .unwrap();
        let err = a
            .orchestrator
            .pull_from_peer(&peer, &network.transport())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Transport(TransportError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_pull_from_trusted_only() {
        let author = device(1);
        let a = harness("a", &[&author]).await;
        let b = harness("b", &[&author]).await;
        let network = MemoryNetwork::new();
        network.register("mem://b", b.orchestrator.clone()).await;
        b.orchestrator
            .engine()
            .ingest_product(product(&author, "PL-990", 100))
            .await
            .unwrap();

        let registry = a.orchestrator.registry();
        registry.add_peer(PeerId::new("b"), "B", "mem://b").await.unwrap();
        registry.add_peer(PeerId::new("x"), "X", "mem://x").await.unwrap();
        registry.set_trust(&PeerId::new("b"), true).await.unwrap();

        let results = a
            .orchestrator
            .pull_from_trusted_peers(&network.transport())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, PeerId::new("b"));
        assert_eq!(results[0].1.as_ref().unwrap().items_received, 1);
    }
}
