//! The Node: one device's view of the network.
//!
//! A node wires the store, trust store, merge engine, peer registry and
//! sync orchestrator together. Each collaborator is created here and passed
//! down explicitly; nothing is global.

use std::sync::Arc;

use futures::Stream;

use brique_core::{
    issue_delegation_at, Clock, DelegationCertificate, Identity, IdentityId, IdentityKind,
    PeerId, Product, PublicIdentity, Record, RecordId, SignedRecord, SyncLogEntry, SystemClock,
    Tutorial,
};
use brique_store::{SqliteStore, Store};
use brique_sync::{
    MemoryNetwork, PeerInfo, PeerRegistry, PeerSighting, PeerTransport, RegistryConfig,
    SyncConfig, SyncOrchestrator, SyncResult,
};
use brique_trust::{IngestOutcome, MergeEngine, TrustStore};

use crate::config::NodeConfig;
use crate::error::{NodeError, Result};

/// A running Brique node.
pub struct Node<S: Store> {
    config: NodeConfig,
    device: Identity,
    clock: Arc<dyn Clock>,
    store: Arc<S>,
    trust: Arc<TrustStore>,
    engine: Arc<MergeEngine<S>>,
    registry: Arc<PeerRegistry<S>>,
    orchestrator: Arc<SyncOrchestrator<S>>,
}

impl Node<SqliteStore> {
    /// Open a node on the configured database, or on an in-memory one when
    /// no path is set.
    pub async fn open(config: NodeConfig, device: Identity) -> Result<Self> {
        let store = match &config.database_path {
            Some(path) => SqliteStore::open(path)?,
            None => SqliteStore::open_memory()?,
        };
        Self::with_store(config, device, Arc::new(store)).await
    }
}

impl<S: Store + 'static> Node<S> {
    pub async fn with_store(config: NodeConfig, device: Identity, store: Arc<S>) -> Result<Self> {
        Self::with_clock(config, device, store, Arc::new(SystemClock)).await
    }

    /// Build a node reading time from `clock`.
    ///
    /// The device is registered with the trust store and trusted, so the
    /// node accepts its own records.
    pub async fn with_clock(
        config: NodeConfig,
        device: Identity,
        store: Arc<S>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if device.kind() != IdentityKind::Device {
            return Err(NodeError::NotADevice);
        }

        let trust = Arc::new(TrustStore::new());
        trust.register_identity(device.public()).await;
        trust.set_trusted(&device.id(), true).await;

        let instance_id = PeerId::new(device.id().to_hex());
        let engine = Arc::new(MergeEngine::new(Arc::clone(&store), Arc::clone(&trust)));
        let registry = Arc::new(PeerRegistry::with_clock(
            Arc::clone(&store),
            RegistryConfig {
                local_id: instance_id.clone(),
                online_window: config.online_window(),
            },
            Arc::clone(&clock),
        ));
        let orchestrator = Arc::new(SyncOrchestrator::with_clock(
            SyncConfig {
                instance_id,
                instance_name: config.instance_name.clone(),
                transport_timeout: config.transport_timeout(),
                history_limit: config.sync.history_limit,
                ..SyncConfig::default()
            },
            Arc::clone(&engine),
            Arc::clone(&registry),
            Arc::clone(&clock),
        ));

        tracing::info!(
            device = %device.id(),
            instance = %config.instance_name,
            "node started"
        );

        Ok(Self {
            config,
            device,
            clock,
            store,
            trust,
            engine,
            registry,
            orchestrator,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn device_id(&self) -> IdentityId {
        self.device.id()
    }

    pub fn public_identity(&self) -> PublicIdentity {
        self.device.public()
    }

    /// Id announced to peers: the device id in hex.
    pub fn instance_id(&self) -> PeerId {
        self.orchestrator.config().instance_id.clone()
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn trust(&self) -> &Arc<TrustStore> {
        &self.trust
    }

    pub fn engine(&self) -> &Arc<MergeEngine<S>> {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<PeerRegistry<S>> {
        &self.registry
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator<S>> {
        &self.orchestrator
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Identities
    // ─────────────────────────────────────────────────────────────────────────

    /// Issue a certificate from `root` to `device`, valid for the configured
    /// number of days.
    pub fn delegate(&self, root: &Identity, device: &PublicIdentity) -> Result<DelegationCertificate> {
        Ok(issue_delegation_at(
            root,
            device,
            self.clock.now_secs(),
            self.config.delegation_validity(),
        )?)
    }

    /// Know a Human root, optionally trusting it and every device it delegates.
    pub async fn register_root(&self, root: PublicIdentity, trusted: bool) -> IdentityId {
        let id = self.trust.register_identity(root).await;
        self.trust.set_trusted(&id, trusted).await;
        id
    }

    /// Know a device through its delegation certificate.
    pub async fn register_device(
        &self,
        cert: &DelegationCertificate,
        device: PublicIdentity,
    ) -> Result<IdentityId> {
        Ok(self
            .trust
            .register_delegated_device_at(cert, device, self.clock.now_secs())
            .await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Records
    // ─────────────────────────────────────────────────────────────────────────

    /// Sign a product with this device and store it.
    ///
    /// Fails with [`NodeError::Superseded`] if the stored copy outranks the
    /// edit, for instance one signed by a peer whose clock runs ahead.
    pub async fn publish_product(&self, mut product: Product) -> Result<Product> {
        product.sign_at(&self.device, self.clock.now_millis())?;
        let outcome = self.engine.ingest_product(product.clone()).await?;
        Self::published(product, outcome)
    }

    /// Sign a tutorial version with this device and store it.
    ///
    /// A superseded version still lands in the version index, but the
    /// primary slot keeps the stored copy and [`NodeError::Superseded`] is
    /// returned.
    pub async fn publish_tutorial(&self, mut tutorial: Tutorial) -> Result<Tutorial> {
        tutorial.sign_at(&self.device, self.clock.now_millis())?;
        let outcome = self.engine.ingest_tutorial(tutorial.clone()).await?;
        Self::published(tutorial, outcome)
    }

    fn published<R: SignedRecord>(record: R, outcome: IngestOutcome) -> Result<R> {
        if outcome.is_conflict() {
            tracing::warn!(record = %record.id(), updated_at = record.updated_at(), "local edit superseded");
            return Err(NodeError::Superseded {
                id: record.id(),
                signed_at: record.updated_at(),
            });
        }
        Ok(record)
    }

    /// Start a tutorial authored by this device.
    pub fn new_tutorial(&self, target_product: RecordId) -> Tutorial {
        Tutorial::new(target_product, &self.device.id(), self.clock.now_millis())
    }

    /// Merge a record received out of band.
    pub async fn ingest(&self, record: Record) -> Result<IngestOutcome> {
        Ok(self.engine.ingest(record).await?)
    }

    pub async fn product(&self, id: &RecordId) -> Result<Option<Product>> {
        Ok(self.store.get_product(id).await?)
    }

    /// Primary version of a tutorial.
    pub async fn tutorial(&self, id: &RecordId) -> Result<Option<Tutorial>> {
        Ok(self.store.get_tutorial(id).await?)
    }

    /// The version a reader should see, preferring trusted authors.
    pub async fn best_tutorial(&self, id: &RecordId) -> Result<Option<Tutorial>> {
        Ok(self.engine.best_tutorial(id).await?)
    }

    pub async fn tutorial_versions(&self, id: &RecordId) -> Result<Vec<Tutorial>> {
        Ok(self.engine.tutorial_versions(id).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Peers and sync
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn add_peer(&self, id: PeerId, name: &str, address: &str) -> Result<()> {
        self.registry.add_peer(id, name, address).await?;
        Ok(())
    }

    pub async fn set_peer_trust(&self, id: &PeerId, trusted: bool) -> Result<()> {
        self.registry.set_trust(id, trusted).await?;
        Ok(())
    }

    /// Feed discovery sightings into the registry until the stream ends.
    pub async fn absorb_sightings(&self, sightings: impl Stream<Item = PeerSighting>) -> usize {
        self.registry.absorb(sightings).await
    }

    pub async fn sync_with_peer(&self, peer: &PeerId, batch: Vec<Record>) -> Result<SyncResult> {
        Ok(self.orchestrator.sync_with_peer(peer, batch).await?)
    }

    pub async fn pull_from_peer<T>(&self, peer: &PeerId, transport: &T) -> Result<SyncResult>
    where
        T: PeerTransport + ?Sized,
    {
        Ok(self.orchestrator.pull_from_peer(peer, transport).await?)
    }

    /// Pull from every trusted peer; failures are reported per peer.
    pub async fn pull_from_trusted_peers<T>(
        &self,
        transport: &T,
    ) -> Result<Vec<(PeerId, brique_sync::Result<SyncResult>)>>
    where
        T: PeerTransport + ?Sized,
    {
        Ok(self.orchestrator.pull_from_trusted_peers(transport).await?)
    }

    /// Audit entries for one peer, newest first, up to the configured limit.
    pub async fn sync_history(&self, peer: &PeerId) -> Result<Vec<SyncLogEntry>> {
        Ok(self
            .orchestrator
            .sync_history(peer, self.config.sync.history_limit)
            .await?)
    }

    pub async fn recent_sync_history(&self) -> Result<Vec<SyncLogEntry>> {
        Ok(self
            .orchestrator
            .recent_sync_history(self.config.sync.history_limit)
            .await?)
    }

    pub async fn local_info(&self) -> Result<PeerInfo> {
        Ok(self.orchestrator.local_info().await?)
    }

    /// Make this node reachable at `address` on an in-process network.
    pub async fn serve_on(&self, network: &MemoryNetwork, address: &str) {
        network
            .register(address, Arc::clone(&self.orchestrator) as Arc<dyn brique_sync::ChangeSource>)
            .await;
    }
}
