//! Known-identity registry.
//!
//! The trust store answers two questions for the merge engine: which public
//! key belongs to an author id, and whether that author is trusted. Devices
//! enter it either directly or through a delegation certificate from a known
//! Human; a delegated device is trusted whenever its root is.

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

use brique_core::{
    check_delegation_at, now_secs, DelegationCertificate, Ed25519PublicKey, IdentityId,
    IdentityKind, PublicIdentity,
};

use crate::error::{Result, TrustError};

/// A registered identity.
#[derive(Debug, Clone)]
struct KnownIdentity {
    identity: PublicIdentity,
    trusted: bool,
    /// Root that delegated this device, if it arrived by certificate.
    delegated_by: Option<IdentityId>,
}

#[derive(Debug, Default)]
struct TrustState {
    known: HashMap<IdentityId, KnownIdentity>,
    delegations: HashMap<IdentityId, DelegationCertificate>,
}

impl TrustState {
    fn is_trusted(&self, id: &IdentityId) -> bool {
        match self.known.get(id) {
            Some(entry) if entry.trusted => true,
            Some(entry) => entry
                .delegated_by
                .and_then(|root| self.known.get(&root))
                .map_or(false, |root| root.trusted),
            None => false,
        }
    }
}

/// Registry of known identities and their trust flags.
#[derive(Debug, Default)]
pub struct TrustStore {
    inner: RwLock<TrustState>,
}

impl TrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an identity as known but untrusted.
    ///
    /// The id is re-derived from the public key, so a forged `id` field is
    /// ignored. Re-registering keeps the existing trust flag.
    pub async fn register_identity(&self, identity: PublicIdentity) -> IdentityId {
        let identity = PublicIdentity::new(identity.kind, identity.public_key);
        let id = identity.id;

        let mut state = self.inner.write().await;
        state
            .known
            .entry(id)
            .and_modify(|entry| entry.identity = identity)
            .or_insert(KnownIdentity {
                identity,
                trusted: false,
                delegated_by: None,
            });
        tracing::debug!(identity = %id, kind = identity.kind.as_str(), "registered identity");
        id
    }

    /// Register a device through a certificate issued by a known Human.
    pub async fn register_delegated_device(
        &self,
        cert: &DelegationCertificate,
        device: PublicIdentity,
    ) -> Result<IdentityId> {
        self.register_delegated_device_at(cert, device, now_secs()).await
    }

    /// Like [`register_delegated_device`](Self::register_delegated_device) as
    /// of `now` (unix seconds).
    pub async fn register_delegated_device_at(
        &self,
        cert: &DelegationCertificate,
        device: PublicIdentity,
        now: u64,
    ) -> Result<IdentityId> {
        let device = PublicIdentity::new(device.kind, device.public_key);
        if device.kind != IdentityKind::Device || cert.subject_id != device.id {
            return Err(TrustError::SubjectMismatch);
        }

        let mut state = self.inner.write().await;

        let issuer = state
            .known
            .get(&cert.issuer_id)
            .ok_or(TrustError::UnknownIssuer(cert.issuer_id))?;
        if issuer.identity.kind != IdentityKind::Human {
            return Err(TrustError::Delegation(
                brique_core::CoreError::InvalidDelegation("issuer is not a human identity".into()),
            ));
        }
        check_delegation_at(&issuer.identity.public_key, cert, now)
            .map_err(TrustError::Delegation)?;

        let trusted = state
            .known
            .get(&device.id)
            .map_or(false, |existing| existing.trusted);
        state.known.insert(
            device.id,
            KnownIdentity {
                identity: device,
                trusted,
                delegated_by: Some(cert.issuer_id),
            },
        );
        state.delegations.insert(device.id, cert.clone());

        tracing::debug!(device = %device.id, root = %cert.issuer_id, "registered delegated device");
        Ok(device.id)
    }

    /// Public key of a known identity.
    pub async fn public_key(&self, id: &IdentityId) -> Option<Ed25519PublicKey> {
        self.inner
            .read()
            .await
            .known
            .get(id)
            .map(|entry| entry.identity.public_key)
    }

    pub async fn identity(&self, id: &IdentityId) -> Option<PublicIdentity> {
        self.inner.read().await.known.get(id).map(|e| e.identity)
    }

    pub async fn is_known(&self, id: &IdentityId) -> bool {
        self.inner.read().await.known.contains_key(id)
    }

    /// Set the trust flag of a known identity. Returns false if unknown.
    pub async fn set_trusted(&self, id: &IdentityId, trusted: bool) -> bool {
        match self.inner.write().await.known.get_mut(id) {
            Some(entry) => {
                entry.trusted = trusted;
                true
            }
            None => false,
        }
    }

    /// Trusted directly, or delegated by a trusted root.
    pub async fn is_trusted(&self, id: &IdentityId) -> bool {
        self.inner.read().await.is_trusted(id)
    }

    /// Every identity that [`is_trusted`](Self::is_trusted) accepts.
    pub async fn trusted_identities(&self) -> HashSet<IdentityId> {
        let state = self.inner.read().await;
        state
            .known
            .keys()
            .filter(|id| state.is_trusted(id))
            .copied()
            .collect()
    }

    /// Certificate a device was registered with.
    pub async fn delegation(&self, device: &IdentityId) -> Option<DelegationCertificate> {
        self.inner.read().await.delegations.get(device).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.known.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brique_core::{issue_delegation_at, CoreError, Identity};
    use std::time::Duration;

    const NOW: u64 = 1_700_000_000;
    const DAY: Duration = Duration::from_secs(86_400);

    fn human() -> Identity {
        Identity::from_seed(IdentityKind::Human, &[1; 32])
    }

    fn device(seed: u8) -> Identity {
        Identity::from_seed(IdentityKind::Device, &[seed; 32])
    }

    #[tokio::test]
    async fn test_register_rederives_id() {
        let store = TrustStore::new();
        let mut forged = device(2).public();
        forged.id = IdentityId::ZERO;

        let id = store.register_identity(forged).await;
        assert_eq!(id, device(2).id());
        assert!(store.is_known(&device(2).id()).await);
        assert!(!store.is_known(&IdentityId::ZERO).await);
        assert!(!store.is_trusted(&id).await);
    }

    #[tokio::test]
    async fn test_delegated_device_inherits_root_trust() {
        let store = TrustStore::new();
        let root = human();
        let dev = device(2);
        store.register_identity(root.public()).await;

        let cert = issue_delegation_at(&root, &dev.public(), NOW, DAY * 30).unwrap();
        store
            .register_delegated_device_at(&cert, dev.public(), NOW + 1)
            .await
            .unwrap();

        assert!(store.is_known(&dev.id()).await);
        assert!(!store.is_trusted(&dev.id()).await);

        store.set_trusted(&root.id(), true).await;
        assert!(store.is_trusted(&dev.id()).await);
        assert_eq!(
            store.trusted_identities().await,
            HashSet::from([root.id(), dev.id()])
        );
        assert_eq!(store.delegation(&dev.id()).await, Some(cert));
    }

    #[tokio::test]
    async fn test_expired_certificate_rejected() {
        let store = TrustStore::new();
        let root = human();
        let dev = device(2);
        store.register_identity(root.public()).await;

        let cert = issue_delegation_at(&root, &dev.public(), NOW, DAY).unwrap();
        let err = store
            .register_delegated_device_at(&cert, dev.public(), NOW + 2 * 86_400)
            .await
            .unwrap_err();

        assert!(matches!(err, TrustError::Delegation(CoreError::Expired { .. })));
        assert!(!store.is_known(&dev.id()).await);
    }

    #[tokio::test]
    async fn test_unknown_issuer_and_wrong_subject() {
        let store = TrustStore::new();
        let root = human();
        let cert = issue_delegation_at(&root, &device(2).public(), NOW, DAY).unwrap();

        let err = store
            .register_delegated_device_at(&cert, device(2).public(), NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, TrustError::UnknownIssuer(id) if id == root.id()));

        store.register_identity(root.public()).await;
        let err = store
            .register_delegated_device_at(&cert, device(3).public(), NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, TrustError::SubjectMismatch));
    }

    #[tokio::test]
    async fn test_device_cannot_act_as_root() {
        let store = TrustStore::new();
        let impostor = device(9);
        store.register_identity(impostor.public()).await;

        // A certificate signed by a device key, dressed up as if from a root.
        let as_human = Identity::from_seed(IdentityKind::Human, &impostor.seed());
        let cert = issue_delegation_at(&as_human, &device(2).public(), NOW, DAY).unwrap();

        let err = store
            .register_delegated_device_at(&cert, device(2).public(), NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, TrustError::Delegation(_)));
    }

    #[tokio::test]
    async fn test_set_trusted_unknown() {
        let store = TrustStore::new();
        assert!(!store.set_trusted(&device(1).id(), true).await);
        assert!(store.is_empty().await);
    }
}
