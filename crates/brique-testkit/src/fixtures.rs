//! Test fixtures and helpers.
//!
//! A [`Workshop`] is one person's root identity plus a device it has
//! delegated, all derived from a single seed byte.

use std::time::Duration;

use brique_core::{
    issue_delegation_at, DelegationCertificate, Identity, IdentityKind, Product, RecordId,
    SignedRecord, Tutorial,
};
use brique_trust::TrustStore;

/// Unix seconds at which fixture certificates are issued.
pub const ISSUED_AT: u64 = 1_736_870_400;

/// Lifetime of fixture certificates.
pub const VALIDITY: Duration = Duration::from_secs(365 * 86_400);

/// A human root and one delegated device.
pub struct Workshop {
    pub root: Identity,
    pub device: Identity,
    pub cert: DelegationCertificate,
}

impl Workshop {
    /// Deterministic workshop for `seed`. Different seeds never share keys.
    pub fn new(seed: u8) -> Self {
        let root = Identity::from_seed(IdentityKind::Human, &[seed; 32]);
        let mut device_seed = [seed; 32];
        device_seed[31] = seed.wrapping_add(1);
        let device = Identity::from_seed(IdentityKind::Device, &device_seed);

        let cert = issue_delegation_at(&root, &device.public(), ISSUED_AT, VALIDITY)
            .expect("human root delegates to a device");
        Self { root, device, cert }
    }

    /// A trust store knowing this workshop's root, trusted, and its device.
    pub async fn trust_store(&self) -> TrustStore {
        let trust = TrustStore::new();
        self.register_with(&trust, true).await;
        trust
    }

    /// Make `trust` know this workshop, optionally trusting its root.
    pub async fn register_with(&self, trust: &TrustStore, trusted: bool) {
        let root_id = trust.register_identity(self.root.public()).await;
        trust.set_trusted(&root_id, trusted).await;
        trust
            .register_delegated_device_at(&self.cert, self.device.public(), ISSUED_AT)
            .await
            .expect("fixture certificate is valid at issue time");
    }

    /// A product signed by this workshop's device at `at` (unix millis).
    pub fn signed_product(&self, category: &str, manufacturer: &str, name: &str, at: i64) -> Product {
        let mut product = Product::new(category, manufacturer, name);
        product
            .sign_at(&self.device, at)
            .expect("product encodes canonically");
        product
    }

    /// A one-step English tutorial signed at `at`.
    pub fn signed_tutorial(&self, target: RecordId, title: &str, at: i64) -> Tutorial {
        let mut tutorial = Tutorial::new(target, &self.device.id(), at);
        tutorial.set_title("en", title);
        tutorial.add_step(None, "en", "Open the case");
        tutorial
            .sign_at(&self.device, at)
            .expect("tutorial encodes canonically");
        tutorial
    }
}

/// Workshops for seeds `0..count`.
pub fn workshops(count: u8) -> Vec<Workshop> {
    (0..count).map(Workshop::new).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use brique_core::verify_delegation_at;

    #[test]
    fn test_cert_verifies_within_validity() {
        let w = Workshop::new(3);
        let key = w.root.public_key();
        assert!(verify_delegation_at(&key, &w.cert, ISSUED_AT));
        assert!(!verify_delegation_at(&key, &w.cert, ISSUED_AT + VALIDITY.as_secs() + 1));
    }

    #[tokio::test]
    async fn test_device_trusted_through_root() {
        let w = Workshop::new(1);
        let trust = w.trust_store().await;
        assert!(trust.is_trusted(&w.device.id()).await);

        let other = Workshop::new(2);
        other.register_with(&trust, false).await;
        assert!(trust.is_known(&other.device.id()).await);
        assert!(!trust.is_trusted(&other.device.id()).await);
    }

    #[test]
    fn test_signed_records_verify() {
        let w = Workshop::new(5);
        let product = w.signed_product("phone", "Fairphone", "FP4", 1_000);
        assert!(product.verify_signature(&w.device.public_key()));

        let tutorial = w.signed_tutorial(product.id, "Replace Battery", 2_000);
        assert!(tutorial.verify_signature(&w.device.public_key()));
        assert!(tutorial.verify_hash().is_ok());
        assert_eq!(tutorial.generation, 1);
    }

    #[test]
    fn test_workshops_have_distinct_keys() {
        let all = workshops(4);
        let mut ids: Vec<_> = all
            .iter()
            .flat_map(|w| [w.root.id(), w.device.id()])
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 8);
    }
}
