//! Delegation certificates.
//!
//! A Human identity authorizes one of its devices by signing a certificate
//! naming the device, a fixed permission set and an expiry. Certificates are
//! not renewable in place; expiry means issuing a new one.
//!
//! # Canonical form
//!
//! ```text
//! u64 BE  schema_version
//! [32]    issuer_id
//! [32]    subject_id
//! u64 BE  valid_until            (unix seconds)
//! u32 BE  permission count
//! repeat: u32 BE length, UTF-8 bytes
//! ```
//!
//! Each permission carries its own length, so `["ab", "c"]` and `["a", "bc"]`
//! never share a signature. Schema version 2 denotes this layout.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::crypto::{Ed25519PublicKey, Ed25519Signature};
use crate::error::{CoreError, Result};
use crate::identity::{Identity, IdentityKind, PublicIdentity};
use crate::time::now_secs;
use crate::types::IdentityId;

/// Schema version of the length-prefixed canonical layout.
pub const DELEGATION_SCHEMA_VERSION: u64 = 2;

/// Permissions granted to every delegated device.
pub const DEFAULT_PERMISSIONS: [&str; 3] = ["sign_product", "sign_tutorial", "gossip_write"];

/// A signed statement that `issuer_id` lets `subject_id` act with
/// `permissions` until `valid_until`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationCertificate {
    pub schema_version: u64,
    pub issuer_id: IdentityId,
    pub subject_id: IdentityId,
    /// Ordered; the order is part of the signed bytes.
    pub permissions: Vec<String>,
    /// Unix seconds. Valid while `now <= valid_until`.
    pub valid_until: u64,
    pub signature: Ed25519Signature,
}

impl DelegationCertificate {
    /// Bytes covered by the signature: every field except `signature`.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let perms_len: usize = self.permissions.iter().map(|p| 4 + p.len()).sum();
        let mut buf = Vec::with_capacity(8 + 32 + 32 + 8 + 4 + perms_len);

        buf.extend_from_slice(&self.schema_version.to_be_bytes());
        buf.extend_from_slice(self.issuer_id.as_bytes());
        buf.extend_from_slice(self.subject_id.as_bytes());
        buf.extend_from_slice(&self.valid_until.to_be_bytes());
        buf.extend_from_slice(&(self.permissions.len() as u32).to_be_bytes());
        for permission in &self.permissions {
            buf.extend_from_slice(&(permission.len() as u32).to_be_bytes());
            buf.extend_from_slice(permission.as_bytes());
        }
        buf
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        now > self.valid_until
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

/// Issue a certificate from `root` to `device`, valid for `duration` from now.
pub fn issue_delegation(
    root: &Identity,
    device: &PublicIdentity,
    duration: Duration,
) -> Result<DelegationCertificate> {
    issue_delegation_at(root, device, now_secs(), duration)
}

/// Issue a certificate as of `now` (unix seconds).
///
/// The root must be a Human and the subject a Device.
pub fn issue_delegation_at(
    root: &Identity,
    device: &PublicIdentity,
    now: u64,
    duration: Duration,
) -> Result<DelegationCertificate> {
    if root.kind() != IdentityKind::Human {
        return Err(CoreError::InvalidDelegation(
            "issuer must be a human identity".into(),
        ));
    }
    if device.kind != IdentityKind::Device {
        return Err(CoreError::InvalidDelegation(
            "subject must be a device identity".into(),
        ));
    }
    if !device.is_consistent() {
        return Err(CoreError::InvalidDelegation(
            "subject id does not match its public key".into(),
        ));
    }

    let mut cert = DelegationCertificate {
        schema_version: DELEGATION_SCHEMA_VERSION,
        issuer_id: root.id(),
        subject_id: device.id,
        permissions: DEFAULT_PERMISSIONS.iter().map(|p| p.to_string()).collect(),
        valid_until: now.saturating_add(duration.as_secs()),
        signature: Ed25519Signature::ZERO,
    };
    cert.signature = root.sign(&cert.canonical_bytes());
    Ok(cert)
}

/// Check a certificate against the issuer's key using the system clock.
pub fn verify_delegation(issuer_key: &Ed25519PublicKey, cert: &DelegationCertificate) -> bool {
    verify_delegation_at(issuer_key, cert, now_secs())
}

/// Check a certificate as of `now` (unix seconds).
pub fn verify_delegation_at(
    issuer_key: &Ed25519PublicKey,
    cert: &DelegationCertificate,
    now: u64,
) -> bool {
    check_delegation_at(issuer_key, cert, now).is_ok()
}

/// Like [`verify_delegation_at`], reporting why a certificate is rejected.
///
/// Expiry is checked before any signature work.
pub fn check_delegation_at(
    issuer_key: &Ed25519PublicKey,
    cert: &DelegationCertificate,
    now: u64,
) -> Result<()> {
    if cert.is_expired_at(now) {
        return Err(CoreError::Expired {
            valid_until: cert.valid_until,
            now,
        });
    }
    if cert.schema_version != DELEGATION_SCHEMA_VERSION {
        return Err(CoreError::UnsupportedVersion(cert.schema_version));
    }
    if IdentityId::from_public_key(issuer_key) != cert.issuer_id {
        return Err(CoreError::IssuerMismatch);
    }
    issuer_key.verify(&cert.canonical_bytes(), &cert.signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const DAY: u64 = 86_400;
    const T0: u64 = 1_736_870_400;

    fn human() -> Identity {
        Identity::from_seed(IdentityKind::Human, &[0x42; 32])
    }

    fn device() -> Identity {
        Identity::from_seed(IdentityKind::Device, &[0x43; 32])
    }

    #[test]
    fn test_issue_sets_fields() {
        let cert = issue_delegation_at(
            &human(),
            &device().public(),
            T0,
            Duration::from_secs(30 * DAY),
        )
        .unwrap();

        assert_eq!(cert.schema_version, DELEGATION_SCHEMA_VERSION);
        assert_eq!(cert.issuer_id, human().id());
        assert_eq!(cert.subject_id, device().id());
        assert_eq!(cert.valid_until, T0 + 30 * DAY);
        assert_eq!(
            cert.permissions,
            vec!["sign_product", "sign_tutorial", "gossip_write"]
        );
        assert!(cert.has_permission("gossip_write"));
        assert!(!cert.has_permission("admin"));
    }

    #[test]
    fn test_valid_until_is_inclusive() {
        let cert =
            issue_delegation_at(&human(), &device().public(), T0, Duration::from_secs(DAY))
                .unwrap();
        let key = human().public_key();

        assert!(verify_delegation_at(&key, &cert, T0 + DAY));
        assert!(!verify_delegation_at(&key, &cert, T0 + DAY + 1));
    }

    #[test]
    fn test_expiry_checked_before_signature() {
        let mut cert =
            issue_delegation_at(&human(), &device().public(), T0, Duration::from_secs(DAY))
                .unwrap();
        cert.signature = Ed25519Signature::ZERO;

        let err = check_delegation_at(&human().public_key(), &cert, T0 + 2 * DAY).unwrap_err();
        assert!(matches!(err, CoreError::Expired { .. }));

        let err = check_delegation_at(&human().public_key(), &cert, T0).unwrap_err();
        assert!(matches!(err, CoreError::InvalidSignature));
    }

    #[test]
    fn test_tampered_certificate_rejected() {
        let cert =
            issue_delegation_at(&human(), &device().public(), T0, Duration::from_secs(DAY))
                .unwrap();
        let key = human().public_key();

        let mut extended = cert.clone();
        extended.valid_until += 365 * DAY;
        assert!(!verify_delegation_at(&key, &extended, T0));

        let mut escalated = cert.clone();
        escalated.permissions.push("admin".into());
        assert!(!verify_delegation_at(&key, &escalated, T0));

        let mut reordered = cert;
        reordered.permissions.reverse();
        assert!(!verify_delegation_at(&key, &reordered, T0));
    }

    #[test]
    fn test_wrong_issuer_key() {
        let cert =
            issue_delegation_at(&human(), &device().public(), T0, Duration::from_secs(DAY))
                .unwrap();
        let other = Identity::from_seed(IdentityKind::Human, &[0x99; 32]);

        let err = check_delegation_at(&other.public_key(), &cert, T0).unwrap_err();
        assert!(matches!(err, CoreError::IssuerMismatch));
    }

    #[test]
    fn test_kinds_enforced() {
        let err = issue_delegation_at(&device(), &device().public(), T0, Duration::from_secs(DAY))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidDelegation(_)));

        let err = issue_delegation_at(&human(), &human().public(), T0, Duration::from_secs(DAY))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidDelegation(_)));
    }

    #[test]
    fn test_canonical_layout() {
        let cert = DelegationCertificate {
            schema_version: DELEGATION_SCHEMA_VERSION,
            issuer_id: IdentityId::from_bytes([0x11; 32]),
            subject_id: IdentityId::from_bytes([0x22; 32]),
            permissions: vec!["ab".into(), "c".into()],
            valid_until: 1_700_000_000,
            signature: Ed25519Signature::ZERO,
        };

        let mut expected = vec![0, 0, 0, 0, 0, 0, 0, 2];
        expected.extend_from_slice(&[0x11; 32]);
        expected.extend_from_slice(&[0x22; 32]);
        expected.extend_from_slice(&[0, 0, 0, 0, 0x65, 0x53, 0xf1, 0x00]);
        expected.extend_from_slice(&[0, 0, 0, 2]);
        expected.extend_from_slice(&[0, 0, 0, 2, b'a', b'b']);
        expected.extend_from_slice(&[0, 0, 0, 1, b'c']);

        assert_eq!(cert.canonical_bytes(), expected);
    }

    #[test]
    fn test_permission_partitions_differ() {
        let base = DelegationCertificate {
            schema_version: DELEGATION_SCHEMA_VERSION,
            issuer_id: IdentityId::from_bytes([1; 32]),
            subject_id: IdentityId::from_bytes([2; 32]),
            permissions: vec!["ab".into(), "c".into()],
            valid_until: 10,
            signature: Ed25519Signature::ZERO,
        };
        let split = DelegationCertificate {
            permissions: vec!["a".into(), "bc".into()],
            ..base.clone()
        };
        assert_ne!(base.canonical_bytes(), split.canonical_bytes());
    }

    proptest! {
        #[test]
        fn distinct_permission_lists_encode_distinctly(
            a in prop::collection::vec("[a-z_]{0,6}", 0..4),
            b in prop::collection::vec("[a-z_]{0,6}", 0..4),
        ) {
            let make = |permissions: Vec<String>| DelegationCertificate {
                schema_version: DELEGATION_SCHEMA_VERSION,
                issuer_id: IdentityId::from_bytes([1; 32]),
                subject_id: IdentityId::from_bytes([2; 32]),
                permissions,
                valid_until: 10,
                signature: Ed25519Signature::ZERO,
            };
            let same = a == b;
            prop_assert_eq!(make(a).canonical_bytes() == make(b).canonical_bytes(), same);
        }
    }
}
