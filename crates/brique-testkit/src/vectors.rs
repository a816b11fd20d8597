//! Golden test vectors for deterministic verification.
//!
//! These vectors pin the exact bytes a delegation certificate is signed
//! over, so every implementation produces identical signatures.

use brique_core::{
    issue_delegation_at, DelegationCertificate, Ed25519Signature, Identity, IdentityId,
    IdentityKind, DELEGATION_SCHEMA_VERSION,
};

/// A golden delegation vector.
#[derive(Debug, Clone)]
pub struct DelegationVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    pub issuer: [u8; 32],
    pub subject: [u8; 32],
    /// Unix seconds.
    pub valid_until: u64,
    pub permissions: &'static [&'static str],
    /// Expected canonical bytes (hex).
    pub expected_canonical: &'static str,
}

impl DelegationVector {
    /// The unsigned certificate described by this vector.
    pub fn certificate(&self) -> DelegationCertificate {
        DelegationCertificate {
            schema_version: DELEGATION_SCHEMA_VERSION,
            issuer_id: IdentityId::from_bytes(self.issuer),
            subject_id: IdentityId::from_bytes(self.subject),
            permissions: self.permissions.iter().map(|p| p.to_string()).collect(),
            valid_until: self.valid_until,
            signature: Ed25519Signature::ZERO,
        }
    }
}

/// Get all golden delegation vectors.
pub fn delegation_vectors() -> Vec<DelegationVector> {
    vec![
        DelegationVector {
            name: "two permissions ab, c",
            issuer: [0x11; 32],
            subject: [0x22; 32],
            valid_until: 1_700_000_000,
            permissions: &["ab", "c"],
            expected_canonical: concat!(
                "0000000000000002",
                "1111111111111111111111111111111111111111111111111111111111111111",
                "2222222222222222222222222222222222222222222222222222222222222222",
                "000000006553f100",
                "00000002",
                "00000002",
                "6162",
                "00000001",
                "63",
            ),
        },
        DelegationVector {
            name: "same characters split a, bc",
            issuer: [0x11; 32],
            subject: [0x22; 32],
            valid_until: 1_700_000_000,
            permissions: &["a", "bc"],
            expected_canonical: concat!(
                "0000000000000002",
                "1111111111111111111111111111111111111111111111111111111111111111",
                "2222222222222222222222222222222222222222222222222222222222222222",
                "000000006553f100",
                "00000002",
                "00000001",
                "61",
                "00000002",
                "6263",
            ),
        },
        DelegationVector {
            name: "no permissions",
            issuer: [0x00; 32],
            subject: [0xff; 32],
            valid_until: 0,
            permissions: &[],
            expected_canonical: concat!(
                "0000000000000002",
                "0000000000000000000000000000000000000000000000000000000000000000",
                "ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
                "0000000000000000",
                "00000000",
            ),
        },
    ]
}

/// Check every vector. Returns `(name, matches, actual_hex)` per vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    delegation_vectors()
        .iter()
        .map(|v| {
            let actual = hex::encode(v.certificate().canonical_bytes());
            (v.name.to_string(), actual == v.expected_canonical, actual)
        })
        .collect()
}

/// A certificate signed by a seeded root, for signature regression tests.
///
/// Ed25519 is deterministic, so the signature depends only on the seeds.
pub fn seeded_certificate(root_seed: [u8; 32], device_seed: [u8; 32]) -> Option<DelegationCertificate> {
    let root = Identity::from_seed(IdentityKind::Human, &root_seed);
    let device = Identity::from_seed(IdentityKind::Device, &device_seed);
    issue_delegation_at(
        &root,
        &device.public(),
        1_700_000_000,
        std::time::Duration::from_secs(30 * 86_400),
    )
    .ok()
}
