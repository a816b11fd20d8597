//! Human and device identities.
//!
//! An identity is a keypair plus a kind. Its id is the Blake3 hash of the
//! public key, so any peer holding the key can recompute it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::{Ed25519PublicKey, Ed25519Signature, Keypair};
use crate::error::Result;
use crate::types::IdentityId;

/// Whether an identity belongs to a person (delegation root) or a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum IdentityKind {
    Human = 0,
    Device = 1,
}

impl IdentityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityKind::Human => "human",
            IdentityKind::Device => "device",
        }
    }
}

/// A local identity, including its secret key.
#[derive(Clone)]
pub struct Identity {
    kind: IdentityKind,
    keypair: Keypair,
    id: IdentityId,
}

impl Identity {
    /// Build an identity around an existing keypair.
    pub fn from_keypair(kind: IdentityKind, keypair: Keypair) -> Self {
        let id = IdentityId::from_public_key(&keypair.public_key());
        Self { kind, keypair, id }
    }

    /// Deterministically recreate an identity from its secret seed.
    pub fn from_seed(kind: IdentityKind, seed: &[u8; 32]) -> Self {
        Self::from_keypair(kind, Keypair::from_seed(seed))
    }

    pub fn kind(&self) -> IdentityKind {
        self.kind
    }

    pub fn id(&self) -> IdentityId {
        self.id
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        self.keypair.public_key()
    }

    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        self.keypair.sign(message)
    }

    /// The shareable half of this identity.
    pub fn public(&self) -> PublicIdentity {
        PublicIdentity {
            kind: self.kind,
            id: self.id,
            public_key: self.public_key(),
        }
    }

    /// Secret seed, for backup. Never transmit this.
    pub fn seed(&self) -> [u8; 32] {
        self.keypair.seed()
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .finish()
    }
}

/// Generate a fresh identity from the secure random source.
///
/// Fails with [`crate::CoreError::Crypto`] only if no randomness is available.
pub fn generate_identity(kind: IdentityKind) -> Result<Identity> {
    Ok(Identity::from_keypair(kind, Keypair::generate()?))
}

/// An identity as seen by other peers: kind, id and public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicIdentity {
    pub kind: IdentityKind,
    pub id: IdentityId,
    pub public_key: Ed25519PublicKey,
}

impl PublicIdentity {
    pub fn new(kind: IdentityKind, public_key: Ed25519PublicKey) -> Self {
        Self {
            kind,
            id: IdentityId::from_public_key(&public_key),
            public_key,
        }
    }

    /// True if `id` really is the hash of `public_key`.
    pub fn is_consistent(&self) -> bool {
        self.id == IdentityId::from_public_key(&self.public_key)
    }
}
