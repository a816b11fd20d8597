//! The signing contract shared by every mutable record type.

use ciborium::value::Value;
use serde::{Deserialize, Serialize};

use crate::canonical::{self, keys};
use crate::crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature};
use crate::error::Result;
use crate::identity::Identity;
use crate::product::Product;
use crate::time::now_millis;
use crate::tutorial::Tutorial;
use crate::types::{IdentityId, RecordId};

/// Who last changed a record, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CrdtMeta {
    /// Unix milliseconds of the last signed change.
    pub updated_at: i64,
    pub author_device_id: IdentityId,
}

impl CrdtMeta {
    /// Metadata of a record that has never been signed.
    pub const UNSIGNED: Self = Self {
        updated_at: 0,
        author_device_id: IdentityId::ZERO,
    };

    pub(crate) fn to_cbor(self) -> Value {
        canonical::tagged(vec![
            (keys::crdt_meta::UPDATED_AT, canonical::int(self.updated_at)),
            (
                keys::crdt_meta::AUTHOR,
                canonical::bytes(self.author_device_id.as_bytes()),
            ),
        ])
    }
}

impl Default for CrdtMeta {
    fn default() -> Self {
        Self::UNSIGNED
    }
}

/// Discriminator written into every canonical map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RecordKind {
    Product = 1,
    Tutorial = 2,
}

impl RecordKind {
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(RecordKind::Product),
            2 => Some(RecordKind::Tutorial),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Product => "product",
            RecordKind::Tutorial => "tutorial",
        }
    }
}

/// A record whose content is signed by the device that last changed it.
///
/// Implementors supply the canonical map; signing and verification are shared.
pub trait SignedRecord: Clone + Send + Sync + 'static {
    const KIND: RecordKind;

    fn id(&self) -> RecordId;

    fn crdt_meta(&self) -> &CrdtMeta;

    fn crdt_meta_mut(&mut self) -> &mut CrdtMeta;

    fn signature(&self) -> &Ed25519Signature;

    fn set_signature(&mut self, signature: Ed25519Signature);

    /// Canonical map of every field except the signature.
    fn to_canonical_value(&self) -> Value;

    /// Edit counter used by merge precedence. Products have none.
    fn generation(&self) -> u64 {
        0
    }

    /// Hash identifying this exact version.
    fn version_hash(&self) -> Result<Blake3Hash> {
        Ok(Blake3Hash::hash(&self.canonical_bytes()?))
    }

    /// Called after `crdt_meta` is updated and before signing.
    fn seal(&mut self) -> Result<()> {
        Ok(())
    }

    fn canonical_bytes(&self) -> Result<Vec<u8>> {
        canonical::encode(&self.to_canonical_value())
    }

    fn updated_at(&self) -> i64 {
        self.crdt_meta().updated_at
    }

    fn author(&self) -> IdentityId {
        self.crdt_meta().author_device_id
    }

    /// Sign with the system clock.
    fn sign(&mut self, device: &Identity) -> Result<()> {
        self.sign_at(device, now_millis())
    }

    /// Stamp `crdt_meta` and sign.
    ///
    /// `updated_at` never goes backwards: a re-signed record always carries a
    /// later timestamp than the version it was derived from.
    fn sign_at(&mut self, device: &Identity, now: i64) -> Result<()> {
        let meta = self.crdt_meta_mut();
        meta.updated_at = now.max(meta.updated_at.saturating_add(1));
        meta.author_device_id = device.id();

        self.seal()?;
        let bytes = self.canonical_bytes()?;
        self.set_signature(device.sign(&bytes));
        Ok(())
    }

    /// Verify the signature, reporting why it fails.
    fn check_signature(&self, author_key: &Ed25519PublicKey) -> Result<()> {
        author_key.verify(&self.canonical_bytes()?, self.signature())
    }

    fn verify_signature(&self, author_key: &Ed25519PublicKey) -> bool {
        self.check_signature(author_key).is_ok()
    }
}

/// Any record that travels in a sync batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Record {
    Product(Product),
    Tutorial(Tutorial),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Product(_) => RecordKind::Product,
            Record::Tutorial(_) => RecordKind::Tutorial,
        }
    }

    pub fn id(&self) -> RecordId {
        match self {
            Record::Product(p) => p.id(),
            Record::Tutorial(t) => t.id(),
        }
    }

    pub fn crdt_meta(&self) -> &CrdtMeta {
        match self {
            Record::Product(p) => p.crdt_meta(),
            Record::Tutorial(t) => t.crdt_meta(),
        }
    }

    pub fn updated_at(&self) -> i64 {
        self.crdt_meta().updated_at
    }
}

impl From<Product> for Record {
    fn from(p: Product) -> Self {
        Record::Product(p)
    }
}

impl From<Tutorial> for Record {
    fn from(t: Tutorial) -> Self {
        Record::Tutorial(t)
    }
}
