//! Repair tutorials.
//!
//! A tutorial is versioned: each signed version carries a content `hash`, a
//! `parent_hash` naming the version it supersedes, and a `generation` that
//! grows by one per revision. Concurrent revisions of the same tutorial may
//! coexist until a reader picks one.

use ciborium::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::canonical::{self, keys, RECORD_SCHEMA_VERSION};
use crate::crypto::{Blake3Hash, Ed25519Signature};
use crate::error::{CoreError, Result};
use crate::record::{CrdtMeta, RecordKind, SignedRecord};
use crate::types::{IdentityId, RecordId};

/// Tutorial id: `blake3(author ‖ target_product ‖ created_at BE)`.
pub fn tutorial_id(author: &IdentityId, target_product: &RecordId, created_at: i64) -> RecordId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(author.as_bytes());
    hasher.update(target_product.as_bytes());
    hasher.update(&created_at.to_be_bytes());
    RecordId(*hasher.finalize().as_bytes())
}

/// A product needed to follow the tutorial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRequirement {
    pub product_id: RecordId,
    pub quantity: u32,
}

/// One step: an optional image reference and its text per language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TutorialStep {
    pub index: u32,
    /// Content hash of the step image asset, if any.
    pub image_ref: Option<String>,
    pub text: BTreeMap<String, String>,
}

/// A tutorial record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tutorial {
    pub schema_version: u64,
    pub id: RecordId,
    pub target_product: RecordId,
    /// Title per language code.
    pub title: BTreeMap<String, String>,
    pub tools: Vec<ToolRequirement>,
    pub steps: Vec<TutorialStep>,
    pub generation: u64,
    pub parent_hash: Option<Blake3Hash>,
    /// Content hash of this version; `None` while being edited.
    pub hash: Option<Blake3Hash>,
    pub crdt_meta: CrdtMeta,
    pub signature: Ed25519Signature,
}

impl Tutorial {
    /// Start a tutorial for `target_product`, authored by `author` at `created_at`.
    pub fn new(target_product: RecordId, author: &IdentityId, created_at: i64) -> Self {
        Self {
            schema_version: RECORD_SCHEMA_VERSION,
            id: tutorial_id(author, &target_product, created_at),
            target_product,
            title: BTreeMap::new(),
            tools: Vec::new(),
            steps: Vec::new(),
            generation: 1,
            parent_hash: None,
            hash: None,
            crdt_meta: CrdtMeta::UNSIGNED,
            signature: Ed25519Signature::ZERO,
        }
    }

    /// Open a new revision if this tutorial is a sealed version.
    ///
    /// Every editing method calls this, so any number of edits between two
    /// signatures produce exactly one new generation.
    pub fn begin_edit(&mut self) {
        if let Some(previous) = self.hash.take() {
            self.parent_hash = Some(previous);
            self.generation += 1;
        }
    }

    pub fn set_title(&mut self, lang: &str, title: &str) {
        self.begin_edit();
        self.title.insert(lang.to_owned(), title.to_owned());
    }

    /// Append a step and return its index.
    pub fn add_step(&mut self, image_ref: Option<&str>, lang: &str, text: &str) -> u32 {
        self.begin_edit();
        let index = self.steps.len() as u32;
        let mut texts = BTreeMap::new();
        texts.insert(lang.to_owned(), text.to_owned());
        self.steps.push(TutorialStep {
            index,
            image_ref: image_ref.map(str::to_owned),
            text: texts,
        });
        index
    }

    /// Add or replace the `lang` text of an existing step.
    pub fn translate_step(&mut self, index: u32, lang: &str, text: &str) -> Result<()> {
        let pos = self
            .steps
            .iter()
            .position(|s| s.index == index)
            .ok_or(CoreError::StepNotFound(index))?;
        self.begin_edit();
        self.steps[pos].text.insert(lang.to_owned(), text.to_owned());
        Ok(())
    }

    /// Require `quantity` of a product; replaces an existing requirement.
    pub fn add_tool(&mut self, product_id: RecordId, quantity: u32) {
        self.begin_edit();
        match self.tools.iter_mut().find(|t| t.product_id == product_id) {
            Some(tool) => tool.quantity = quantity,
            None => self.tools.push(ToolRequirement {
                product_id,
                quantity,
            }),
        }
    }

    /// Hash of every field except `hash` and `signature`.
    pub fn content_hash(&self) -> Result<Blake3Hash> {
        let bytes = canonical::encode(&self.content_value())?;
        Ok(Blake3Hash::hash(&bytes))
    }

    /// Check that `hash` describes the current content.
    pub fn verify_hash(&self) -> Result<()> {
        let actual = self.content_hash()?;
        match self.hash {
            Some(expected) if expected == actual => Ok(()),
            Some(expected) => Err(CoreError::HashMismatch {
                expected: expected.to_hex(),
                actual: actual.to_hex(),
            }),
            None => Err(CoreError::HashMismatch {
                expected: "none".into(),
                actual: actual.to_hex(),
            }),
        }
    }

    fn content_entries(&self) -> Vec<(u64, Value)> {
        use keys::tutorial as k;

        let tools = self
            .tools
            .iter()
            .map(|t| {
                canonical::tagged(vec![
                    (k::TOOL_PRODUCT, canonical::bytes(t.product_id.as_bytes())),
                    (k::TOOL_QUANTITY, canonical::uint(t.quantity.into())),
                ])
            })
            .collect();

        let steps = self
            .steps
            .iter()
            .map(|s| {
                let image = match &s.image_ref {
                    Some(r) => canonical::text(r),
                    None => Value::Null,
                };
                canonical::tagged(vec![
                    (k::STEP_INDEX, canonical::uint(s.index.into())),
                    (k::STEP_IMAGE, image),
                    (k::STEP_TEXT, canonical::text_map(&s.text)),
                ])
            })
            .collect();

        let parent = match &self.parent_hash {
            Some(h) => canonical::bytes(h.as_bytes()),
            None => Value::Null,
        };

        vec![
            (keys::SCHEMA_VERSION, canonical::uint(self.schema_version)),
            (keys::KIND, canonical::uint(RecordKind::Tutorial.to_u8().into())),
            (keys::ID, canonical::bytes(self.id.as_bytes())),
            (k::TARGET_PRODUCT, canonical::bytes(self.target_product.as_bytes())),
            (k::TITLE, canonical::text_map(&self.title)),
            (k::TOOLS, Value::Array(tools)),
            (k::STEPS, Value::Array(steps)),
            (k::GENERATION, canonical::uint(self.generation)),
            (k::PARENT_HASH, parent),
            (k::CRDT_META, self.crdt_meta.to_cbor()),
        ]
    }

    fn content_value(&self) -> Value {
        canonical::tagged(self.content_entries())
    }
}

impl SignedRecord for Tutorial {
    const KIND: RecordKind = RecordKind::Tutorial;

    fn id(&self) -> RecordId {
        self.id
    }

    fn crdt_meta(&self) -> &CrdtMeta {
        &self.crdt_meta
    }

    fn crdt_meta_mut(&mut self) -> &mut CrdtMeta {
        &mut self.crdt_meta
    }

    fn signature(&self) -> &Ed25519Signature {
        &self.signature
    }

    fn set_signature(&mut self, signature: Ed25519Signature) {
        self.signature = signature;
    }

    fn to_canonical_value(&self) -> Value {
        let mut entries = self.content_entries();
        let hash = match &self.hash {
            Some(h) => canonical::bytes(h.as_bytes()),
            None => Value::Null,
        };
        entries.push((keys::tutorial::HASH, hash));
        canonical::tagged(entries)
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    fn version_hash(&self) -> Result<Blake3Hash> {
        match self.hash {
            Some(h) => Ok(h),
            None => self.content_hash(),
        }
    }

    fn seal(&mut self) -> Result<()> {
        self.hash = Some(self.content_hash()?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Identity, IdentityKind};
    use crate::product::product_id;

    fn device(seed: u8) -> Identity {
        Identity::from_seed(IdentityKind::Device, &[seed; 32])
    }

    fn draft() -> Tutorial {
        let target = product_id("phone", "Fairphone", "FP4");
        let mut t = Tutorial::new(target, &device(1).id(), 1_000);
        t.set_title("en", "Replace Battery");
        t.add_step(Some("img-1"), "en", "Remove the back cover");
        t
    }

    #[test]
    fn test_new_tutorial_is_generation_one() {
        let t = draft();
        assert_eq!(t.generation, 1);
        assert_eq!(t.parent_hash, None);
        assert_eq!(t.hash, None);
    }

    #[test]
    fn test_tutorial_id_depends_on_inputs() {
        let target = product_id("phone", "Fairphone", "FP4");
        let a = tutorial_id(&device(1).id(), &target, 1);
        assert_eq!(a, tutorial_id(&device(1).id(), &target, 1));
        assert_ne!(a, tutorial_id(&device(2).id(), &target, 1));
        assert_ne!(a, tutorial_id(&device(1).id(), &target, 2));
    }

    #[test]
    fn test_sign_seals_hash() {
        let d = device(1);
        let mut t = draft();
        t.sign_at(&d, 2_000).unwrap();

        assert_eq!(t.hash, Some(t.content_hash().unwrap()));
        t.verify_hash().unwrap();
        assert!(t.verify_signature(&d.public_key()));
    }

    #[test]
    fn test_edit_opens_one_revision() {
        let d = device(1);
        let mut t = draft();
        t.sign_at(&d, 2_000).unwrap();
        let v1 = t.hash.unwrap();

        t.set_title("fr", "Remplacer la batterie");
        t.translate_step(0, "fr", "Retirer le capot").unwrap();
        t.add_tool(product_id("tool", "iFixit", "Spudger"), 1);
        assert_eq!(t.generation, 2);
        assert_eq!(t.parent_hash, Some(v1));
        assert_eq!(t.hash, None);

        t.sign_at(&d, 3_000).unwrap();
        assert_ne!(t.hash, Some(v1));
        assert_eq!(t.generation, 2);
    }

    #[test]
    fn test_translate_missing_step() {
        let mut t = draft();
        let err = t.translate_step(7, "fr", "x").unwrap_err();
        assert!(matches!(err, CoreError::StepNotFound(7)));
    }

    #[test]
    fn test_add_tool_replaces_quantity() {
        let mut t = draft();
        let screwdriver = product_id("tool", "Wera", "PH00");
        t.add_tool(screwdriver, 1);
        t.add_tool(screwdriver, 2);
        assert_eq!(t.tools.len(), 1);
        assert_eq!(t.tools[0].quantity, 2);
    }

    #[test]
    fn test_tampered_content_detected() {
        let d = device(1);
        let mut t = draft();
        t.sign_at(&d, 2_000).unwrap();

        let mut tampered = t.clone();
        tampered.steps[0].text.insert("en".into(), "Hit it with a hammer".into());
        assert!(tampered.verify_hash().is_err());
        assert!(!tampered.verify_signature(&d.public_key()));
    }

    #[test]
    fn test_hash_excludes_signature_and_hash() {
        let mut t = draft();
        let before = t.content_hash().unwrap();
        t.hash = Some(Blake3Hash::from_bytes([1; 32]));
        t.signature = Ed25519Signature::from_bytes([2; 64]);
        assert_eq!(before, t.content_hash().unwrap());
    }

    #[test]
    fn test_version_hash_of_signed_tutorial() {
        let mut t = draft();
        t.sign_at(&device(1), 2_000).unwrap();
        assert_eq!(t.version_hash().unwrap(), t.hash.unwrap());
    }
}
