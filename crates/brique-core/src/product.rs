//! Products: real-world objects that tutorials repair.

use ciborium::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::canonical::{self, keys, RECORD_SCHEMA_VERSION};
use crate::crypto::{Blake3Hash, Ed25519Signature};
use crate::record::{CrdtMeta, RecordKind, SignedRecord};
use crate::types::RecordId;

/// Deterministic product id: `blake3("category:manufacturer:name")`.
///
/// No case or whitespace normalization; "FP4" and "fp4" are different products.
pub fn product_id(category: &str, manufacturer: &str, name: &str) -> RecordId {
    let key = format!("{}:{}:{}", category, manufacturer, name);
    RecordId(Blake3Hash::hash(key.as_bytes()).0)
}

/// Descriptive fields of a product.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProductData {
    pub name: String,
    pub manufacturer: String,
    /// Free-form specifications, e.g. `battery -> 3905 mAh`.
    pub specs: BTreeMap<String, String>,
}

/// A product record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub schema_version: u64,
    pub id: RecordId,
    pub category: String,
    pub data: ProductData,
    /// Attached resources by kind, e.g. `manual -> [asset hashes]`.
    pub resources: BTreeMap<String, Vec<String>>,
    pub crdt_meta: CrdtMeta,
    pub signature: Ed25519Signature,
}

impl Product {
    /// A new, unsigned product. The id is derived from the three arguments.
    pub fn new(category: &str, manufacturer: &str, name: &str) -> Self {
        Self {
            schema_version: RECORD_SCHEMA_VERSION,
            id: product_id(category, manufacturer, name),
            category: category.to_owned(),
            data: ProductData {
                name: name.to_owned(),
                manufacturer: manufacturer.to_owned(),
                specs: BTreeMap::new(),
            },
            resources: BTreeMap::new(),
            crdt_meta: CrdtMeta::UNSIGNED,
            signature: Ed25519Signature::ZERO,
        }
    }

    pub fn with_spec(mut self, key: &str, value: &str) -> Self {
        self.data.specs.insert(key.to_owned(), value.to_owned());
        self
    }

    pub fn with_resource(mut self, kind: &str, reference: &str) -> Self {
        self.add_resource(kind, reference);
        self
    }

    /// Attach a resource reference, ignoring exact duplicates.
    pub fn add_resource(&mut self, kind: &str, reference: &str) {
        let refs = self.resources.entry(kind.to_owned()).or_default();
        if !refs.iter().any(|r| r == reference) {
            refs.push(reference.to_owned());
        }
    }

    /// True if `id` matches the category, manufacturer and name.
    pub fn has_derived_id(&self) -> bool {
        self.id == product_id(&self.category, &self.data.manufacturer, &self.data.name)
    }
}

impl SignedRecord for Product {
    const KIND: RecordKind = RecordKind::Product;

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
        use keys::product as k;

        let data = canonical::tagged(vec![
            (k::NAME, canonical::text(&self.data.name)),
            (k::MANUFACTURER, canonical::text(&self.data.manufacturer)),
            (k::SPECS, canonical::text_map(&self.data.specs)),
        ]);

        let resources = Value::Map(
            self.resources
                .iter()
                .map(|(kind, refs)| {
                    let refs = refs.iter().map(|r| canonical::text(r)).collect();
                    (canonical::text(kind), Value::Array(refs))
                })
                .collect(),
        );

        canonical::tagged(vec![
            (keys::SCHEMA_VERSION, canonical::uint(self.schema_version)),
            (keys::KIND, canonical::uint(RecordKind::Product.to_u8().into())),
            (keys::ID, canonical::bytes(self.id.as_bytes())),
            (k::CATEGORY, canonical::text(&self.category)),
            (k::DATA, data),
            (k::RESOURCES, resources),
            (k::CRDT_META, self.crdt_meta.to_cbor()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_product_id_is_pure() {
        let a = product_id("phone", "Fairphone", "FP4");
        let b = product_id("phone", "Fairphone", "FP4");
        assert_eq!(a, b);
        assert_eq!(a.0, *blake3::hash(b"phone:Fairphone:FP4").as_bytes());
    }

    #[test]
    fn test_product_id_not_normalized() {
        assert_ne!(
            product_id("phone", "Fairphone", "FP4"),
            product_id("phone", "fairphone", "FP4")
        );
        assert_ne!(
            product_id("phone", "Fairphone", "FP4"),
            product_id("phone", "Fairphone", "FP4 ")
        );
    }

    #[test]
    fn test_new_product_has_derived_id() {
        let p = Product::new("laptop", "Framework", "13");
        assert!(p.has_derived_id());
        assert_eq!(p.id, product_id("laptop", "Framework", "13"));
    }

    #[test]
    fn test_resources_deduplicated() {
        let p = Product::new("laptop", "Framework", "13")
            .with_resource("manual", "abc")
            .with_resource("manual", "abc")
            .with_resource("manual", "def");
        assert_eq!(p.resources["manual"], vec!["abc", "def"]);
    }

    #[test]
    fn test_canonical_bytes_deterministic() {
        let p = Product::new("laptop", "Framework", "13")
            .with_spec("cpu", "i5")
            .with_spec("ram", "16GB");
        let q = Product::new("laptop", "Framework", "13")
            .with_spec("ram", "16GB")
            .with_spec("cpu", "i5");
        assert_eq!(p.canonical_bytes().unwrap(), q.canonical_bytes().unwrap());
    }

    #[test]
    fn test_canonical_excludes_signature() {
        let mut p = Product::new("laptop", "Framework", "13");
        let before = p.canonical_bytes().unwrap();
        p.signature = Ed25519Signature::from_bytes([7; 64]);
        assert_eq!(before, p.canonical_bytes().unwrap());
    }

    #[test]
    fn test_canonical_header() {
        let bytes = Product::new("a", "b", "c").canonical_bytes().unwrap();
        // map(7), tag 0 -> 1, tag 1 -> 1 (product)
        assert_eq!(&bytes[..5], &[0xa7, 0x00, 0x01, 0x01, 0x01]);
    }

    proptest! {
        #[test]
        fn product_id_matches_literal_triple(
            cat in "[a-zA-Z ]{0,12}",
            mfr in "[a-zA-Z ]{0,12}",
            name in "[a-zA-Z0-9 ]{0,12}",
        ) {
            let literal = format!("{}:{}:{}", cat, mfr, name);
            prop_assert_eq!(
                product_id(&cat, &mfr, &name).0,
                *blake3::hash(literal.as_bytes()).as_bytes()
            );
        }
    }
}
