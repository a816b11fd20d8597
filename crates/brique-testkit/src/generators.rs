//! Proptest generators for property-based testing.

use proptest::prelude::*;

use brique_core::{Identity, IdentityId, IdentityKind, Product, RecordId, Tutorial};

/// Generate a device identity.
pub fn device() -> impl Strategy<Value = Identity> {
    any::<[u8; 32]>().prop_map(|seed| Identity::from_seed(IdentityKind::Device, &seed))
}

/// Generate a RecordId.
pub fn record_id() -> impl Strategy<Value = RecordId> {
    any::<[u8; 32]>().prop_map(RecordId::from_bytes)
}

/// Generate a plausible timestamp in unix milliseconds.
pub fn timestamp() -> impl Strategy<Value = i64> {
    1i64..=1_900_000_000_000i64
}

/// Generate a language code.
pub fn lang() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("en".to_string()),
        Just("fr".to_string()),
        Just("de".to_string()),
        Just("es".to_string()),
    ]
}

/// Generate a permission list, including empty strings and duplicates.
pub fn permissions() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z_]{0,8}", 0..5)
}

/// Generate an unsigned product.
pub fn product() -> impl Strategy<Value = Product> {
    (
        "[a-z]{1,10}",
        "[A-Z][a-z]{0,10}",
        "[A-Za-z0-9 ]{1,12}",
        prop::collection::btree_map("[a-z]{1,8}", "[a-z0-9 ]{0,12}", 0..4),
    )
        .prop_map(|(category, manufacturer, name, specs)| {
            let mut product = Product::new(&category, &manufacturer, &name);
            product.data.specs = specs;
            product
        })
}

/// Generate an unsigned tutorial with a title and up to four steps.
pub fn tutorial() -> impl Strategy<Value = Tutorial> {
    (
        record_id(),
        any::<[u8; 32]>(),
        timestamp(),
        lang(),
        "[A-Za-z ]{1,24}",
        prop::collection::vec("[A-Za-z ,.]{1,40}", 0..4),
    )
        .prop_map(|(target, author, created_at, lang, title, steps)| {
            let author = IdentityId::from_bytes(author);
            let mut tutorial = Tutorial::new(target, &author, created_at);
            tutorial.set_title(&lang, &title);
            for text in &steps {
                tutorial.add_step(None, &lang, text);
            }
            tutorial
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use brique_core::{product_id, SignedRecord};
    use brique_trust::select_best_tutorial_version;

    use crate::fixtures::Workshop;

    /// Versions of one tutorial: each workshop edits the shared original.
    fn versions(editors: &[Workshop], edits: &[(usize, u8)]) -> Vec<Tutorial> {
        let target = product_id("phone", "Fairphone", "FP4");
        let original = editors[0].signed_tutorial(target, "Replace Battery", 1_000);
        let mut out = vec![original.clone()];
        for (i, (editor, rounds)) in edits.iter().enumerate() {
            let w = &editors[*editor % editors.len()];
            let mut version = original.clone();
            for round in 0..*rounds {
                version.set_title("fr", &format!("Batterie {}-{}", i, round));
                version
                    .sign_at(&w.device, 2_000 + i as i64)
                    .expect("tutorial encodes canonically");
            }
            out.push(version);
        }
        out
    }

    proptest! {
        #[test]
        fn products_have_derived_ids(p in product()) {
            prop_assert!(p.has_derived_id());
        }

        #[test]
        fn generated_tutorials_are_unsealed(t in tutorial()) {
            prop_assert_eq!(t.generation, 1);
            prop_assert!(t.hash.is_none());
        }

        #[test]
        fn best_version_ignores_arrival_order(
            edits in prop::collection::vec((0usize..3, 1u8..4), 1..6),
            trusted_mask in 0u8..8,
            seed in any::<u64>(),
        ) {
            let editors = crate::fixtures::workshops(3);
            let all = versions(&editors, &edits);
            let trusted: HashSet<_> = editors
                .iter()
                .enumerate()
                .filter(|(i, _)| trusted_mask & (1 << i) != 0)
                .map(|(_, w)| w.device.id())
                .collect();

            let mut rotated = all.clone();
            let len = rotated.len();
            rotated.rotate_left((seed % len as u64) as usize);
            rotated.reverse();

            let any_trusted = all.iter().any(|t| trusted.contains(&t.author()));
            let forward = select_best_tutorial_version(all, &trusted);
            let shuffled = select_best_tutorial_version(rotated, &trusted);
            prop_assert_eq!(forward.as_ref().map(|t| t.hash), shuffled.as_ref().map(|t| t.hash));

            // A trusted author beats every untrusted one.
            if let Some(best) = forward {
                prop_assert_eq!(trusted.contains(&best.author()), any_trusted);
            }
        }
    }
}
