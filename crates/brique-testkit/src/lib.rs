//! # Brique Testkit
//!
//! Testing utilities for Brique.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Exact delegation canonical bytes for cross-platform verification
//! - **Generators**: Proptest strategies for identities, products and tutorials
//! - **Fixtures**: Seeded identities, delegated devices and ready-made records
//!
//! ## Golden Vectors
//!
//! ```rust
//! use brique_testkit::vectors::{delegation_vectors, verify_all_vectors};
//!
//! for (name, ok, hex) in verify_all_vectors() {
//!     assert!(ok, "{}: {}", name, hex);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use brique_testkit::generators::product;
//!
//! proptest! {
//!     #[test]
//!     fn ids_are_derived(p in product()) {
//!         prop_assert!(p.has_derived_id());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use brique_testkit::fixtures::Workshop;
//!
//! let workshop = Workshop::new(1);
//! let product = workshop.signed_product("phone", "Fairphone", "FP4", 1_000);
//! assert_eq!(product.crdt_meta.author_device_id, workshop.device.id());
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{workshops, Workshop};
pub use generators::{permissions, product, tutorial};
pub use vectors::{delegation_vectors, seeded_certificate, verify_all_vectors, DelegationVector};
