//! # Brique Store
//!
//! Storage abstraction for Brique. Provides a trait-based interface for
//! record, peer and sync-history persistence with SQLite and in-memory
//! implementations.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage
//! - [`InsertResult`] - Result of indexing a tutorial version
//!
//! ## Usage
//!
//! ```rust,no_run
//! use brique_store::{SqliteStore, Store};
//!
//! async fn example() {
//!     let store = SqliteStore::open("brique.db").unwrap();
//!     let pending = store.changes_since(0).await.unwrap();
//!     println!("{} records to offer", pending.len());
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Primary slot + version index**: each product and tutorial has one
//!   primary copy; every tutorial version is also indexed by hash and never
//!   deleted.
//! - **No policy**: the store never compares timestamps. The merge engine
//!   decides what to write.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{InsertResult, Store, StoreExt};
