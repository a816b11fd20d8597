//! SQLite implementation of the Store trait.
//!
//! This is the persistent backend. It uses rusqlite with bundled SQLite,
//! wrapped in async via tokio::spawn_blocking. Record bodies are stored as
//! CBOR blobs next to the indexed columns the queries need.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use brique_core::{
    now_millis, Blake3Hash, Peer, PeerId, Product, Record, RecordId, SyncLogEntry, Tutorial,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{InsertResult, Store};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path, creating and migrating it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| {
                StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {}", e)),
                ))
            })?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn encode_body<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    ciborium::from_reader(body).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode_all<T: DeserializeOwned>(bodies: Vec<Vec<u8>>) -> Result<Vec<T>> {
    bodies.iter().map(|b| decode_body(b)).collect()
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn to_u64(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

fn row_to_peer(row: &rusqlite::Row<'_>) -> rusqlite::Result<Peer> {
    Ok(Peer {
        id: PeerId(row.get("peer_id")?),
        name: row.get("name")?,
        address: row.get("address")?,
        last_seen: row.get("last_seen")?,
        last_sync: row.get("last_sync")?,
        trusted: row.get::<_, i64>("trusted")? != 0,
    })
}

fn row_to_log_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncLogEntry> {
    Ok(SyncLogEntry {
        peer_id: PeerId(row.get("peer_id")?),
        timestamp: row.get("timestamp")?,
        items_received: to_u64(row.get("items_received")?),
        items_sent: to_u64(row.get("items_sent")?),
        conflicts: to_u64(row.get("conflicts")?),
        rejected: to_u64(row.get("rejected")?),
        duration_ms: to_u64(row.get("duration_ms")?),
        error: row.get("error")?,
    })
}

fn query_bodies(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Vec<u8>>> {
    let mut stmt = conn.prepare(sql)?;
    let bodies = stmt
        .query_map(params, |row| row.get::<_, Vec<u8>>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(bodies)
}

#[async_trait]
impl Store for SqliteStore {
    // ─────────────────────────────────────────────────────────────────────────
    // Products
    // ─────────────────────────────────────────────────────────────────────────

    async fn get_product(&self, id: &RecordId) -> Result<Option<Product>> {
        let id = *id;
        self.call(move |conn| {
            let body: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT body FROM products WHERE product_id = ?1",
                    params![id.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            body.map(|b| decode_body(&b)).transpose()
        })
        .await
    }

    async fn put_product(&self, product: &Product) -> Result<()> {
        let body = encode_body(product)?;
        let product_id = product.id;
        let category = product.category.clone();
        let meta = product.crdt_meta;

        self.call(move |conn| {
            conn.execute(
                "INSERT INTO products (product_id, category, updated_at, author, body)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(product_id) DO UPDATE SET
                    category = excluded.category,
                    updated_at = excluded.updated_at,
                    author = excluded.author,
                    body = excluded.body",
                params![
                    product_id.as_bytes().as_slice(),
                    category,
                    meta.updated_at,
                    meta.author_device_id.as_bytes().as_slice(),
                    body,
                ],
            )?;
            Ok(())
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tutorials
    // ─────────────────────────────────────────────────────────────────────────

    async fn get_tutorial(&self, id: &RecordId) -> Result<Option<Tutorial>> {
        let id = *id;
        self.call(move |conn| {
            let body: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT body FROM tutorials WHERE tutorial_id = ?1",
                    params![id.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            body.map(|b| decode_body(&b)).transpose()
        })
        .await
    }

    async fn put_tutorial(&self, tutorial: &Tutorial) -> Result<()> {
        let hash = tutorial
            .hash
            .ok_or_else(|| StoreError::InvalidData("tutorial has no hash".into()))?;
        let body = encode_body(tutorial)?;
        let tutorial_id = tutorial.id;
        let target = tutorial.target_product;
        let meta = tutorial.crdt_meta;

        self.call(move |conn| {
            conn.execute(
                "INSERT INTO tutorials (tutorial_id, target_product, updated_at, author, hash, body)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(tutorial_id) DO UPDATE SET
                    target_product = excluded.target_product,
                    updated_at = excluded.updated_at,
                    author = excluded.author,
                    hash = excluded.hash,
                    body = excluded.body",
                params![
                    tutorial_id.as_bytes().as_slice(),
                    target.as_bytes().as_slice(),
                    meta.updated_at,
                    meta.author_device_id.as_bytes().as_slice(),
                    hash.as_bytes().as_slice(),
                    body,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn insert_tutorial_version(&self, tutorial: &Tutorial) -> Result<InsertResult> {
        let hash = tutorial
            .hash
            .ok_or_else(|| StoreError::InvalidData("tutorial version has no hash".into()))?;
        let body = encode_body(tutorial)?;
        let tutorial_id = tutorial.id;
        let generation = to_i64(tutorial.generation);
        let parent = tutorial.parent_hash.map(|h| h.0.to_vec());
        let meta = tutorial.crdt_meta;

        self.call(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO tutorial_versions (
                    hash, tutorial_id, generation, parent_hash, author, updated_at, body, indexed_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    hash.as_bytes().as_slice(),
                    tutorial_id.as_bytes().as_slice(),
                    generation,
                    parent,
                    meta.author_device_id.as_bytes().as_slice(),
                    meta.updated_at,
                    body,
                    now_millis(),
                ],
            )?;
            Ok(if inserted == 1 {
                InsertResult::Inserted
            } else {
                InsertResult::AlreadyExists
            })
        })
        .await
    }

    async fn get_tutorial_version(&self, hash: &Blake3Hash) -> Result<Option<Tutorial>> {
        let hash = *hash;
        self.call(move |conn| {
            let body: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT body FROM tutorial_versions WHERE hash = ?1",
                    params![hash.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            body.map(|b| decode_body(&b)).transpose()
        })
        .await
    }

    async fn list_tutorial_versions(&self, id: &RecordId) -> Result<Vec<Tutorial>> {
        let id = *id;
        self.call(move |conn| {
            let bodies = query_bodies(
                conn,
                "SELECT body FROM tutorial_versions WHERE tutorial_id = ?1
                 ORDER BY generation ASC, hash ASC",
                params![id.as_bytes().as_slice()],
            )?;
            decode_all(bodies)
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Change sets
    // ─────────────────────────────────────────────────────────────────────────

    async fn changes_since(&self, since: i64) -> Result<Vec<Record>> {
        self.call(move |conn| {
            let products: Vec<Product> = decode_all(query_bodies(
                conn,
                "SELECT body FROM products WHERE updated_at > ?1",
                params![since],
            )?)?;
            let tutorials: Vec<Tutorial> = decode_all(query_bodies(
                conn,
                "SELECT body FROM tutorials WHERE updated_at > ?1",
                params![since],
            )?)?;

            let mut changes: Vec<Record> = products
                .into_iter()
                .map(Record::Product)
                .chain(tutorials.into_iter().map(Record::Tutorial))
                .collect();
            changes.sort_by_key(|r| (r.updated_at(), r.kind().to_u8(), r.id()));
            Ok(changes)
        })
        .await
    }

    async fn record_count(&self) -> Result<u64> {
        self.call(|conn| {
            let count: i64 = conn.query_row(
                "SELECT (SELECT COUNT(*) FROM products) + (SELECT COUNT(*) FROM tutorials)",
                [],
                |row| row.get(0),
            )?;
            Ok(to_u64(count))
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Peers
    // ─────────────────────────────────────────────────────────────────────────

    async fn get_peer(&self, id: &PeerId) -> Result<Option<Peer>> {
        let id = id.clone();
        self.call(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT * FROM peers WHERE peer_id = ?1",
                    params![id.0],
                    row_to_peer,
                )
                .optional()?)
        })
        .await
    }

    async fn upsert_peer(&self, peer: &Peer) -> Result<()> {
        let peer = peer.clone();
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO peers (peer_id, name, address, last_seen, last_sync, trusted)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(peer_id) DO UPDATE SET
                    name = excluded.name,
                    address = excluded.address,
                    last_seen = excluded.last_seen,
                    last_sync = excluded.last_sync,
                    trusted = excluded.trusted",
                params![
                    peer.id.0,
                    peer.name,
                    peer.address,
                    peer.last_seen,
                    peer.last_sync,
                    peer.trusted as i64,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_peers(&self) -> Result<Vec<Peer>> {
        self.call(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM peers ORDER BY last_seen DESC, peer_id ASC")?;
            let peers = stmt
                .query_map([], row_to_peer)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(peers)
        })
        .await
    }

    async fn remove_peer(&self, id: &PeerId) -> Result<bool> {
        let id = id.clone();
        self.call(move |conn| {
            let removed = conn.execute("DELETE FROM peers WHERE peer_id = ?1", params![id.0])?;
            Ok(removed > 0)
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sync log
    // ─────────────────────────────────────────────────────────────────────────

    async fn append_sync_log(&self, entry: &SyncLogEntry) -> Result<()> {
        let entry = entry.clone();
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO sync_log (
                    peer_id, timestamp, items_received, items_sent,
                    conflicts, rejected, duration_ms, error
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    entry.peer_id.0,
                    entry.timestamp,
                    to_i64(entry.items_received),
                    to_i64(entry.items_sent),
                    to_i64(entry.conflicts),
                    to_i64(entry.rejected),
                    to_i64(entry.duration_ms),
                    entry.error,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn sync_log(&self, peer: Option<&PeerId>, limit: usize) -> Result<Vec<SyncLogEntry>> {
        let peer = peer.cloned();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.call(move |conn| {
            let entries = match peer {
                Some(peer) => {
                    let mut stmt = conn.prepare(
                        "SELECT * FROM sync_log WHERE peer_id = ?1
                         ORDER BY timestamp DESC, entry_id DESC LIMIT ?2",
                    )?;
                    let rows = stmt.query_map(params![peer.0, limit], row_to_log_entry)?;
                    rows.collect::<rusqlite::Result<Vec<_>>>()?
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT * FROM sync_log ORDER BY timestamp DESC, entry_id DESC LIMIT ?1",
                    )?;
                    let rows = stmt.query_map(params![limit], row_to_log_entry)?;
                    rows.collect::<rusqlite::Result<Vec<_>>>()?
                }
            };
            Ok(entries)
        })
        .await
    }
}
