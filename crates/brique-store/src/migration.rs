//! Database schema migrations for SQLite.
//!
//! Each migration transforms the schema from version N to N+1. Applied
//! versions are recorded in `schema_migrations`.

use rusqlite::Connection;

use brique_core::now_millis;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema. Idempotent.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema {} is newer than supported {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
        tracing::debug!(from = current, to = CURRENT_VERSION, "migrated schema");
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Primary copy of each product
        CREATE TABLE products (
            product_id BLOB PRIMARY KEY,      -- 32 bytes, blake3("category:manufacturer:name")
            category TEXT NOT NULL,
            updated_at INTEGER NOT NULL,      -- crdt_meta.updated_at (Unix ms)
            author BLOB NOT NULL,             -- 32 bytes, author device id
            body BLOB NOT NULL                -- CBOR-serialized Product
        );

        -- Primary version of each tutorial
        CREATE TABLE tutorials (
            tutorial_id BLOB PRIMARY KEY,
            target_product BLOB NOT NULL,
            updated_at INTEGER NOT NULL,
            author BLOB NOT NULL,
            hash BLOB NOT NULL,               -- content hash of the primary version
            body BLOB NOT NULL
        );

        -- Every tutorial version ever ingested
        CREATE TABLE tutorial_versions (
            hash BLOB PRIMARY KEY,
            tutorial_id BLOB NOT NULL,
            generation INTEGER NOT NULL,
            parent_hash BLOB,
            author BLOB NOT NULL,
            updated_at INTEGER NOT NULL,
            body BLOB NOT NULL,
            indexed_at INTEGER NOT NULL       -- local time of first ingestion
        );

        CREATE TABLE peers (
            peer_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            address TEXT NOT NULL,
            last_seen INTEGER NOT NULL,
            last_sync INTEGER,                -- NULL until the first completed sync
            trusted INTEGER NOT NULL DEFAULT 0
        );

        -- Append-only audit trail, one row per sync attempt
        CREATE TABLE sync_log (
            entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
            peer_id TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            items_received INTEGER NOT NULL,
            items_sent INTEGER NOT NULL,
            conflicts INTEGER NOT NULL,
            rejected INTEGER NOT NULL,
            duration_ms INTEGER NOT NULL,
            error TEXT
        );

        CREATE INDEX idx_products_updated ON products(updated_at);
        CREATE INDEX idx_tutorials_updated ON tutorials(updated_at);
        CREATE INDEX idx_tutorial_versions_tutorial ON tutorial_versions(tutorial_id);
        CREATE INDEX idx_sync_log_peer ON sync_log(peer_id, timestamp);
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "products",
            "tutorials",
            "tutorial_versions",
            "peers",
            "sync_log",
            "schema_migrations",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {}", table);
        }
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_newer_schema_refused() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (99, 0)",
            [],
        )
        .unwrap();

        assert!(matches!(migrate(&mut conn), Err(StoreError::Migration(_))));
    }
}
