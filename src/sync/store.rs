//! Fingerprint persistence.
//!
//! Constructor-injected stores with explicit lifecycles instead of
//! module-level singletons. The SQLite store survives process restarts so
//! incremental syncs do not degenerate into full re-embeds.

use crate::error::{JoblensError, Result};
use crate::model::OrderFingerprint;
use ahash::AHashMap;
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;
use std::sync::Mutex;

/// Storage for known order fingerprints
pub trait FingerprintStore: Send + Sync {
    fn load_all(&self) -> Result<Vec<OrderFingerprint>>;

    fn upsert(&self, fingerprints: &[OrderFingerprint]) -> Result<()>;

    fn remove(&self, order_ids: &[String]) -> Result<()>;

    /// Drop every fingerprint; used by full rebuilds
    fn clear(&self) -> Result<()>;

    fn count(&self) -> Result<usize>;
}

/// Volatile in-memory store for tests and ephemeral runs
#[derive(Default)]
pub struct MemoryFingerprintStore {
    fingerprints: Mutex<AHashMap<String, OrderFingerprint>>,
}

impl MemoryFingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FingerprintStore for MemoryFingerprintStore {
    fn load_all(&self) -> Result<Vec<OrderFingerprint>> {
        Ok(self.fingerprints.lock().unwrap().values().cloned().collect())
    }

    fn upsert(&self, fingerprints: &[OrderFingerprint]) -> Result<()> {
        let mut map = self.fingerprints.lock().unwrap();
        for fp in fingerprints {
            map.insert(fp.order_id.clone(), fp.clone());
        }
        Ok(())
    }

    fn remove(&self, order_ids: &[String]) -> Result<()> {
        let mut map = self.fingerprints.lock().unwrap();
        for id in order_ids {
            map.remove(id);
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.fingerprints.lock().unwrap().clear();
        Ok(())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.fingerprints.lock().unwrap().len())
    }
}

/// Durable SQLite-backed store
pub struct SqliteFingerprintStore {
    pool: Pool<SqliteConnectionManager>,
}

/// Schema migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: fingerprint table
    r#"
    CREATE TABLE fingerprints (
        order_id TEXT PRIMARY KEY,
        content_hash TEXT NOT NULL,
        last_seen_at TEXT NOT NULL
    );

    CREATE INDEX idx_fingerprints_last_seen ON fingerprints(last_seen_at);
    "#,
];

impl SqliteFingerprintStore {
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| JoblensError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .map_err(|e| JoblensError::Config(format!("Failed to create connection pool: {}", e)))?;

        {
            let conn = pool
                .get()
                .map_err(|e| JoblensError::Config(format!("Failed to get connection: {}", e)))?;
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
        }

        let store = Self { pool };
        store.migrate()?;
        Ok(store)
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| JoblensError::Config(format!("Failed to get connection: {}", e)))
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM _migrations",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;
            if version > current_version {
                tracing::info!("Applying fingerprint store migration {}", version);
                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }
        Ok(())
    }
}

impl FingerprintStore for SqliteFingerprintStore {
    fn load_all(&self) -> Result<Vec<OrderFingerprint>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT order_id, content_hash, last_seen_at FROM fingerprints")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut fingerprints = Vec::new();
        for row in rows {
            let (order_id, content_hash, last_seen_at) = row?;
            let last_seen_at = last_seen_at
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|_| Utc::now());
            fingerprints.push(OrderFingerprint {
                order_id,
                content_hash,
                last_seen_at,
            });
        }
        Ok(fingerprints)
    }

    fn upsert(&self, fingerprints: &[OrderFingerprint]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for fp in fingerprints {
            tx.execute(
                "INSERT INTO fingerprints (order_id, content_hash, last_seen_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(order_id) DO UPDATE SET
                     content_hash = excluded.content_hash,
                     last_seen_at = excluded.last_seen_at",
                params![fp.order_id, fp.content_hash, fp.last_seen_at.to_rfc3339()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn remove(&self, order_ids: &[String]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for id in order_ids {
            tx.execute("DELETE FROM fingerprints WHERE order_id = ?1", params![id])?;
        }
        tx.commit()?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM fingerprints", [])?;
        Ok(())
    }

    fn count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM fingerprints", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fp(id: &str, hash: &str) -> OrderFingerprint {
        OrderFingerprint {
            order_id: id.to_string(),
            content_hash: hash.to_string(),
            last_seen_at: Utc::now(),
        }
    }

    fn exercise_store(store: &dyn FingerprintStore) {
        assert_eq!(store.count().unwrap(), 0);

        store.upsert(&[fp("1", "aaa"), fp("2", "bbb")]).unwrap();
        assert_eq!(store.count().unwrap(), 2);

        // Upsert replaces
        store.upsert(&[fp("1", "ccc")]).unwrap();
        let all = store.load_all().unwrap();
        let one = all.iter().find(|f| f.order_id == "1").unwrap();
        assert_eq!(one.content_hash, "ccc");
        assert_eq!(store.count().unwrap(), 2);

        store.remove(&["2".to_string()]).unwrap();
        assert_eq!(store.count().unwrap(), 1);

        store.clear().unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_memory_store() {
        exercise_store(&MemoryFingerprintStore::new());
    }

    #[test]
    fn test_sqlite_store() {
        let temp = TempDir::new().unwrap();
        let store = SqliteFingerprintStore::new(&temp.path().join("fp.db")).unwrap();
        exercise_store(&store);
    }

    #[test]
    fn test_sqlite_store_persists_across_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("fp.db");

        {
            let store = SqliteFingerprintStore::new(&path).unwrap();
            store.upsert(&[fp("1", "aaa")]).unwrap();
        }

        let reopened = SqliteFingerprintStore::new(&path).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
    }
}
