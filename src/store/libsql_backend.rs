//! libSQL store backend: externalized, TTL'd, atomically-testable entries.
//!
//! Markers survive process restarts, and `set_if_absent` is a single upsert
//! statement, so the claim-once guarantee holds across every process sharing
//! the database.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::store::kv::KvStore;
use crate::store::migrations;

/// Expiry sentinel for entries that never expire.
const NEVER: i64 = 0;

/// libSQL-backed `KvStore`. Expiry is stored as unix milliseconds; `0`
/// means the entry is immortal (credential namespace).
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Backend(format!("Failed to create ledger directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to open ledger database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Backend(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run(&store.conn).await?;
        info!(path = %path.display(), "Ledger database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn open_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to create in-memory ledger: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Backend(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run(&store.conn).await?;
        Ok(store)
    }

    /// Delete expired entries. Returns the number removed.
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        self.conn
            .execute(
                "DELETE FROM kv_entries WHERE expires_at != ?1 AND expires_at <= ?2",
                params![NEVER, now_millis()],
            )
            .await
            .map_err(backend_err)
    }

    /// Spawn a background sweep purging expired entries on an interval.
    pub fn spawn_purge_task(
        store: Arc<Self>,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // the first tick fires immediately
            loop {
                ticker.tick().await;
                match store.purge_expired().await {
                    Ok(0) => {}
                    Ok(n) => debug!(purged = n, "Purged expired ledger entries"),
                    Err(e) => warn!(error = %e, "Ledger purge failed"),
                }
            }
        })
    }
}

fn backend_err(e: libsql::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn expiry_for(ttl: Option<Duration>) -> i64 {
    match ttl {
        Some(ttl) => now_millis() + ttl.as_millis() as i64,
        None => NEVER,
    }
}

#[async_trait]
impl KvStore for LibSqlStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT value FROM kv_entries
                 WHERE key = ?1 AND (expires_at = ?2 OR expires_at > ?3)",
                params![key, NEVER, now_millis()],
            )
            .await
            .map_err(backend_err)?;
        match rows.next().await.map_err(backend_err)? {
            Some(row) => Ok(Some(row.get(0).map_err(backend_err)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO kv_entries (key, value, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE
                 SET value = excluded.value, expires_at = excluded.expires_at",
                params![key, value, expiry_for(ttl)],
            )
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let affected = self
            .conn
            .execute(
                "DELETE FROM kv_entries
                 WHERE key = ?1 AND (expires_at = ?2 OR expires_at > ?3)",
                params![key, NEVER, now_millis()],
            )
            .await
            .map_err(backend_err)?;
        Ok(affected > 0)
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        // Single upsert: a fresh insert or a takeover of an expired row
        // changes one row; a live holder changes none. This is the atomic
        // test-and-set the dedup and warn ledgers depend on.
        let now = now_millis();
        let affected = self
            .conn
            .execute(
                "INSERT INTO kv_entries (key, value, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE
                 SET value = excluded.value, expires_at = excluded.expires_at
                 WHERE kv_entries.expires_at != ?4 AND kv_entries.expires_at <= ?5",
                params![key, value, now + ttl.as_millis() as i64, NEVER, now],
            )
            .await
            .map_err(backend_err)?;
        Ok(affected > 0)
    }
}
