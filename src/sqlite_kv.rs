// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQLite-backed [`KvStore`].
//!
//! One table, one row per key:
//!
//! ```text
//! kv(key TEXT PRIMARY KEY, value BLOB NOT NULL, updated_at INTEGER NOT NULL)
//! ```
//!
//! Writes are single-row upserts, so a crash mid-save leaves the previous
//! value in place.
//!
//! # SQLite Busy Handling
//!
//! SQLITE_BUSY/SQLITE_LOCKED are retried with exponential backoff
//! (5 attempts, 10ms doubling to a 500ms cap). Other errors surface
//! immediately as [`KvError`].

use crate::config::KvConfig;
use crate::error::{QuoteSyncError, Result};
use crate::kv::{BoxFuture, KvError, KvStore};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

const SQLITE_RETRY_MAX_ATTEMPTS: u32 = 5;
const SQLITE_RETRY_BASE_DELAY_MS: u64 = 10;
const SQLITE_RETRY_MAX_DELAY_MS: u64 = 500;

fn is_sqlite_busy_error(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db_err) => {
            // SQLITE_BUSY = 5, SQLITE_LOCKED = 6
            if let Some(code) = db_err.code() {
                return code == "5" || code == "6";
            }
            let msg = db_err.message().to_lowercase();
            msg.contains("database is locked") || msg.contains("database is busy")
        }
        _ => false,
    }
}

async fn execute_with_retry<F, Fut, T>(operation_name: &str, mut f: F) -> std::result::Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, sqlx::Error>>,
{
    let mut attempts = 0;
    let mut delay_ms = SQLITE_RETRY_BASE_DELAY_MS;

    loop {
        attempts += 1;
        match f().await {
            Ok(result) => {
                if attempts > 1 {
                    debug!(operation = operation_name, attempts, "SQLite operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if is_sqlite_busy_error(&e) && attempts < SQLITE_RETRY_MAX_ATTEMPTS => {
                warn!(
                    operation = operation_name,
                    attempts,
                    max_attempts = SQLITE_RETRY_MAX_ATTEMPTS,
                    delay_ms,
                    "SQLite busy, retrying"
                );
                crate::metrics::kv_retries_total(operation_name);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = (delay_ms * 2).min(SQLITE_RETRY_MAX_DELAY_MS);
            }
            Err(e) => {
                if is_sqlite_busy_error(&e) {
                    warn!(operation = operation_name, attempts, "SQLite busy, max retries exceeded");
                }
                return Err(e);
            }
        }
    }
}

fn open_error(e: sqlx::Error) -> QuoteSyncError {
    QuoteSyncError::persistence("sqlite", e.to_string())
}

/// Durable KV store on a SQLite pool.
pub struct SqliteKv {
    pool: SqlitePool,
    path: String,
}

impl SqliteKv {
    /// Open (creating if needed) the database described by `config`.
    pub async fn open(config: &KvConfig) -> Result<Self> {
        let path = config.sqlite_path.clone();
        info!(path = %path, wal = config.wal_mode, "Opening SQLite KV store");

        let in_memory = path == ":memory:";
        let url = if in_memory {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{}?mode=rwc", path)
        };

        let mut options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| QuoteSyncError::Config(format!("Invalid SQLite path: {}", e)))?
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .create_if_missing(true);
        if config.wal_mode && !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // Each in-memory connection is its own database, so pin to one.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(2)
        };

        let pool = pool_options.connect_with(options).await.map_err(open_error)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(open_error)?;

        Ok(Self { pool, path })
    }

    /// Get database path (for diagnostics).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Number of stored keys.
    pub async fn len(&self) -> Result<usize> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM kv")
            .fetch_one(&self.pool)
            .await
            .map_err(open_error)?;
        Ok(count.max(0) as usize)
    }

    /// Force flush WAL to main database (for clean shutdown).
    pub async fn checkpoint(&self) -> Result<()> {
        let pool = &self.pool;
        execute_with_retry("kv_checkpoint", || async {
            sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)").execute(pool).await
        })
        .await
        .map_err(open_error)?;

        debug!("WAL checkpoint complete");
        Ok(())
    }

    /// Checkpoint and close the pool.
    pub async fn close(&self) {
        if let Err(e) = self.checkpoint().await {
            warn!(error = %e, "Failed to checkpoint WAL on close");
        }
        self.pool.close().await;
        info!(path = %self.path, "SQLite KV store closed");
    }
}

impl KvStore for SqliteKv {
    fn load(&self, key: &str) -> BoxFuture<'_, Option<Vec<u8>>> {
        let key = key.to_string();
        Box::pin(async move {
            let pool = &self.pool;
            let row: Option<(Vec<u8>,)> = execute_with_retry("kv_load", || async {
                sqlx::query_as("SELECT value FROM kv WHERE key = ?")
                    .bind(&key)
                    .fetch_optional(pool)
                    .await
            })
            .await
            .map_err(|e| KvError(e.to_string()))?;
            Ok(row.map(|(value,)| value))
        })
    }

    fn save(&self, key: &str, value: Vec<u8>) -> BoxFuture<'_, ()> {
        let key = key.to_string();
        Box::pin(async move {
            let pool = &self.pool;
            let now = chrono::Utc::now().timestamp_millis();
            execute_with_retry("kv_save", || async {
                sqlx::query(
                    r#"
                    INSERT INTO kv (key, value, updated_at)
                    VALUES (?, ?, ?)
                    ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(&key)
                .bind(&value)
                .bind(now)
                .execute(pool)
                .await
            })
            .await
            .map_err(|e| KvError(e.to_string()))?;
            debug!(key = %key, bytes = value.len(), "KV entry saved");
            Ok(())
        })
    }
}
