//! Persistent translation store backed by SQLite.
//! TTL: 7 days by default. Key: translation cache key (`movie_603`, ...).
//! Survives restarts, unlike the in-memory store.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use super::{BackendError, StoreStats, TranslationData};
use crate::media::CacheKey;

/// Default TTL for persisted translations: 7 days.
const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

pub struct SqliteTranslationStore {
    conn: Mutex<Connection>,
    ttl: Duration,
}

impl SqliteTranslationStore {
    /// Open (or create) the store at the given path.
    pub fn open(db_path: &Path) -> Result<Self, BackendError> {
        let conn = Connection::open(db_path).map_err(|e| {
            BackendError::Storage(format!("failed to open translation store: {e}"))
        })?;

        // WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| BackendError::Storage(format!("PRAGMA failed: {e}")))?;

        let store = Self::with_connection(conn)?;
        info!(path = %db_path.display(), "translation store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, BackendError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| BackendError::Storage(format!("failed to open in-memory store: {e}")))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, BackendError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS translation_cache (
                id TEXT PRIMARY KEY,
                title TEXT,
                overview TEXT,
                tagline TEXT,
                updated_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_translation_expires
                ON translation_cache(expires_at);",
        )
        .map_err(|e| BackendError::Storage(format!("create table failed: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
            ttl: DEFAULT_TTL,
        })
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Look up a persisted translation. Expired rows read as absent.
    pub fn get(&self, key: &CacheKey) -> Result<Option<TranslationData>, BackendError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT title, overview, tagline, updated_at FROM translation_cache
                 WHERE id = ?1 AND expires_at > ?2",
                params![key.as_str(), now_millis() as i64],
                |row| {
                    Ok(TranslationData {
                        title: row.get(0)?,
                        overview: row.get(1)?,
                        tagline: row.get(2)?,
                        updated_at: row.get::<_, i64>(3)? as u64,
                    })
                },
            )
            .optional()
            .map_err(|e| BackendError::Storage(format!("lookup failed: {e}")))?;

        if row.is_some() {
            debug!(key = %key, "translation store hit");
        }
        Ok(row)
    }

    pub fn insert(&self, key: &CacheKey, data: &TranslationData) -> Result<(), BackendError> {
        let conn = self.conn.lock();
        let now = now_millis() as i64;
        let expires_at = now + self.ttl.as_millis() as i64;
        conn.execute(
            "INSERT OR REPLACE INTO translation_cache
             (id, title, overview, tagline, updated_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                key.as_str(),
                data.title,
                data.overview,
                data.tagline,
                data.updated_at as i64,
                expires_at
            ],
        )
        .map_err(|e| BackendError::Storage(format!("insert failed: {e}")))?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn lock_connection(&self) -> parking_lot::MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    /// Remove expired rows; returns how many were removed.
    pub fn cleanup_expired(&self) -> Result<u32, BackendError> {
        let conn = self.conn.lock();
        let removed = conn
            .execute(
                "DELETE FROM translation_cache WHERE expires_at <= ?1",
                params![now_millis() as i64],
            )
            .map_err(|e| BackendError::Storage(format!("cleanup failed: {e}")))?;
        if removed > 0 {
            info!(removed, "translation store cleanup");
        }
        Ok(removed as u32)
    }

    pub fn stats(&self) -> Result<StoreStats, BackendError> {
        let conn = self.conn.lock();
        let (total, expired): (i64, i64) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(expires_at <= ?1), 0) FROM translation_cache",
                params![now_millis() as i64],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| BackendError::Storage(format!("stats query failed: {e}")))?;
        Ok(StoreStats {
            total: total as u32,
            expired: expired as u32,
        })
    }

    /// Start a background cleanup loop on its own thread.
    pub fn start_cleanup_loop(store: Arc<Self>, every: Duration) -> Result<(), BackendError> {
        std::thread::Builder::new()
            .name("translation-store-cleanup".into())
            .spawn(move || loop {
                std::thread::sleep(every);
                if let Err(e) = store.cleanup_expired() {
                    warn!(error = %e, "translation store cleanup failed");
                }
            })
            .map(|_| ())
            .map_err(|e| BackendError::Storage(format!("failed to spawn cleanup thread: {e}")))
    }
}

/// Current time as Unix milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
