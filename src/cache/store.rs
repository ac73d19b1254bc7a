//! SQLite-backed response cache. One row per canonical query; readers get
//! the stored payload plus a staleness flag, writers upsert atomically.
//!
//! Keys are the SHA-256 of [`EventQuery::canonical_string`], so any change
//! to a query parameter produces a different row rather than a collision.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

use crate::common::error::{PipelineError, Result};
use crate::domain::{CuratedFeed, EventQuery};
use crate::observability::metrics;

/// A cache row as seen by readers.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub payload: CuratedFeed,
    pub updated_at: DateTime<Utc>,
    /// True when the entry is older than the configured staleness window.
    /// Stale entries are still served; the flag tells the client.
    pub is_stale: bool,
}

pub struct CacheStore {
    conn: Mutex<Connection>,
    staleness: Duration,
}

pub fn cache_key(query: &EventQuery) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.canonical_string().as_bytes());
    hex::encode(hasher.finalize())
}

impl CacheStore {
    pub fn open<P: AsRef<Path>>(path: P, staleness: Duration) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cache_entries (
                key         TEXT PRIMARY KEY,
                params_json TEXT NOT NULL,
                payload     TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            staleness,
        })
    }

    /// In-memory store for tests.
    pub fn open_in_memory(staleness: Duration) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cache_entries (
                key         TEXT PRIMARY KEY,
                params_json TEXT NOT NULL,
                payload     TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            staleness,
        })
    }

    /// Fetch the entry for a query, if one has ever been built.
    pub fn get(&self, query: &EventQuery) -> Result<Option<CachedResponse>> {
        let key = cache_key(query);
        let conn = self.lock();
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT payload, updated_at FROM cache_entries WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((payload_json, updated_raw)) = row else {
            metrics::cache::miss();
            return Ok(None);
        };

        let payload: CuratedFeed = serde_json::from_str(&payload_json)?;
        let updated_at = DateTime::parse_from_rfc3339(&updated_raw)
            .map_err(|e| PipelineError::Config(format!("corrupt cache timestamp: {}", e)))?
            .with_timezone(&Utc);

        let age = Utc::now().signed_duration_since(updated_at);
        let is_stale = age.to_std().map_or(false, |a| a > self.staleness);
        if is_stale {
            metrics::cache::stale_served();
        } else {
            metrics::cache::hit();
        }

        Ok(Some(CachedResponse {
            payload,
            updated_at,
            is_stale,
        }))
    }

    /// Write (or overwrite) the entry for a query. Idempotent: writing the
    /// same feed twice leaves one row.
    pub fn set(&self, query: &EventQuery, feed: &CuratedFeed) -> Result<()> {
        let key = cache_key(query);
        let params_json = serde_json::to_string(query)?;
        let payload = serde_json::to_string(feed)?;
        let updated_at = Utc::now().to_rfc3339();

        let result = self.lock().execute(
            "INSERT INTO cache_entries (key, params_json, payload, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                params_json = excluded.params_json,
                payload     = excluded.payload,
                updated_at  = excluded.updated_at",
            params![key, params_json, payload, updated_at],
        );

        match result {
            Ok(_) => {
                metrics::cache::write_success();
                debug!("cache write ok for key {}", &key[..12]);
                Ok(())
            }
            Err(e) => {
                metrics::cache::write_error();
                warn!("cache write failed for key {}: {}", &key[..12], e);
                Err(e.into())
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
