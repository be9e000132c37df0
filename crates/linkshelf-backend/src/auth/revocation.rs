//! Token blacklist backed by a TTL-capable key-value store.
//!
//! The contract mirrors `SETEX`/`GET`: presence of a non-expired key means
//! the token is revoked. Entries must expire on their own so the store never
//! accumulates rows for tokens that could not authenticate anyway.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::storage::{DatabaseError, LinkDatabase};

use super::jwt::TokenService;

#[derive(Debug, thiserror::Error)]
pub enum RevocationError {
    #[error("revocation store unavailable: {0}")]
    Unavailable(String),

    #[error("revocation store error: {0}")]
    Backend(String),
}

impl From<DatabaseError> for RevocationError {
    fn from(e: DatabaseError) -> Self {
        if e.is_unavailable() {
            Self::Unavailable(e.to_string())
        } else {
            Self::Backend(e.to_string())
        }
    }
}

#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Store `value` under `key` for `ttl_secs` seconds, replacing any
    /// existing entry.
    async fn setex(&self, key: &str, ttl_secs: u64, value: &str) -> Result<(), RevocationError>;

    /// Value under `key` if present and not yet expired.
    async fn get(&self, key: &str) -> Result<Option<String>, RevocationError>;
}

/// Deadline used when a TTL does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Process-local blacklist. Suitable for a single instance and for tests.
///
/// Every write drops entries that have already lapsed, so the map only holds
/// tokens that could still authenticate.
#[derive(Debug, Default)]
pub struct MemoryRevocationStore {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl MemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries. Returns how many were removed.
    pub async fn purge(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, (_, deadline)| *deadline > now);
        before - entries.len()
    }

    /// Number of entries held, including any that lapsed since the last write.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl RevocationStore for MemoryRevocationStore {
    async fn setex(&self, key: &str, ttl_secs: u64, value: &str) -> Result<(), RevocationError> {
        let now = Instant::now();
        let deadline = now
            .checked_add(Duration::from_secs(ttl_secs.max(1)))
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);

        let mut entries = self.entries.write().await;
        entries.retain(|_, (_, d)| *d > now);
        entries.insert(key.to_string(), (value.to_string(), deadline));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, RevocationError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|(_, deadline)| *deadline > now)
            .map(|(value, _)| value.clone()))
    }
}

/// Blacklist persisted in the `revoked_tokens` table.
///
/// Keys are stored as SHA-256 digests so raw tokens never reach the disk.
#[derive(Clone)]
pub struct SqliteRevocationStore {
    db: LinkDatabase,
}

impl SqliteRevocationStore {
    pub const fn new(db: LinkDatabase) -> Self {
        Self { db }
    }

    /// Delete entries past their deadline. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64, RevocationError> {
        Ok(self.db.purge_expired_revocations().await?)
    }
}

#[async_trait]
impl RevocationStore for SqliteRevocationStore {
    async fn setex(&self, key: &str, ttl_secs: u64, value: &str) -> Result<(), RevocationError> {
        let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        self.db
            .put_revocation(&TokenService::fingerprint(key), value, ttl)
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, RevocationError> {
        Ok(self
            .db
            .get_revocation(&TokenService::fingerprint(key))
            .await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn memory_entry_expires_after_ttl() {
        let store = MemoryRevocationStore::new();
        store.setex("tok", 60, "blacklisted").await.unwrap();

        assert_eq!(store.get("tok").await.unwrap().as_deref(), Some("blacklisted"));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(store.get("tok").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get("tok").await.unwrap().is_none());

        assert_eq!(store.purge().await, 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn memory_setex_replaces_deadline() {
        let store = MemoryRevocationStore::new();
        store.setex("tok", 10, "blacklisted").await.unwrap();
        store.setex("tok", 100, "blacklisted").await.unwrap();

        tokio::time::advance(Duration::from_secs(50)).await;
        assert!(store.get("tok").await.unwrap().is_some());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn memory_writes_reclaim_lapsed_entries() {
        let store = MemoryRevocationStore::new();
        for i in 0..100 {
            store.setex(&format!("tok-{i}"), 1, "blacklisted").await.unwrap();
            tokio::time::advance(Duration::from_secs(5)).await;
        }
        assert_eq!(store.len().await, 1);

        store.setex("live", 60, "blacklisted").await.unwrap();
        assert_eq!(store.len().await, 1);
        assert!(store.get("live").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn memory_huge_ttl_does_not_overflow() {
        let store = MemoryRevocationStore::new();
        store.setex("tok", u64::MAX, "blacklisted").await.unwrap();

        tokio::time::advance(Duration::from_secs(365 * 24 * 60 * 60)).await;
        assert!(store.get("tok").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn sqlite_writes_reclaim_lapsed_rows() {
        let db = LinkDatabase::open_in_memory().await.unwrap();
        let store = SqliteRevocationStore::new(db.clone());
        sqlx::query("INSERT INTO revoked_tokens (key_hash, value, expires_at) VALUES (?, ?, ?)")
            .bind("stale")
            .bind("blacklisted")
            .bind(1_i64)
            .execute(db.pool())
            .await
            .unwrap();

        store.setex("raw.jwt.token", 3600, "blacklisted").await.unwrap();

        assert!(store.get("raw.jwt.token").await.unwrap().is_some());
        assert_eq!(db.count_revocations().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn sqlite_huge_ttl_stays_revoked() {
        let db = LinkDatabase::open_in_memory().await.unwrap();
        let store = SqliteRevocationStore::new(db);

        store.setex("raw.jwt.token", u64::MAX, "blacklisted").await.unwrap();
        assert!(store.get("raw.jwt.token").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn sqlite_store_hashes_keys() {
        let db = LinkDatabase::open_in_memory().await.unwrap();
        let store = SqliteRevocationStore::new(db.clone());

        store.setex("raw.jwt.token", 3600, "blacklisted").await.unwrap();

        assert!(store.get("raw.jwt.token").await.unwrap().is_some());
        assert!(store.get("other.jwt.token").await.unwrap().is_none());

        let raw: Option<(String,)> =
            sqlx::query_as("SELECT key_hash FROM revoked_tokens WHERE key_hash = ?")
                .bind("raw.jwt.token")
                .fetch_optional(db.pool())
                .await
                .unwrap();
        assert!(raw.is_none());
    }
}
