//! Token blacklist queries for linkshelf.
//!
//! Rows carry their own deadline. Reads ignore rows past `expires_at`, so an
//! entry stops blocking at the same instant the token would have expired.

use linkshelf_core::db::unix_timestamp;

use super::db::{DatabaseError, LinkDatabase};

impl LinkDatabase {
    /// Insert or refresh a blacklist entry that lives for `ttl_secs`.
    ///
    /// Lapsed rows are deleted in the same transaction, so the table only
    /// holds entries for tokens that could still authenticate.
    pub async fn put_revocation(
        &self,
        key_hash: &str,
        value: &str,
        ttl_secs: i64,
    ) -> Result<(), DatabaseError> {
        let now = unix_timestamp();
        let expires_at = now.saturating_add(ttl_secs.max(1));

        let mut tx = self.pool().begin().await?;

        sqlx::query("DELETE FROM revoked_tokens WHERE expires_at <= ?")
            .bind(now)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO revoked_tokens (key_hash, value, expires_at) VALUES (?, ?, ?) \
             ON CONFLICT (key_hash) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
        )
        .bind(key_hash)
        .bind(value)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Value of a live blacklist entry, if any.
    pub async fn get_revocation(&self, key_hash: &str) -> Result<Option<String>, DatabaseError> {
        let now = unix_timestamp();

        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM revoked_tokens WHERE key_hash = ? AND expires_at > ?")
                .bind(key_hash)
                .bind(now)
                .fetch_optional(self.pool())
                .await?;

        Ok(row.map(|(v,)| v))
    }

    /// Delete entries whose deadline has passed. Returns the number removed.
    pub async fn purge_expired_revocations(&self) -> Result<u64, DatabaseError> {
        let now = unix_timestamp();

        let result = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at <= ?")
            .bind(now)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected())
    }

    /// Number of stored entries, live or not.
    pub async fn count_revocations(&self) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM revoked_tokens")
            .fetch_one(self.pool())
            .await?;

        Ok(row.0)
    }
}
