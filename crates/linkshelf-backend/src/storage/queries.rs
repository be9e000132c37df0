//! User queries for linkshelf.

use linkshelf_core::db::unix_timestamp;

use super::db::{DatabaseError, LinkDatabase};
use super::models::User;

impl LinkDatabase {
    // =========================================================================
    // User queries
    // =========================================================================

    /// Create a new user. A taken username surfaces as `DatabaseError::Conflict`.
    pub async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<User, DatabaseError> {
        let now = unix_timestamp();

        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (username, password_hash, created_at) VALUES (?, ?, ?) RETURNING *",
        )
        .bind(username)
        .bind(password_hash)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(|e| match DatabaseError::from(e) {
            DatabaseError::Conflict(_) => {
                DatabaseError::Conflict(format!("Username {username} is taken"))
            }
            other => other,
        })?;

        Ok(user)
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: i64) -> Result<User, DatabaseError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("User {id}")))
    }

    /// Look up a user by username.
    pub async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(self.pool())
            .await?;

        Ok(user)
    }

    /// Delete a user. Their links and every grant touching them go with it.
    pub async fn delete_user(&self, id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
