//! Link and grant queries for linkshelf.

use linkshelf_core::db::unix_timestamp;
use sqlx::{QueryBuilder, Sqlite};

use super::db::{DatabaseError, LinkDatabase};
use super::models::{AccessLevel, Grant, GrantView, Link, LinkPatch, NewLink};

/// Links visible to a user: owned, or reachable through a grant row.
const VISIBLE_TO_USER: &str =
    "(created_by = ? OR id IN (SELECT link_id FROM link_permissions WHERE user_id = ?))";

/// Escape `%`, `_` and `\` so user input matches literally inside `LIKE`.
fn like_pattern(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len() + 2);
    out.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

impl LinkDatabase {
    // =========================================================================
    // Link queries
    // =========================================================================

    /// Insert a link owned by `owner_id`.
    pub async fn create_link(&self, owner_id: i64, link: &NewLink) -> Result<Link, DatabaseError> {
        let now = unix_timestamp();

        let created = sqlx::query_as::<_, Link>(
            "INSERT INTO links (created_by, name, url, category, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(owner_id)
        .bind(&link.name)
        .bind(&link.url)
        .bind(&link.category)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool())
        .await?;

        Ok(created)
    }

    /// Get a link by ID.
    pub async fn find_link(&self, id: i64) -> Result<Option<Link>, DatabaseError> {
        let link = sqlx::query_as::<_, Link>("SELECT * FROM links WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        Ok(link)
    }

    /// Apply a partial update. Fields absent from `patch` keep their value.
    pub async fn update_link(&self, id: i64, patch: &LinkPatch) -> Result<Link, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        // Fetch existing row inside the transaction.
        let mut link = sqlx::query_as::<_, Link>("SELECT * FROM links WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Link {id}")))?;

        patch.apply_to(&mut link);
        link.updated_at = unix_timestamp();

        sqlx::query("UPDATE links SET name = ?, url = ?, category = ?, updated_at = ? WHERE id = ?")
            .bind(&link.name)
            .bind(&link.url)
            .bind(&link.category)
            .bind(link.updated_at)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(link)
    }

    /// Delete a link. Its grants are removed by the foreign key cascade.
    pub async fn delete_link(&self, id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM links WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// List links owned by or shared with a user, newest first.
    pub async fn list_links_for_user(
        &self,
        user_id: i64,
        category: Option<&str>,
    ) -> Result<Vec<Link>, DatabaseError> {
        let links = if let Some(category) = category {
            sqlx::query_as::<_, Link>(&format!(
                "SELECT * FROM links WHERE {VISIBLE_TO_USER} AND category = ? \
                 ORDER BY created_at DESC, id DESC"
            ))
            .bind(user_id)
            .bind(user_id)
            .bind(category)
            .fetch_all(self.pool())
            .await?
        } else {
            sqlx::query_as::<_, Link>(&format!(
                "SELECT * FROM links WHERE {VISIBLE_TO_USER} ORDER BY created_at DESC, id DESC"
            ))
            .bind(user_id)
            .bind(user_id)
            .fetch_all(self.pool())
            .await?
        };

        Ok(links)
    }

    /// Search the user's own links by name or URL substring (case-insensitive).
    pub async fn search_own_links(
        &self,
        user_id: i64,
        query: Option<&str>,
        category: Option<&str>,
    ) -> Result<Vec<Link>, DatabaseError> {
        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("SELECT * FROM links WHERE created_by = ");
        builder.push_bind(user_id);

        if let Some(query) = query.filter(|q| !q.is_empty()) {
            let pattern = like_pattern(&query.to_lowercase());
            builder
                .push(" AND (lower(name) LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR lower(url) LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }
        if let Some(category) = category {
            builder.push(" AND category = ").push_bind(category.to_string());
        }
        builder.push(" ORDER BY created_at DESC, id DESC");

        let links = builder
            .build_query_as::<Link>()
            .fetch_all(self.pool())
            .await?;

        Ok(links)
    }

    /// Distinct categories across links owned by or shared with a user.
    pub async fn list_categories(&self, user_id: i64) -> Result<Vec<String>, DatabaseError> {
        let rows: Vec<(String,)> = sqlx::query_as(&format!(
            "SELECT DISTINCT category FROM links WHERE {VISIBLE_TO_USER} ORDER BY category"
        ))
        .bind(user_id)
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(|(c,)| c).collect())
    }

    // =========================================================================
    // Grant queries
    // =========================================================================

    /// Get the grant for a (link, user) pair.
    pub async fn find_grant(
        &self,
        link_id: i64,
        user_id: i64,
    ) -> Result<Option<Grant>, DatabaseError> {
        let grant = sqlx::query_as::<_, Grant>(
            "SELECT * FROM link_permissions WHERE link_id = ? AND user_id = ?",
        )
        .bind(link_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(grant)
    }

    /// Insert or overwrite the grant for a (link, user) pair.
    ///
    /// Relies on `UNIQUE (link_id, user_id)`: concurrent calls for the same
    /// pair converge on one row holding the last level written.
    pub async fn upsert_grant(
        &self,
        link_id: i64,
        user_id: i64,
        level: AccessLevel,
    ) -> Result<Grant, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        let grant = sqlx::query_as::<_, Grant>(
            "INSERT INTO link_permissions (link_id, user_id, permission) VALUES (?, ?, ?) \
             ON CONFLICT (link_id, user_id) DO UPDATE SET permission = excluded.permission \
             RETURNING *",
        )
        .bind(link_id)
        .bind(user_id)
        .bind(level)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(grant)
    }

    /// Remove the grant for a (link, user) pair.
    pub async fn delete_grant(&self, link_id: i64, user_id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM link_permissions WHERE link_id = ? AND user_id = ?")
            .bind(link_id)
            .bind(user_id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// List every grant on a link with the grantee's username.
    pub async fn list_grants_for_link(&self, link_id: i64) -> Result<Vec<GrantView>, DatabaseError> {
        let grants = sqlx::query_as::<_, GrantView>(
            "SELECT p.user_id, u.username, p.permission FROM link_permissions p \
             JOIN users u ON u.id = p.user_id WHERE p.link_id = ? ORDER BY u.username",
        )
        .bind(link_id)
        .fetch_all(self.pool())
        .await?;

        Ok(grants)
    }
}
