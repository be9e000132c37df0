//! The credential store seam.
//!
//! The session resolver and permission evaluator only ever talk to
//! `dyn CredentialStore`, so tests and alternative backends can stand in for
//! `LinkDatabase`. Cascading deletes (user -> links -> grants, link -> grants)
//! are the store's job.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::db::{DatabaseError, LinkDatabase};
use super::models::{AccessLevel, Grant, GrantView, Link, LinkPatch, NewLink, User};

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, DatabaseError>;
    async fn insert_user(&self, username: &str, password_hash: &str)
    -> Result<User, DatabaseError>;

    async fn find_link_by_id(&self, id: i64) -> Result<Option<Link>, DatabaseError>;
    async fn insert_link(&self, owner_id: i64, link: &NewLink) -> Result<Link, DatabaseError>;
    async fn update_link(&self, id: i64, patch: &LinkPatch) -> Result<Link, DatabaseError>;
    async fn delete_link(&self, id: i64) -> Result<bool, DatabaseError>;

    async fn find_grant(&self, link_id: i64, user_id: i64)
    -> Result<Option<Grant>, DatabaseError>;
    /// Atomic insert-or-overwrite; at most one row per (link, user).
    async fn upsert_grant(
        &self,
        link_id: i64,
        user_id: i64,
        level: AccessLevel,
    ) -> Result<Grant, DatabaseError>;
    async fn delete_grant(&self, link_id: i64, user_id: i64) -> Result<bool, DatabaseError>;
    async fn list_grants_for_link(&self, link_id: i64) -> Result<Vec<GrantView>, DatabaseError>;

    async fn list_links_owned_or_granted_to(
        &self,
        user_id: i64,
        category: Option<&str>,
    ) -> Result<Vec<Link>, DatabaseError>;
    async fn search_owned_links(
        &self,
        user_id: i64,
        query: Option<&str>,
        category: Option<&str>,
    ) -> Result<Vec<Link>, DatabaseError>;
    async fn list_categories(&self, user_id: i64) -> Result<Vec<String>, DatabaseError>;
}

#[async_trait]
impl CredentialStore for LinkDatabase {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, DatabaseError> {
        Self::find_user_by_username(self, username).await
    }

    async fn insert_user(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<User, DatabaseError> {
        self.create_user(username, password_hash).await
    }

    async fn find_link_by_id(&self, id: i64) -> Result<Option<Link>, DatabaseError> {
        self.find_link(id).await
    }

    async fn insert_link(&self, owner_id: i64, link: &NewLink) -> Result<Link, DatabaseError> {
        self.create_link(owner_id, link).await
    }

    async fn update_link(&self, id: i64, patch: &LinkPatch) -> Result<Link, DatabaseError> {
        Self::update_link(self, id, patch).await
    }

    async fn delete_link(&self, id: i64) -> Result<bool, DatabaseError> {
        Self::delete_link(self, id).await
    }

    async fn find_grant(
        &self,
        link_id: i64,
        user_id: i64,
    ) -> Result<Option<Grant>, DatabaseError> {
        Self::find_grant(self, link_id, user_id).await
    }

    async fn upsert_grant(
        &self,
        link_id: i64,
        user_id: i64,
        level: AccessLevel,
    ) -> Result<Grant, DatabaseError> {
        Self::upsert_grant(self, link_id, user_id, level).await
    }

    async fn delete_grant(&self, link_id: i64, user_id: i64) -> Result<bool, DatabaseError> {
        Self::delete_grant(self, link_id, user_id).await
    }

    async fn list_grants_for_link(&self, link_id: i64) -> Result<Vec<GrantView>, DatabaseError> {
        Self::list_grants_for_link(self, link_id).await
    }

    async fn list_links_owned_or_granted_to(
        &self,
        user_id: i64,
        category: Option<&str>,
    ) -> Result<Vec<Link>, DatabaseError> {
        self.list_links_for_user(user_id, category).await
    }

    async fn search_owned_links(
        &self,
        user_id: i64,
        query: Option<&str>,
        category: Option<&str>,
    ) -> Result<Vec<Link>, DatabaseError> {
        self.search_own_links(user_id, query, category).await
    }

    async fn list_categories(&self, user_id: i64) -> Result<Vec<String>, DatabaseError> {
        Self::list_categories(self, user_id).await
    }
}

/// Run a store call with an upper bound on its duration.
///
/// An elapsed deadline becomes `DatabaseError::Timeout`, which callers
/// report as "store unavailable".
pub async fn with_timeout<T, F>(limit: Duration, op: &'static str, fut: F) -> Result<T, DatabaseError>
where
    F: Future<Output = Result<T, DatabaseError>>,
{
    if let Ok(result) = tokio::time::timeout(limit, fut).await {
        result
    } else {
        warn!(op, timeout_ms = limit.as_millis(), "Store call timed out");
        Err(DatabaseError::Timeout(op.to_string()))
    }
}
