//! Link operations. Every call takes an already resolved `User`; the
//! permission evaluator decides what that user may touch.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument};
use url::Url;

use crate::error::{Result, ServiceError};
use crate::permission::PermissionEvaluator;
use crate::storage::{
    AccessLevel, CredentialStore, DatabaseError, Grant, GrantView, Link, LinkPatch, NewLink, User,
    with_timeout,
};

pub struct LinkService {
    store: Arc<dyn CredentialStore>,
    permissions: PermissionEvaluator,
    store_timeout: Duration,
}

impl LinkService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        permissions: PermissionEvaluator,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            permissions,
            store_timeout,
        }
    }

    pub const fn permissions(&self) -> &PermissionEvaluator {
        &self.permissions
    }

    async fn call<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, DatabaseError>>,
    {
        Ok(with_timeout(self.store_timeout, op, fut).await?)
    }

    #[instrument(skip(self, user, link), fields(user = %user.username))]
    pub async fn create_link(&self, user: &User, link: NewLink) -> Result<Link> {
        let link = NewLink {
            name: required("name", &link.name)?,
            url: validate_url(&link.url)?,
            category: required("category", &link.category)?,
        };
        let created = self
            .call("insert_link", self.store.insert_link(user.id, &link))
            .await?;
        info!(link_id = created.id, "Link created");
        Ok(created)
    }

    /// Links owned by or shared with `user`, newest first.
    pub async fn list_links(&self, user: &User, category: Option<&str>) -> Result<Vec<Link>> {
        self.call(
            "list_links_owned_or_granted_to",
            self.store
                .list_links_owned_or_granted_to(user.id, non_blank(category)),
        )
        .await
    }

    /// Search the user's own links by name or URL.
    pub async fn search_links(
        &self,
        user: &User,
        query: Option<&str>,
        category: Option<&str>,
    ) -> Result<Vec<Link>> {
        self.call(
            "search_owned_links",
            self.store
                .search_owned_links(user.id, non_blank(query), non_blank(category)),
        )
        .await
    }

    pub async fn categories(&self, user: &User) -> Result<Vec<String>> {
        self.call("list_categories", self.store.list_categories(user.id))
            .await
    }

    pub async fn get_link(&self, user: &User, id: i64) -> Result<Link> {
        let (link, _) = self.permissions.readable_link(user, id).await?;
        Ok(link)
    }

    #[instrument(skip(self, user, patch), fields(user = %user.username))]
    pub async fn update_link(&self, user: &User, id: i64, patch: LinkPatch) -> Result<Link> {
        let (link, access) = self.permissions.readable_link(user, id).await?;
        if !access.can_write() {
            return Err(ServiceError::Forbidden(
                "write access required to update this link".into(),
            ));
        }
        if patch.is_empty() {
            return Ok(link);
        }

        let patch = LinkPatch {
            name: patch.name.as_deref().map(|n| required("name", n)).transpose()?,
            url: patch.url.as_deref().map(validate_url).transpose()?,
            category: patch
                .category
                .as_deref()
                .map(|c| required("category", c))
                .transpose()?,
        };
        let updated = self
            .call("update_link", self.store.update_link(link.id, &patch))
            .await?;
        info!(link_id = updated.id, "Link updated");
        Ok(updated)
    }

    /// Owner only. Users who cannot see the link get `NotFound`, users who
    /// can see but not own it get `Forbidden`.
    #[instrument(skip(self, user), fields(user = %user.username))]
    pub async fn delete_link(&self, user: &User, id: i64) -> Result<()> {
        let (link, _) = self.permissions.readable_link(user, id).await?;
        if !self.permissions.can_delete(user, &link) {
            return Err(ServiceError::Forbidden(
                "only the owner can delete this link".into(),
            ));
        }
        let deleted = self
            .call("delete_link", self.store.delete_link(link.id))
            .await?;
        if !deleted {
            return Err(ServiceError::NotFound(format!("link {id}")));
        }
        info!(link_id = id, "Link deleted");
        Ok(())
    }

    #[instrument(skip(self, user), fields(user = %user.username))]
    pub async fn share_link(
        &self,
        user: &User,
        id: i64,
        grantee: &str,
        level: &str,
    ) -> Result<Grant> {
        let level: AccessLevel = level
            .trim()
            .parse()
            .map_err(crate::permission::PermissionError::from)?;
        Ok(self.permissions.share(user, id, grantee, level).await?)
    }

    #[instrument(skip(self, user), fields(user = %user.username))]
    pub async fn unshare_link(&self, user: &User, id: i64, target: Option<&str>) -> Result<()> {
        Ok(self.permissions.unshare(user, id, target).await?)
    }

    pub async fn link_permissions(&self, user: &User, id: i64) -> Result<Vec<GrantView>> {
        Ok(self.permissions.grants(user, id).await?)
    }
}

fn required(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ServiceError::invalid(format!("{field} must not be empty")));
    }
    Ok(value.to_string())
}

/// Accept absolute http(s) URLs only. The text is stored as given.
fn validate_url(raw: &str) -> Result<String> {
    let raw = raw.trim();
    let parsed = Url::parse(raw).map_err(|e| ServiceError::invalid(format!("invalid url: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ServiceError::invalid(format!(
            "unsupported url scheme {:?}",
            parsed.scheme()
        )));
    }
    Ok(raw.to_string())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_validation() {
        assert_eq!(
            validate_url(" https://docs.rs ").ok().as_deref(),
            Some("https://docs.rs")
        );
        assert!(validate_url("docs.rs").is_err());
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("").is_err());
    }

    #[test]
    fn blank_filters_are_ignored() {
        assert_eq!(non_blank(Some("  ")), None);
        assert_eq!(non_blank(Some(" work ")), Some("work"));
        assert_eq!(non_blank(None), None);
    }
}
