//! Per-link access control.
//!
//! A link's access set is its owner plus every user holding a grant row for
//! it. `write` grants imply `read`; deletion stays with the owner.
//!
//! Who may share and who may unshare are deployment choices, see
//! [`SharePolicy`] and [`UnsharePolicy`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use linkshelf_core::config::{PermissionConfig, SharePolicy, UnsharePolicy};
use tracing::info;

use crate::storage::{
    AccessLevel, CredentialStore, DatabaseError, Grant, GrantView, Link, ParseAccessLevelError,
    User, with_timeout,
};

/// What a user may do with a link, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Access {
    None,
    Read,
    Write,
    Owner,
}

impl From<AccessLevel> for Access {
    fn from(level: AccessLevel) -> Self {
        match level {
            AccessLevel::Read => Self::Read,
            AccessLevel::Write => Self::Write,
        }
    }
}

impl Access {
    pub const fn can_read(self) -> bool {
        !matches!(self, Self::None)
    }

    pub const fn can_write(self) -> bool {
        matches!(self, Self::Write | Self::Owner)
    }

    pub const fn can_delete(self) -> bool {
        matches!(self, Self::Owner)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PermissionError {
    #[error("cannot share a link with yourself")]
    SelfShare,

    #[error("user {0:?} not found")]
    GranteeNotFound(String),

    #[error("user {0:?} already owns this link")]
    GranteeIsOwner(String),

    #[error("link {0} not found")]
    LinkNotFound(i64),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    InvalidLevel(#[from] ParseAccessLevelError),

    #[error("backing store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("backing store error: {0}")]
    Store(String),
}

impl From<DatabaseError> for PermissionError {
    fn from(e: DatabaseError) -> Self {
        if e.is_unavailable() {
            Self::StoreUnavailable(e.to_string())
        } else {
            Self::Store(e.to_string())
        }
    }
}

#[derive(Clone)]
pub struct PermissionEvaluator {
    store: Arc<dyn CredentialStore>,
    config: PermissionConfig,
    store_timeout: Duration,
}

impl PermissionEvaluator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        config: PermissionConfig,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            config,
            store_timeout,
        }
    }

    pub const fn config(&self) -> PermissionConfig {
        self.config
    }

    async fn call<T, F>(&self, op: &'static str, fut: F) -> Result<T, PermissionError>
    where
        F: Future<Output = Result<T, DatabaseError>>,
    {
        Ok(with_timeout(self.store_timeout, op, fut).await?)
    }

    /// Effective access of `user` to `link`.
    pub async fn access(&self, user: &User, link: &Link) -> Result<Access, PermissionError> {
        if link.is_owned_by(user) {
            return Ok(Access::Owner);
        }
        let grant = self
            .call("find_grant", self.store.find_grant(link.id, user.id))
            .await?;
        Ok(grant.map_or(Access::None, |g| g.permission.into()))
    }

    pub async fn can_read(&self, user: &User, link: &Link) -> Result<bool, PermissionError> {
        Ok(self.access(user, link).await?.can_read())
    }

    pub async fn can_write(&self, user: &User, link: &Link) -> Result<bool, PermissionError> {
        Ok(self.access(user, link).await?.can_write())
    }

    /// Only the owner may delete; a write grant does not count.
    pub const fn can_delete(&self, user: &User, link: &Link) -> bool {
        link.is_owned_by(user)
    }

    /// Load a link the user can at least read. Absent and unreadable links
    /// look the same to the caller.
    pub async fn readable_link(
        &self,
        user: &User,
        link_id: i64,
    ) -> Result<(Link, Access), PermissionError> {
        let not_found = || PermissionError::NotFound(format!("link {link_id}"));
        let link = self
            .call("find_link_by_id", self.store.find_link_by_id(link_id))
            .await?
            .ok_or_else(not_found)?;
        let access = self.access(user, &link).await?;
        if access.can_read() {
            Ok((link, access))
        } else {
            Err(not_found())
        }
    }

    /// Grant `grantee_username` access to a link, overwriting any existing
    /// grant for that pair.
    pub async fn share(
        &self,
        actor: &User,
        link_id: i64,
        grantee_username: &str,
        level: AccessLevel,
    ) -> Result<Grant, PermissionError> {
        let grantee_username = grantee_username.trim();
        if grantee_username == actor.username {
            return Err(PermissionError::SelfShare);
        }

        let grantee = self
            .call(
                "find_user_by_username",
                self.store.find_user_by_username(grantee_username),
            )
            .await?
            .ok_or_else(|| PermissionError::GranteeNotFound(grantee_username.to_string()))?;

        let link = self
            .call("find_link_by_id", self.store.find_link_by_id(link_id))
            .await?
            .ok_or(PermissionError::LinkNotFound(link_id))?;

        let allowed = match self.config.share_policy {
            SharePolicy::OwnerOnly => link.is_owned_by(actor),
            SharePolicy::OwnerOrWriter => self.access(actor, &link).await?.can_write(),
        };
        if !allowed {
            return Err(PermissionError::Forbidden(match self.config.share_policy {
                SharePolicy::OwnerOnly => "only the link owner can share".into(),
                SharePolicy::OwnerOrWriter => {
                    "only the link owner or users with write access can share".into()
                }
            }));
        }

        // Ownership is only revealed to callers allowed to share.
        if link.is_owned_by(&grantee) {
            return Err(PermissionError::GranteeIsOwner(grantee.username));
        }

        let grant = self
            .call(
                "upsert_grant",
                self.store.upsert_grant(link.id, grantee.id, level),
            )
            .await?;

        info!(
            link_id = link.id,
            actor = %actor.username,
            grantee = %grantee.username,
            level = %level,
            "Link shared"
        );
        Ok(grant)
    }

    /// Remove a grant on a link.
    ///
    /// With no `target` (or the actor's own name) the actor drops the grant
    /// they received. Naming another user is only honoured under
    /// [`UnsharePolicy::OwnerOrGrantee`] and only for the link owner.
    pub async fn unshare(
        &self,
        actor: &User,
        link_id: i64,
        target: Option<&str>,
    ) -> Result<(), PermissionError> {
        let target = target.map(str::trim).filter(|t| *t != actor.username);

        let Some(target) = target else {
            let removed = self
                .call("delete_grant", self.store.delete_grant(link_id, actor.id))
                .await?;
            if !removed {
                return Err(PermissionError::NotFound(format!(
                    "no grant on link {link_id} for {}",
                    actor.username
                )));
            }
            info!(link_id, actor = %actor.username, "Dropped own link grant");
            return Ok(());
        };

        if self.config.unshare_policy == UnsharePolicy::GranteeOnly {
            return Err(PermissionError::Forbidden(
                "grants can only be removed by their holder".into(),
            ));
        }

        let link = self
            .call("find_link_by_id", self.store.find_link_by_id(link_id))
            .await?
            .ok_or(PermissionError::LinkNotFound(link_id))?;
        if !link.is_owned_by(actor) {
            return Err(PermissionError::Forbidden(
                "only the link owner can remove other users' grants".into(),
            ));
        }

        let grantee = self
            .call("find_user_by_username", self.store.find_user_by_username(target))
            .await?
            .ok_or_else(|| PermissionError::GranteeNotFound(target.to_string()))?;

        let removed = self
            .call("delete_grant", self.store.delete_grant(link.id, grantee.id))
            .await?;
        if !removed {
            return Err(PermissionError::NotFound(format!(
                "no grant on link {link_id} for {target}"
            )));
        }

        info!(
            link_id,
            actor = %actor.username,
            grantee = %grantee.username,
            "Link grant revoked by owner"
        );
        Ok(())
    }

    /// Grants on a link the actor can read.
    pub async fn grants(
        &self,
        actor: &User,
        link_id: i64,
    ) -> Result<Vec<GrantView>, PermissionError> {
        let (link, _) = self.readable_link(actor, link_id).await?;
        self.call("list_grants_for_link", self.store.list_grants_for_link(link.id))
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::storage::{LinkDatabase, NewLink};

    struct Fixture {
        db: LinkDatabase,
        alice: User,
        bob: User,
        carol: User,
        link: Link,
    }

    async fn setup() -> Fixture {
        let db = LinkDatabase::open_in_memory().await.unwrap();
        let alice = db.create_user("alice", "h").await.unwrap();
        let bob = db.create_user("bob", "h").await.unwrap();
        let carol = db.create_user("carol", "h").await.unwrap();
        let link = db
            .create_link(
                alice.id,
                &NewLink {
                    name: "docs".into(),
                    url: "https://docs.rs".into(),
                    category: "rust".into(),
                },
            )
            .await
            .unwrap();
        Fixture {
            db,
            alice,
            bob,
            carol,
            link,
        }
    }

    fn evaluator(db: &LinkDatabase, config: PermissionConfig) -> PermissionEvaluator {
        PermissionEvaluator::new(Arc::new(db.clone()), config, Duration::from_secs(2))
    }

    fn owner_only() -> PermissionConfig {
        PermissionConfig::default()
    }

    fn permissive() -> PermissionConfig {
        PermissionConfig {
            share_policy: SharePolicy::OwnerOrWriter,
            unshare_policy: UnsharePolicy::OwnerOrGrantee,
        }
    }

    #[tokio::test]
    async fn access_matrix() {
        let fx = setup().await;
        let perms = evaluator(&fx.db, owner_only());
        fx.db
            .upsert_grant(fx.link.id, fx.bob.id, AccessLevel::Write)
            .await
            .unwrap();

        assert_eq!(perms.access(&fx.alice, &fx.link).await.unwrap(), Access::Owner);
        assert_eq!(perms.access(&fx.bob, &fx.link).await.unwrap(), Access::Write);
        assert_eq!(perms.access(&fx.carol, &fx.link).await.unwrap(), Access::None);

        assert!(perms.can_read(&fx.bob, &fx.link).await.unwrap());
        assert!(perms.can_write(&fx.bob, &fx.link).await.unwrap());
        assert!(!perms.can_read(&fx.carol, &fx.link).await.unwrap());
    }

    #[tokio::test]
    async fn only_owner_can_delete() {
        let fx = setup().await;
        let perms = evaluator(&fx.db, owner_only());
        fx.db
            .upsert_grant(fx.link.id, fx.bob.id, AccessLevel::Write)
            .await
            .unwrap();

        assert!(perms.can_delete(&fx.alice, &fx.link));
        assert!(!perms.can_delete(&fx.bob, &fx.link));
        assert!(!perms.can_delete(&fx.carol, &fx.link));
    }

    #[tokio::test]
    async fn read_grant_does_not_allow_write() {
        let fx = setup().await;
        let perms = evaluator(&fx.db, owner_only());

        perms
            .share(&fx.alice, fx.link.id, "bob", AccessLevel::Read)
            .await
            .unwrap();

        assert!(perms.can_read(&fx.bob, &fx.link).await.unwrap());
        assert!(!perms.can_write(&fx.bob, &fx.link).await.unwrap());
    }

    #[tokio::test]
    async fn reshare_overwrites_level() {
        let fx = setup().await;
        let perms = evaluator(&fx.db, owner_only());

        perms
            .share(&fx.alice, fx.link.id, "bob", AccessLevel::Read)
            .await
            .unwrap();
        let grant = perms
            .share(&fx.alice, fx.link.id, "bob", AccessLevel::Write)
            .await
            .unwrap();

        assert_eq!(grant.permission, AccessLevel::Write);
        let grants = perms.grants(&fx.alice, fx.link.id).await.unwrap();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].permission, AccessLevel::Write);
    }

    #[tokio::test]
    async fn share_rejections_in_order() {
        let fx = setup().await;
        let perms = evaluator(&fx.db, owner_only());

        assert!(matches!(
            perms.share(&fx.alice, 999, "alice", AccessLevel::Read).await,
            Err(PermissionError::SelfShare)
        ));
        assert!(matches!(
            perms.share(&fx.alice, 999, "nobody", AccessLevel::Read).await,
            Err(PermissionError::GranteeNotFound(_))
        ));
        assert!(matches!(
            perms.share(&fx.alice, 999, "bob", AccessLevel::Read).await,
            Err(PermissionError::LinkNotFound(999))
        ));
        assert!(matches!(
            perms.share(&fx.bob, fx.link.id, "alice", AccessLevel::Read).await,
            Err(PermissionError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn stranger_naming_the_owner_is_forbidden_not_conflict() {
        let fx = setup().await;

        for config in [owner_only(), permissive()] {
            let perms = evaluator(&fx.db, config);
            let err = perms
                .share(&fx.carol, fx.link.id, "alice", AccessLevel::Read)
                .await
                .unwrap_err();
            assert!(matches!(err, PermissionError::Forbidden(_)), "{err:?}");
        }
    }

    #[tokio::test]
    async fn writer_sharing_back_to_owner_is_conflict() {
        let fx = setup().await;
        let perms = evaluator(&fx.db, permissive());
        fx.db
            .upsert_grant(fx.link.id, fx.bob.id, AccessLevel::Write)
            .await
            .unwrap();

        let err = perms
            .share(&fx.bob, fx.link.id, "alice", AccessLevel::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, PermissionError::GranteeIsOwner(_)));
    }

    #[tokio::test]
    async fn owner_only_policy_refuses_writers() {
        let fx = setup().await;
        let perms = evaluator(&fx.db, owner_only());
        perms
            .share(&fx.alice, fx.link.id, "bob", AccessLevel::Write)
            .await
            .unwrap();

        let err = perms
            .share(&fx.bob, fx.link.id, "carol", AccessLevel::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, PermissionError::Forbidden(_)));
        assert!(!perms.can_read(&fx.carol, &fx.link).await.unwrap());
    }

    #[tokio::test]
    async fn owner_or_writer_policy_lets_writers_share() {
        let fx = setup().await;
        let perms = evaluator(&fx.db, permissive());
        perms
            .share(&fx.alice, fx.link.id, "bob", AccessLevel::Write)
            .await
            .unwrap();

        perms
            .share(&fx.bob, fx.link.id, "carol", AccessLevel::Read)
            .await
            .unwrap();
        assert!(perms.can_read(&fx.carol, &fx.link).await.unwrap());

        // A reader still cannot pass the link on.
        let err = perms
            .share(&fx.carol, fx.link.id, "bob", AccessLevel::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, PermissionError::Forbidden(_)));
    }

    #[tokio::test]
    async fn stranger_cannot_share_under_either_policy() {
        let fx = setup().await;
        for config in [owner_only(), permissive()] {
            let perms = evaluator(&fx.db, config);
            let err = perms
                .share(&fx.carol, fx.link.id, "bob", AccessLevel::Read)
                .await
                .unwrap_err();
            assert!(matches!(err, PermissionError::Forbidden(_)));
        }
    }

    #[tokio::test]
    async fn grantee_drops_own_grant() {
        let fx = setup().await;
        let perms = evaluator(&fx.db, owner_only());
        perms
            .share(&fx.alice, fx.link.id, "bob", AccessLevel::Read)
            .await
            .unwrap();

        perms.unshare(&fx.bob, fx.link.id, None).await.unwrap();
        assert!(!perms.can_read(&fx.bob, &fx.link).await.unwrap());

        assert!(matches!(
            perms.unshare(&fx.bob, fx.link.id, None).await,
            Err(PermissionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn naming_yourself_is_the_same_as_no_target() {
        let fx = setup().await;
        let perms = evaluator(&fx.db, owner_only());
        perms
            .share(&fx.alice, fx.link.id, "bob", AccessLevel::Read)
            .await
            .unwrap();

        perms.unshare(&fx.bob, fx.link.id, Some("bob")).await.unwrap();
        assert!(!perms.can_read(&fx.bob, &fx.link).await.unwrap());
    }

    #[tokio::test]
    async fn grantee_only_policy_refuses_owner_revoking_others() {
        let fx = setup().await;
        let perms = evaluator(&fx.db, owner_only());
        perms
            .share(&fx.alice, fx.link.id, "bob", AccessLevel::Read)
            .await
            .unwrap();

        let err = perms
            .unshare(&fx.alice, fx.link.id, Some("bob"))
            .await
            .unwrap_err();
        assert!(matches!(err, PermissionError::Forbidden(_)));
        assert!(perms.can_read(&fx.bob, &fx.link).await.unwrap());

        // The owner holds no grant of their own to drop.
        assert!(matches!(
            perms.unshare(&fx.alice, fx.link.id, None).await,
            Err(PermissionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn owner_or_grantee_policy_lets_owner_revoke() {
        let fx = setup().await;
        let perms = evaluator(&fx.db, permissive());
        perms
            .share(&fx.alice, fx.link.id, "bob", AccessLevel::Write)
            .await
            .unwrap();
        perms
            .share(&fx.alice, fx.link.id, "carol", AccessLevel::Read)
            .await
            .unwrap();

        perms
            .unshare(&fx.alice, fx.link.id, Some("bob"))
            .await
            .unwrap();
        assert!(!perms.can_read(&fx.bob, &fx.link).await.unwrap());

        // A writer is still not the owner.
        perms
            .share(&fx.alice, fx.link.id, "bob", AccessLevel::Write)
            .await
            .unwrap();
        let err = perms
            .unshare(&fx.bob, fx.link.id, Some("carol"))
            .await
            .unwrap_err();
        assert!(matches!(err, PermissionError::Forbidden(_)));

        assert!(matches!(
            perms.unshare(&fx.alice, fx.link.id, Some("nobody")).await,
            Err(PermissionError::GranteeNotFound(_))
        ));
        assert!(matches!(
            perms.unshare(&fx.alice, 999, Some("bob")).await,
            Err(PermissionError::LinkNotFound(999))
        ));
    }

    #[tokio::test]
    async fn readable_link_hides_inaccessible_links() {
        let fx = setup().await;
        let perms = evaluator(&fx.db, owner_only());

        assert!(matches!(
            perms.readable_link(&fx.carol, fx.link.id).await,
            Err(PermissionError::NotFound(_))
        ));
        assert!(matches!(
            perms.readable_link(&fx.carol, 999).await,
            Err(PermissionError::NotFound(_))
        ));

        let (link, access) = perms.readable_link(&fx.alice, fx.link.id).await.unwrap();
        assert_eq!(link.id, fx.link.id);
        assert_eq!(access, Access::Owner);
    }

    #[tokio::test]
    async fn store_failure_surfaces() {
        let fx = setup().await;
        let perms = evaluator(&fx.db, owner_only());
        fx.db.close().await;

        let err = perms.can_read(&fx.bob, &fx.link).await.unwrap_err();
        assert!(matches!(err, PermissionError::StoreUnavailable(_)));
    }

    #[test]
    fn access_ordering() {
        assert!(Access::Owner > Access::Write);
        assert!(Access::Write > Access::Read);
        assert!(Access::Read > Access::None);
        assert!(Access::from(AccessLevel::Write).can_write());
        assert!(!Access::from(AccessLevel::Read).can_write());
    }
}
