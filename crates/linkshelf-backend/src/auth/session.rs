//! Session resolution: token string in, authenticated user out.
//!
//! Order of checks for `resolve`:
//! 1. a token must be present,
//! 2. it must not be on the blacklist,
//! 3. signature and expiry must verify, and it must be an access token,
//! 4. its subject must still exist in the credential store.
//!
//! Every rejection is `unauthenticated` to the outside world; the variant
//! is kept for logs and tests.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use linkshelf_core::db::unix_timestamp;
use tracing::{debug, info, warn};

use crate::storage::{CredentialStore, DatabaseError, User, with_timeout};

use super::jwt::{TokenError, TokenService};
use super::revocation::{RevocationError, RevocationStore};

/// Value written next to each blacklisted token.
pub const REVOKED_MARKER: &str = "blacklisted";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no session token presented")]
    Unauthenticated,

    #[error("session token has been revoked")]
    Revoked,

    #[error("session token rejected: {0}")]
    Token(#[from] TokenError),

    #[error("refresh tokens cannot authenticate requests")]
    NotAnAccessToken,

    #[error("token subject {0:?} does not exist")]
    UnknownUser(String),

    #[error("backing store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("backing store error: {0}")]
    Store(String),
}

impl SessionError {
    /// True for every rejection of the credential itself, false for store
    /// failures the caller may retry.
    pub const fn is_unauthenticated(&self) -> bool {
        !matches!(self, Self::StoreUnavailable(_) | Self::Store(_))
    }
}

impl From<DatabaseError> for SessionError {
    fn from(e: DatabaseError) -> Self {
        if e.is_unavailable() {
            Self::StoreUnavailable(e.to_string())
        } else {
            Self::Store(e.to_string())
        }
    }
}

impl From<RevocationError> for SessionError {
    fn from(e: RevocationError) -> Self {
        match e {
            RevocationError::Unavailable(msg) => Self::StoreUnavailable(msg),
            RevocationError::Backend(msg) => Self::Store(msg),
        }
    }
}

/// Combines the token service, the blacklist and the credential store.
#[derive(Clone)]
pub struct SessionResolver {
    tokens: Arc<TokenService>,
    revocations: Arc<dyn RevocationStore>,
    store: Arc<dyn CredentialStore>,
    store_timeout: Duration,
}

impl SessionResolver {
    pub fn new(
        tokens: Arc<TokenService>,
        revocations: Arc<dyn RevocationStore>,
        store: Arc<dyn CredentialStore>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            tokens,
            revocations,
            store,
            store_timeout,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Resolve a raw token (as extracted from the request) to its user.
    pub async fn resolve(&self, raw_token: Option<&str>) -> Result<User, SessionError> {
        let token = raw_token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(SessionError::Unauthenticated)?;

        if self.is_revoked(token).await? {
            debug!(
                fingerprint = %short_fingerprint(token),
                "Rejected revoked session token"
            );
            return Err(SessionError::Revoked);
        }

        let claims = self.tokens.verify(token).inspect_err(|e| {
            debug!(error = %e, "Rejected session token");
        })?;

        if !claims.is_access() {
            return Err(SessionError::NotAnAccessToken);
        }

        let user = with_timeout(
            self.store_timeout,
            "find_user_by_username",
            self.store.find_user_by_username(&claims.sub),
        )
        .await?
        .ok_or_else(|| {
            warn!(username = %claims.sub, jti = %claims.jti, "Token subject no longer exists");
            SessionError::UnknownUser(claims.sub.clone())
        })?;

        debug!(username = %user.username, jti = %claims.jti, "Session resolved");
        Ok(user)
    }

    /// Blacklist a token for the rest of its natural lifetime.
    ///
    /// Revoking an already-revoked token is fine. A token that has already
    /// expired is left alone since it can no longer authenticate. A token
    /// whose signature does not verify is rejected.
    pub async fn revoke(&self, raw_token: &str) -> Result<(), SessionError> {
        let token = raw_token.trim();
        if token.is_empty() {
            return Err(SessionError::Unauthenticated);
        }

        let claims = self.tokens.decode(token)?;
        let now = unix_timestamp();
        if now > claims.exp {
            debug!(jti = %claims.jti, "Token already expired, nothing to revoke");
            return Ok(());
        }

        // A token still verifies during the second `exp` itself.
        let ttl_secs = u64::try_from(claims.remaining_secs(now)).unwrap_or(0) + 1;
        self.bounded(
            "revocation setex",
            self.revocations.setex(token, ttl_secs, REVOKED_MARKER),
        )
        .await?;

        info!(
            username = %claims.sub,
            jti = %claims.jti,
            ttl_secs,
            "Session token revoked"
        );
        Ok(())
    }

    /// Whether the blacklist holds a live entry for this exact token.
    pub async fn is_revoked(&self, token: &str) -> Result<bool, SessionError> {
        let entry = self
            .bounded("revocation get", self.revocations.get(token))
            .await?;
        Ok(entry.is_some())
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, SessionError>
    where
        F: Future<Output = Result<T, RevocationError>>,
    {
        if let Ok(result) = tokio::time::timeout(self.store_timeout, fut).await {
            result.map_err(SessionError::from)
        } else {
            warn!(op, timeout_ms = self.store_timeout.as_millis(), "Revocation store timed out");
            Err(SessionError::StoreUnavailable(format!("{op} timed out")))
        }
    }
}

fn short_fingerprint(token: &str) -> String {
    let mut fp = TokenService::fingerprint(token);
    fp.truncate(12);
    fp
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use async_trait::async_trait;
    use jsonwebtoken::Algorithm;

    use super::*;
    use crate::auth::claims::ACCESS;
    use crate::auth::revocation::MemoryRevocationStore;
    use crate::storage::LinkDatabase;

    struct Fixture {
        resolver: SessionResolver,
        revocations: Arc<MemoryRevocationStore>,
        db: LinkDatabase,
    }

    async fn setup() -> Fixture {
        let db = LinkDatabase::open_in_memory().await.unwrap();
        let tokens = Arc::new(
            TokenService::new(b"test-secret", Algorithm::HS256, 3600, 604_800).unwrap(),
        );
        let revocations = Arc::new(MemoryRevocationStore::new());
        let resolver = SessionResolver::new(
            tokens,
            Arc::clone(&revocations) as Arc<dyn RevocationStore>,
            Arc::new(db.clone()),
            Duration::from_secs(2),
        );
        Fixture {
            resolver,
            revocations,
            db,
        }
    }

    #[tokio::test]
    async fn resolves_valid_token_to_user() {
        let fx = setup().await;
        let alice = fx.db.create_user("alice", "h").await.unwrap();
        let token = fx.resolver.tokens().issue_access("alice").unwrap().token;

        let user = fx.resolver.resolve(Some(&token)).await.unwrap();
        assert_eq!(user.id, alice.id);
    }

    #[tokio::test]
    async fn missing_or_blank_token_is_unauthenticated() {
        let fx = setup().await;

        assert!(matches!(
            fx.resolver.resolve(None).await,
            Err(SessionError::Unauthenticated)
        ));
        assert!(matches!(
            fx.resolver.resolve(Some("   ")).await,
            Err(SessionError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn revoked_token_never_resolves() {
        let fx = setup().await;
        fx.db.create_user("alice", "h").await.unwrap();
        let token = fx.resolver.tokens().issue_access("alice").unwrap().token;

        fx.resolver.revoke(&token).await.unwrap();

        let err = fx.resolver.resolve(Some(&token)).await.unwrap_err();
        assert!(matches!(err, SessionError::Revoked));
        assert!(err.is_unauthenticated());
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let fx = setup().await;
        fx.db.create_user("alice", "h").await.unwrap();
        let token = fx.resolver.tokens().issue_access("alice").unwrap().token;

        fx.resolver.revoke(&token).await.unwrap();
        fx.resolver.revoke(&token).await.unwrap();

        assert_eq!(fx.revocations.len().await, 1);
        assert!(fx.resolver.is_revoked(&token).await.unwrap());
    }

    #[tokio::test]
    async fn revoking_one_token_leaves_others_alone() {
        let fx = setup().await;
        fx.db.create_user("alice", "h").await.unwrap();
        let t1 = fx.resolver.tokens().issue_access("alice").unwrap().token;
        let t2 = fx.resolver.tokens().issue_access("alice").unwrap().token;

        fx.resolver.revoke(&t1).await.unwrap();

        assert!(fx.resolver.resolve(Some(&t2)).await.is_ok());
    }

    #[tokio::test]
    async fn expired_token_is_unauthenticated() {
        let fx = setup().await;
        fx.db.create_user("alice", "h").await.unwrap();
        let stale = fx
            .resolver
            .tokens()
            .issue_at("alice", 60, ACCESS, unix_timestamp() - 3600)
            .unwrap()
            .token;

        let err = fx.resolver.resolve(Some(&stale)).await.unwrap_err();
        assert!(matches!(err, SessionError::Token(TokenError::Expired)));
        assert!(err.is_unauthenticated());
    }

    #[tokio::test]
    async fn revoking_expired_token_stores_nothing() {
        let fx = setup().await;
        let stale = fx
            .resolver
            .tokens()
            .issue_at("alice", 60, ACCESS, unix_timestamp() - 3600)
            .unwrap()
            .token;

        fx.resolver.revoke(&stale).await.unwrap();
        assert!(fx.revocations.is_empty().await);
    }

    #[tokio::test]
    async fn forged_token_cannot_be_revoked() {
        let fx = setup().await;
        let other = TokenService::new(b"other-secret", Algorithm::HS256, 3600, 86400).unwrap();
        let forged = other.issue_access("alice").unwrap().token;

        let err = fx.resolver.revoke(&forged).await.unwrap_err();
        assert!(matches!(err, SessionError::Token(TokenError::InvalidSignature)));
        assert!(fx.revocations.is_empty().await);
    }

    #[tokio::test]
    async fn refresh_token_is_not_a_session() {
        let fx = setup().await;
        fx.db.create_user("alice", "h").await.unwrap();
        let refresh = fx.resolver.tokens().issue_refresh("alice").unwrap().token;

        assert!(matches!(
            fx.resolver.resolve(Some(&refresh)).await,
            Err(SessionError::NotAnAccessToken)
        ));
    }

    #[tokio::test]
    async fn deleted_user_is_unknown() {
        let fx = setup().await;
        let alice = fx.db.create_user("alice", "h").await.unwrap();
        let token = fx.resolver.tokens().issue_access("alice").unwrap().token;
        fx.db.delete_user(alice.id).await.unwrap();

        let err = fx.resolver.resolve(Some(&token)).await.unwrap_err();
        assert!(matches!(err, SessionError::UnknownUser(ref name) if name == "alice"));
    }

    struct StalledStore;

    #[async_trait]
    impl RevocationStore for StalledStore {
        async fn setex(&self, _: &str, _: u64, _: &str) -> Result<(), RevocationError> {
            std::future::pending().await
        }

        async fn get(&self, _: &str) -> Result<Option<String>, RevocationError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn stalled_blacklist_surfaces_store_unavailable() {
        let db = LinkDatabase::open_in_memory().await.unwrap();
        let tokens = Arc::new(TokenService::new(b"s", Algorithm::HS256, 3600, 86400).unwrap());
        let token = tokens.issue_access("alice").unwrap().token;
        let resolver = SessionResolver::new(
            tokens,
            Arc::new(StalledStore),
            Arc::new(db),
            Duration::from_millis(50),
        );

        let err = resolver.resolve(Some(&token)).await.unwrap_err();
        assert!(matches!(err, SessionError::StoreUnavailable(_)));
        assert!(!err.is_unauthenticated());

        let err = resolver.revoke(&token).await.unwrap_err();
        assert!(matches!(err, SessionError::StoreUnavailable(_)));
    }
}
