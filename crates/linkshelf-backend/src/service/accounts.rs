//! Account operations: register, login, logout, whoami.

use std::sync::Arc;
use std::time::Duration;

use cookie::Cookie;
use http::HeaderMap;
use tracing::{info, instrument, warn};

use crate::auth::password::{hash_password_blocking, verify_password_blocking};
use crate::auth::{IssuedToken, SessionResolver, TokenCarrier};
use crate::error::{Result, ServiceError};
use crate::storage::{CredentialStore, User, with_timeout};

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 50;

pub struct AccountService {
    store: Arc<dyn CredentialStore>,
    sessions: SessionResolver,
    carrier: TokenCarrier,
    store_timeout: Duration,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        sessions: SessionResolver,
        carrier: TokenCarrier,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            sessions,
            carrier,
            store_timeout,
        }
    }

    pub const fn sessions(&self) -> &SessionResolver {
        &self.sessions
    }

    pub const fn carrier(&self) -> &TokenCarrier {
        &self.carrier
    }

    #[instrument(skip(self, password), fields(op = "register"))]
    pub async fn register(&self, username: &str, password: &str) -> Result<(User, IssuedToken)> {
        let username = validate_username(username)?;
        if password.is_empty() {
            return Err(ServiceError::invalid("password must not be empty"));
        }

        let hash = hash_password_blocking(password.to_string()).await?;
        let user = with_timeout(
            self.store_timeout,
            "insert_user",
            self.store.insert_user(username, &hash),
        )
        .await?;

        let issued = self.sessions.tokens().issue_access(&user.username)?;
        info!(user_id = user.id, username = %user.username, "User registered");
        Ok((user, issued))
    }

    /// Unknown usernames and wrong passwords fail the same way.
    #[instrument(skip(self, password), fields(op = "login"))]
    pub async fn login(&self, username: &str, password: &str) -> Result<IssuedToken> {
        let user = with_timeout(
            self.store_timeout,
            "find_user_by_username",
            self.store.find_user_by_username(username.trim()),
        )
        .await?;

        let Some(user) = user else {
            warn!(username = %username, "Failed login attempt");
            return Err(ServiceError::Unauthenticated(None));
        };

        let valid = verify_password_blocking(password.to_string(), user.password_hash.clone())
            .await?;
        if !valid {
            warn!(username = %user.username, "Failed login attempt");
            return Err(ServiceError::Unauthenticated(None));
        }

        let issued = self.sessions.tokens().issue_access(&user.username)?;
        info!(user_id = user.id, username = %user.username, "User logged in");
        Ok(issued)
    }

    /// Revoke the presented session. A missing, expired or already revoked
    /// token is rejected as unauthenticated.
    #[instrument(skip(self, raw_token), fields(op = "logout"))]
    pub async fn logout(&self, raw_token: Option<&str>) -> Result<()> {
        let user = self.sessions.resolve(raw_token).await?;
        // resolve() already rejected None and blank strings.
        let token = raw_token.unwrap_or_default();
        self.sessions.revoke(token).await?;
        info!(username = %user.username, "User logged out");
        Ok(())
    }

    pub async fn me(&self, raw_token: Option<&str>) -> Result<User> {
        Ok(self.sessions.resolve(raw_token).await?)
    }

    /// Resolve the session carried by a request's headers.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<User> {
        let token = self.carrier.extract(headers);
        self.me(token.as_deref()).await
    }

    /// Mint a refresh token. It cannot be used as a session credential.
    pub fn issue_refresh(&self, user: &User) -> Result<IssuedToken> {
        Ok(self.sessions.tokens().issue_refresh(&user.username)?)
    }

    pub fn session_cookie(&self, issued: &IssuedToken) -> Cookie<'static> {
        self.carrier
            .session_cookie(&issued.token, issued.max_age_secs())
    }

    pub fn removal_cookie(&self) -> Cookie<'static> {
        self.carrier.removal_cookie()
    }
}

fn validate_username(raw: &str) -> Result<&str> {
    let username = raw.trim();
    let len = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(ServiceError::invalid(format!(
            "username must be between {USERNAME_MIN} and {USERNAME_MAX} characters"
        )));
    }
    Ok(username)
}
