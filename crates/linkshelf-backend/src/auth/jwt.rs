//! Session token issuance and verification.
//!
//! Verification is a pure function of the token, the secret and the clock.
//! Revocation is layered on top by the session resolver.

use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use linkshelf_core::config::AuthConfig;
use linkshelf_core::db::unix_timestamp;
use sha2::{Digest, Sha256};

use super::claims::{ACCESS, Claims, REFRESH};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token signature does not match")]
    InvalidSignature,

    #[error("token expired")]
    Expired,

    #[error("token is malformed: {0}")]
    Malformed(String),

    #[error("unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("token encoding failed: {0}")]
    Encoding(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => Self::InvalidSignature,
            ErrorKind::ExpiredSignature => Self::Expired,
            _ => Self::Malformed(e.to_string()),
        }
    }
}

/// A freshly minted token together with the claims it carries.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

impl IssuedToken {
    pub const fn expires_at(&self) -> i64 {
        self.claims.exp
    }

    /// Lifetime at issuance, used for cookie `Max-Age`.
    pub const fn max_age_secs(&self) -> i64 {
        self.claims.exp - self.claims.iat
    }
}

/// Creates and validates signed, time-limited session tokens.
#[derive(Clone)]
pub struct TokenService {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl TokenService {
    /// Create a new `TokenService`. Only the HMAC family is accepted since
    /// the key is a shared secret.
    pub fn new(
        secret: &[u8],
        algorithm: Algorithm,
        access_ttl_secs: i64,
        refresh_ttl_secs: i64,
    ) -> Result<Self, TokenError> {
        if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(TokenError::UnsupportedAlgorithm(format!("{algorithm:?}")));
        }
        if secret.is_empty() {
            return Err(TokenError::Encoding("signing secret is empty".into()));
        }

        Ok(Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_ttl_secs,
            refresh_ttl_secs,
        })
    }

    pub fn from_config(secret: &[u8], config: &AuthConfig) -> Result<Self, TokenError> {
        let algorithm = Algorithm::from_str(&config.algorithm)
            .map_err(|_| TokenError::UnsupportedAlgorithm(config.algorithm.clone()))?;
        Self::new(
            secret,
            algorithm,
            config.access_ttl_secs,
            config.refresh_ttl_secs,
        )
    }

    pub const fn access_ttl_secs(&self) -> i64 {
        self.access_ttl_secs
    }

    pub const fn refresh_ttl_secs(&self) -> i64 {
        self.refresh_ttl_secs
    }

    /// Issue an access token for `username` that expires `ttl` from now.
    pub fn issue(&self, username: &str, ttl: Duration) -> Result<IssuedToken, TokenError> {
        let ttl_secs = i64::try_from(ttl.as_secs())
            .map_err(|_| TokenError::Encoding("token lifetime too large".into()))?;
        self.issue_at(username, ttl_secs, ACCESS, unix_timestamp())
    }

    /// Issue an access token with the configured lifetime.
    pub fn issue_access(&self, username: &str) -> Result<IssuedToken, TokenError> {
        self.issue_at(username, self.access_ttl_secs, ACCESS, unix_timestamp())
    }

    /// Issue a refresh token with the configured lifetime.
    pub fn issue_refresh(&self, username: &str) -> Result<IssuedToken, TokenError> {
        self.issue_at(username, self.refresh_ttl_secs, REFRESH, unix_timestamp())
    }

    pub(crate) fn issue_at(
        &self,
        username: &str,
        ttl_secs: i64,
        token_type: &str,
        now: i64,
    ) -> Result<IssuedToken, TokenError> {
        if ttl_secs <= 0 {
            return Err(TokenError::Encoding("token lifetime must be positive".into()));
        }
        let exp = now
            .checked_add(ttl_secs)
            .ok_or_else(|| TokenError::Encoding("token lifetime too large".into()))?;

        let claims = Claims {
            sub: username.to_string(),
            exp,
            iat: now,
            jti: uuid::Uuid::new_v4().to_string(),
            token_type: token_type.to_string(),
        };

        let token = jsonwebtoken::encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))?;

        Ok(IssuedToken { token, claims })
    }

    /// Validate a token against the current time and return its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, unix_timestamp())
    }

    /// Validate a token as of `now`. A token is expired once `now > exp`.
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Claims, TokenError> {
        let claims = self.decode(token)?;
        if now > claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    /// Check the signature and shape only, ignoring expiry.
    pub(crate) fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        // Expiry is compared against our own clock in `verify_at`.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)?;
        Ok(data.claims)
    }

    /// SHA-256 fingerprint of a token, for log lines and storage keys.
    pub fn fingerprint(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}
