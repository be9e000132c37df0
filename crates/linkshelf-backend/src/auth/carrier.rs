//! Where the session token travels: the `access_token` cookie or an
//! `Authorization: Bearer` header.

use cookie::time::Duration as CookieDuration;
use cookie::{Cookie, SameSite};
use http::HeaderMap;
use http::header::{AUTHORIZATION, COOKIE};
use linkshelf_core::config::{AuthConfig, CarrierPolicy};

const BEARER: &str = "bearer ";

#[derive(Debug, Clone)]
pub struct TokenCarrier {
    policy: CarrierPolicy,
    cookie_name: String,
    production: bool,
}

impl TokenCarrier {
    pub fn new(policy: CarrierPolicy, cookie_name: impl Into<String>, production: bool) -> Self {
        Self {
            policy,
            cookie_name: cookie_name.into(),
            production,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.carrier, config.cookie_name.clone(), config.production)
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Pull the raw token out of request headers, honouring the configured
    /// precedence when both carriers are present.
    pub fn extract(&self, headers: &HeaderMap) -> Option<String> {
        match self.policy {
            CarrierPolicy::CookieFirst => {
                self.from_cookie(headers).or_else(|| from_bearer(headers))
            }
            CarrierPolicy::BearerFirst => {
                from_bearer(headers).or_else(|| self.from_cookie(headers))
            }
        }
    }

    fn from_cookie(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(Result::ok)
            .find(|c| c.name() == self.cookie_name && !c.value().is_empty())
            .map(|c| c.value().to_string())
    }

    /// Cookie that carries a freshly issued access token.
    pub fn session_cookie(&self, token: &str, max_age_secs: i64) -> Cookie<'static> {
        Cookie::build((self.cookie_name.clone(), token.to_string()))
            .path("/")
            .http_only(true)
            .secure(self.production)
            .same_site(SameSite::Lax)
            .max_age(CookieDuration::seconds(max_age_secs))
            .build()
    }

    /// Cookie that tells the client to drop the session cookie.
    pub fn removal_cookie(&self) -> Cookie<'static> {
        let mut cookie = Cookie::build((self.cookie_name.clone(), String::new()))
            .path("/")
            .http_only(true)
            .secure(self.production)
            .same_site(SameSite::Lax)
            .build();
        cookie.make_removal();
        cookie
    }
}

fn from_bearer(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, rest) = value.split_at_checked(BEARER.len())?;
    if !scheme.eq_ignore_ascii_case(BEARER) {
        return None;
    }
    let token = rest.trim();
    (!token.is_empty()).then(|| token.to_string())
}
