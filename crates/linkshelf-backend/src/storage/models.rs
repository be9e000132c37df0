//! Data models for linkshelf storage.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Link {
    pub id: i64,
    pub created_by: i64,
    pub name: String,
    pub url: String,
    pub category: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Link {
    pub const fn is_owned_by(&self, user: &User) -> bool {
        self.created_by == user.id
    }
}

/// Level carried by a grant row. `Write` implies `Read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AccessLevel {
    Read,
    Write,
}

impl AccessLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown access level {0:?} (expected \"read\" or \"write\")")]
pub struct ParseAccessLevelError(pub String);

impl FromStr for AccessLevel {
    type Err = ParseAccessLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            other => Err(ParseAccessLevelError(other.to_string())),
        }
    }
}

/// One row of `link_permissions`: a non-owner's access to a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Grant {
    pub id: i64,
    pub link_id: i64,
    pub user_id: i64,
    pub permission: AccessLevel,
}

/// A grant joined with the grantee's username, for listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct GrantView {
    pub user_id: i64,
    pub username: String,
    pub permission: AccessLevel,
}

/// Fields for a new link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLink {
    pub name: String,
    pub url: String,
    pub category: String,
}

/// Partial link update. Only fields that are `Some` are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl LinkPatch {
    pub const fn is_empty(&self) -> bool {
        self.name.is_none() && self.url.is_none() && self.category.is_none()
    }

    /// Merge the present fields onto `link`, leaving the rest untouched.
    pub fn apply_to(&self, link: &mut Link) {
        if let Some(name) = &self.name {
            link.name.clone_from(name);
        }
        if let Some(url) = &self.url {
            link.url.clone_from(url);
        }
        if let Some(category) = &self.category {
            link.category.clone_from(category);
        }
    }
}
