//! Shared setup for the service test modules.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use jsonwebtoken::Algorithm;
use linkshelf_core::Config;

use super::Backend;
use crate::auth::{MemoryRevocationStore, RevocationStore, TokenService};
use crate::storage::{LinkDatabase, NewLink, User};

pub struct Harness {
    pub backend: Backend,
    pub db: LinkDatabase,
    pub revocations: Arc<MemoryRevocationStore>,
}

pub async fn harness() -> Harness {
    harness_with(Config::default()).await
}

pub async fn harness_with(config: Config) -> Harness {
    let db = LinkDatabase::open_in_memory().await.unwrap();
    let tokens =
        Arc::new(TokenService::new(b"test-secret", Algorithm::HS256, 3600, 604_800).unwrap());
    let revocations = Arc::new(MemoryRevocationStore::new());
    let backend = Backend::new(
        Arc::new(db.clone()),
        tokens,
        Arc::clone(&revocations) as Arc<dyn RevocationStore>,
        &config,
    );
    Harness {
        backend,
        db,
        revocations,
    }
}

/// Register `username` with a fixed password and return the user.
pub async fn register(h: &Harness, username: &str) -> User {
    h.backend
        .accounts
        .register(username, "pw1")
        .await
        .unwrap()
        .0
}

pub fn new_link(name: &str, url: &str, category: &str) -> NewLink {
    NewLink {
        name: name.into(),
        url: url.into(),
        category: category.into(),
    }
}
