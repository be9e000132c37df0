//! Operations layered on the auth core.

pub mod accounts;
pub mod links;

#[cfg(test)]
mod test_helpers;

use std::sync::Arc;

use linkshelf_core::Config;

use crate::auth::{RevocationStore, SessionResolver, TokenCarrier, TokenService};
use crate::permission::PermissionEvaluator;
use crate::storage::CredentialStore;

pub use accounts::AccountService;
pub use links::LinkService;

/// Both services wired over the same store handles. Built once at startup.
pub struct Backend {
    pub accounts: AccountService,
    pub links: LinkService,
}

impl Backend {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        tokens: Arc<TokenService>,
        revocations: Arc<dyn RevocationStore>,
        config: &Config,
    ) -> Self {
        let timeout = config.storage.store_timeout();
        let sessions =
            SessionResolver::new(tokens, revocations, Arc::clone(&store), timeout);
        let permissions =
            PermissionEvaluator::new(Arc::clone(&store), config.permissions, timeout);

        Self {
            accounts: AccountService::new(
                Arc::clone(&store),
                sessions,
                TokenCarrier::from_config(&config.auth),
                timeout,
            ),
            links: LinkService::new(store, permissions, timeout),
        }
    }
}
