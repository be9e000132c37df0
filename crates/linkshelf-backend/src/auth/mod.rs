//! Authentication: tokens, passwords, the revocation blacklist and session
//! resolution.

pub mod carrier;
pub mod claims;
pub mod jwt;
pub mod password;
pub mod revocation;
pub mod session;

pub use carrier::TokenCarrier;
pub use claims::Claims;
pub use jwt::{IssuedToken, TokenError, TokenService};
pub use revocation::{
    MemoryRevocationStore, RevocationError, RevocationStore, SqliteRevocationStore,
};
pub use session::{SessionError, SessionResolver};
