//! linkshelf backend library
//!
//! The auth core of the link-bookmarking backend and the operations built on it:
//! - Signed session tokens, password hashing and the token blacklist
//! - Session resolution from cookie or bearer carriers
//! - Per-link permission evaluation and sharing
//! - `SQLite` credential store
//! - Account and link services with a typed error taxonomy

pub mod auth;
pub mod error;
pub mod permission;
pub mod service;
pub mod storage;

pub use error::{ErrorKind, ServiceError};
pub use service::Backend;
