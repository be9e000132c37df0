//! `SQLite` storage for linkshelf.
//!
//! Provides persistence for users, links, link grants and the token blacklist.

mod db;
mod models;
mod queries;
mod queries_links;
mod queries_revocations;
mod store;


pub use db::{DatabaseError, LinkDatabase};
pub use models::*;
pub use store::{CredentialStore, with_timeout};
