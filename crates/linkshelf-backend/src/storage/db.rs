//! `SQLite` database for linkshelf.

pub use linkshelf_core::db::DatabaseError;

linkshelf_core::define_database!(LinkDatabase, "Link database migrations complete");
