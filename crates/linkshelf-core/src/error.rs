//! Error types for `linkshelf` core library.

use thiserror::Error;

/// Result type alias using `linkshelf` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `linkshelf` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Settings file unreadable, malformed, or holding invalid values.
    #[error("Configuration error: {0}")]
    Config(String),
}
