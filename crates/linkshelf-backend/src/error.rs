//! Error taxonomy seen by callers of the services, and the boundary mapping
//! from error kind to HTTP status.

use http::StatusCode;

use crate::auth::password::PasswordError;
use crate::auth::{SessionError, TokenError};
use crate::permission::PermissionError;
use crate::storage::DatabaseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthenticated,
    Forbidden,
    NotFound,
    Conflict,
    StoreUnavailable,
    InvalidArgument,
    Internal,
}

impl ErrorKind {
    /// Wire status for this kind. Only the boundary layer should call this.
    pub const fn status_code(self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidArgument => StatusCode::BAD_REQUEST,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Every session rejection looks the same from outside. The cause is
    /// kept as the error source.
    #[error("not authenticated")]
    Unauthenticated(#[source] Option<SessionError>),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthenticated(_) => ErrorKind::Unauthenticated,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub const fn status_code(&self) -> StatusCode {
        self.kind().status_code()
    }

    /// The session failure behind an `Unauthenticated`, if any.
    pub const fn session_cause(&self) -> Option<&SessionError> {
        match self {
            Self::Unauthenticated(Some(cause)) => Some(cause),
            _ => None,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

impl From<SessionError> for ServiceError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::StoreUnavailable(msg) => Self::StoreUnavailable(msg),
            SessionError::Store(msg) => Self::Internal(msg),
            other => Self::Unauthenticated(Some(other)),
        }
    }
}

impl From<PermissionError> for ServiceError {
    fn from(e: PermissionError) -> Self {
        match e {
            PermissionError::SelfShare | PermissionError::InvalidLevel(_) => {
                Self::InvalidArgument(e.to_string())
            }
            PermissionError::GranteeNotFound(_)
            | PermissionError::LinkNotFound(_)
            | PermissionError::NotFound(_) => Self::NotFound(e.to_string()),
            PermissionError::GranteeIsOwner(_) => Self::Conflict(e.to_string()),
            PermissionError::Forbidden(msg) => Self::Forbidden(msg),
            PermissionError::StoreUnavailable(msg) => Self::StoreUnavailable(msg),
            PermissionError::Store(msg) => Self::Internal(msg),
        }
    }
}

impl From<DatabaseError> for ServiceError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound(msg) => Self::NotFound(msg),
            DatabaseError::Conflict(msg) => Self::Conflict(msg),
            e if e.is_unavailable() => Self::StoreUnavailable(e.to_string()),
            e => Self::Internal(e.to_string()),
        }
    }
}

impl From<TokenError> for ServiceError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Encoding(msg) | TokenError::UnsupportedAlgorithm(msg) => {
                Self::Internal(msg)
            }
            other => Self::Unauthenticated(Some(SessionError::Token(other))),
        }
    }
}

impl From<PasswordError> for ServiceError {
    fn from(e: PasswordError) -> Self {
        Self::Internal(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
