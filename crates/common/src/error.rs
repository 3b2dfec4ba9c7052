//! Error taxonomy shared by every layer of the store
//!
//! The five caller-visible categories are carried across node and mount
//! transports as an [`ErrorKind`] plus a message, and rebuilt on the far side
//! with [`StoreError::from_kind`].

use serde::{Deserialize, Serialize};

use crate::crypto::{KeyError, SecretError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PermissionDenied,
    Unavailable,
    NotFound,
    InvalidArgument,
    Conflict,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            StoreError::Unavailable(_) => ErrorKind::Unavailable,
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            StoreError::Conflict(_) => ErrorKind::Conflict,
            StoreError::Io(_)
            | StoreError::Codec(_)
            | StoreError::Key(_)
            | StoreError::Secret(_)
            | StoreError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn from_kind(kind: ErrorKind, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        match kind {
            ErrorKind::PermissionDenied => StoreError::PermissionDenied(msg),
            ErrorKind::Unavailable => StoreError::Unavailable(msg),
            ErrorKind::NotFound => StoreError::NotFound(msg),
            ErrorKind::InvalidArgument => StoreError::InvalidArgument(msg),
            ErrorKind::Conflict => StoreError::Conflict(msg),
            ErrorKind::Internal => StoreError::Internal(msg),
        }
    }

    /// Errors that the coordinator may retry against another owner or a
    /// later attempt. Everything else goes straight back to the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Unavailable)
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        StoreError::PermissionDenied(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        StoreError::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        StoreError::NotFound(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        StoreError::Unavailable(msg.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
