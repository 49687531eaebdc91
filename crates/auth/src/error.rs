//! Session-layer error model.

use thiserror::Error;

use callboard_core::PermissionError;

/// Authentication failures reported by the auth backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("session token is invalid or expired")]
    InvalidToken,

    /// An identity without a username or token; it could not be restored.
    #[error("identity is missing a username or token")]
    IncompleteIdentity,

    /// The backend refused the request (HTTP 403 or equivalent).
    #[error("forbidden")]
    Forbidden(Option<String>),

    #[error("authentication rejected: {0}")]
    Rejected(String),

    #[error("auth backend unreachable: {0}")]
    Transport(String),
}

/// Failure of the durable session store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("session store failure: {0}")]
    Backend(String),
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        Self::Backend(format!("{err:#}"))
    }
}

/// Corrupt persisted session state.
///
/// Never surfaced to callers: the manager clears the offending keys, logs
/// the cause and carries on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MalformedState {
    #[error("persisted identity is incomplete")]
    PartialIdentity,

    #[error("persisted role is not recognised: {0}")]
    UnknownRole(String),

    #[error("persisted impersonation stack is unreadable: {0}")]
    Stack(String),

    #[error("session store could not be read: {0}")]
    Unreadable(String),
}

/// Errors surfaced by [`crate::SessionManager`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Permission(#[from] PermissionError),

    #[error("no authenticated session")]
    NotAuthenticated,

    #[error(transparent)]
    Storage(#[from] StoreError),
}
