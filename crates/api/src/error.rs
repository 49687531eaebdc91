//! Fetch-layer errors.

use thiserror::Error;

use callboard_core::{PermissionError, Role};

/// Failure of a stats or client call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("backend unreachable: {0}")]
    Network(String),

    #[error("session expired; please sign in again")]
    Unauthorized,

    #[error(transparent)]
    Permission(PermissionError),

    #[error("backend error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("unreadable backend response: {0}")]
    Parse(String),

    #[error("no authenticated session")]
    NotAuthenticated,

    /// Rejected locally before reaching the backend.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl FetchError {
    /// Attach the acting role to a permission failure.
    pub fn for_role(self, role: Role) -> Self {
        match self {
            FetchError::Permission(p) => FetchError::Permission(p.for_role(role)),
            other => other,
        }
    }
}
