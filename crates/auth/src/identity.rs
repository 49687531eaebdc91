//! Session identity and the impersonation stack.

use serde::{Deserialize, Serialize};

use callboard_core::Role;

/// Credentials of the account currently acting.
///
/// Stack entries are opaque snapshots of this type: restoring one replaces
/// the current identity wholesale.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub token: String,
    pub role: Role,
    pub username: String,
}

impl SessionIdentity {
    pub fn new(token: impl Into<String>, role: Role, username: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            role,
            username: username.into(),
        }
    }

    /// Whether this identity can be persisted and restored: both token and
    /// username must be non-blank.
    pub fn is_complete(&self) -> bool {
        !self.token.trim().is_empty() && !self.username.trim().is_empty()
    }
}

impl core::fmt::Debug for SessionIdentity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionIdentity")
            .field("token", &"<redacted>")
            .field("role", &self.role)
            .field("username", &self.username)
            .finish()
    }
}

/// LIFO stack of identities that were active before each impersonation.
///
/// Invariant: non-empty exactly when the current identity is an
/// impersonated one. Persisted as a single JSON array value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImpersonationStack(Vec<SessionIdentity>);

impl ImpersonationStack {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, identity: SessionIdentity) {
        self.0.push(identity);
    }

    pub fn pop(&mut self) -> Option<SessionIdentity> {
        self.0.pop()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
