//! Auth backend seam.

use async_trait::async_trait;

use callboard_core::Role;

use crate::error::AuthError;

/// Successful login response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginGrant {
    pub token: String,
    pub role: Role,
}

/// Response to an impersonation request.
///
/// `success == false` carries the backend's refusal message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImpersonationGrant {
    pub success: bool,
    pub token: Option<String>,
    pub role: Option<Role>,
    pub message: Option<String>,
}

/// Operations the session manager needs from the auth backend.
#[async_trait]
pub trait AuthClient: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> Result<LoginGrant, AuthError>;

    /// Best-effort; callers ignore failures.
    async fn logout(&self, token: &str) -> Result<(), AuthError>;

    async fn impersonate_team(
        &self,
        token: &str,
        team_username: &str,
    ) -> Result<ImpersonationGrant, AuthError>;

    async fn impersonate_agent(
        &self,
        token: &str,
        agent_username: &str,
    ) -> Result<ImpersonationGrant, AuthError>;
}

#[async_trait]
impl<T> AuthClient for std::sync::Arc<T>
where
    T: AuthClient + ?Sized,
{
    async fn login(&self, username: &str, password: &str) -> Result<LoginGrant, AuthError> {
        (**self).login(username, password).await
    }

    async fn logout(&self, token: &str) -> Result<(), AuthError> {
        (**self).logout(token).await
    }

    async fn impersonate_team(
        &self,
        token: &str,
        team_username: &str,
    ) -> Result<ImpersonationGrant, AuthError> {
        (**self).impersonate_team(token, team_username).await
    }

    async fn impersonate_agent(
        &self,
        token: &str,
        agent_username: &str,
    ) -> Result<ImpersonationGrant, AuthError> {
        (**self).impersonate_agent(token, agent_username).await
    }
}
