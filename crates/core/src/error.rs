//! Error model shared by every crate in the workspace.

use thiserror::Error;

use crate::Role;

/// Parse/validation failures of core values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A role string was not one of AGENT/TEAM/NOVA.
    #[error("unknown role: {0}")]
    UnknownRole(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl CoreError {
    pub fn unknown_role(raw: impl Into<String>) -> Self {
        Self::UnknownRole(raw.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}

/// An action the backend may refuse depending on the acting role.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    Impersonate,
    ViewAgentStats,
    ViewTeamStats,
    ViewOrgStats,
    ViewClients,
    EditClient,
    DeleteClient,
    UpdateHourlyRate,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Impersonate => "impersonate",
            Action::ViewAgentStats => "view_agent_stats",
            Action::ViewTeamStats => "view_team_stats",
            Action::ViewOrgStats => "view_org_stats",
            Action::ViewClients => "view_clients",
            Action::EditClient => "edit_client",
            Action::DeleteClient => "delete_client",
            Action::UpdateHourlyRate => "update_hourly_rate",
        }
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The backend refused an action for the acting role.
///
/// Rendered as a role-aware sentence rather than a raw status code; the
/// backend's own message, if any, is appended.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{}", self.describe())]
pub struct PermissionError {
    pub role: Option<Role>,
    pub action: Action,
    pub message: Option<String>,
}

impl PermissionError {
    pub fn new(role: Option<Role>, action: Action) -> Self {
        Self {
            role,
            action,
            message: None,
        }
    }

    /// Fill in the acting role if the producer did not know it.
    pub fn for_role(mut self, role: Role) -> Self {
        self.role.get_or_insert(role);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        if !message.trim().is_empty() {
            self.message = Some(message);
        }
        self
    }

    /// Human-readable, role-aware explanation.
    pub fn describe(&self) -> String {
        let base = match (self.role, self.action) {
            (Some(Role::Agent), Action::Impersonate) => {
                "agents cannot act as another account".to_string()
            }
            (Some(Role::Team), Action::Impersonate) => {
                "team leads can only act as agents of their own team".to_string()
            }
            (Some(Role::Nova), Action::Impersonate) => {
                "the target account cannot be impersonated from headquarters".to_string()
            }
            (Some(Role::Agent), Action::ViewTeamStats) => {
                "agents cannot view team statistics".to_string()
            }
            (Some(role), Action::ViewOrgStats) if role != Role::Nova => {
                "only headquarters can view organisation-wide statistics".to_string()
            }
            (Some(Role::Nova), Action::EditClient | Action::DeleteClient) => {
                "headquarters has read-only access to client records".to_string()
            }
            (Some(Role::Agent), Action::DeleteClient) => {
                "agents cannot delete client records".to_string()
            }
            (Some(Role::Agent), Action::UpdateHourlyRate) => {
                "agents cannot change hourly rates".to_string()
            }
            (Some(role), action) => format!("{role} accounts are not allowed to {}", action.verb()),
            (None, action) => format!("not allowed to {}", action.verb()),
        };

        match &self.message {
            Some(msg) => format!("{base} ({msg})"),
            None => base,
        }
    }
}

impl Action {
    fn verb(&self) -> &'static str {
        match self {
            Action::Impersonate => "act as another account",
            Action::ViewAgentStats => "view agent statistics",
            Action::ViewTeamStats => "view team statistics",
            Action::ViewOrgStats => "view organisation statistics",
            Action::ViewClients => "view client records",
            Action::EditClient => "edit client records",
            Action::DeleteClient => "delete client records",
            Action::UpdateHourlyRate => "change hourly rates",
        }
    }
}
