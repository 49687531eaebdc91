//! The three dashboard roles.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Role of the acting identity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    /// Front-line agent: sees own figures and own clients.
    Agent,
    /// Team lead: sees the team's figures and the team's clients.
    Team,
    /// Headquarters analyst: sees everything.
    Nova,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Agent => "AGENT",
            Role::Team => "TEAM",
            Role::Nova => "NOVA",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AGENT" => Ok(Role::Agent),
            "TEAM" => Ok(Role::Team),
            "NOVA" => Ok(Role::Nova),
            _ => Err(CoreError::unknown_role(s)),
        }
    }
}
