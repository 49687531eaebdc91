//! `callboard-core`: shared vocabulary for the dashboard crates.
//!
//! Pure types only: roles, identifiers and the permission error model.
//! No IO, no async.

pub mod error;
pub mod id;
pub mod role;

pub use error::{Action, CoreError, PermissionError};
pub use id::{AgentKey, ClientId};
pub use role::Role;
