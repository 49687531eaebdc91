//! `callboard-auth`: session identity and the impersonation stack.
//!
//! Owns the durable "who is acting now" state. The auth backend and the
//! persistence surface are injected through the [`AuthClient`] and
//! [`SessionStore`] traits; this crate never talks HTTP itself.

pub mod client;
pub mod error;
pub mod identity;
pub mod manager;
pub mod sqlite;
pub mod store;

pub use client::{AuthClient, ImpersonationGrant, LoginGrant};
pub use error::{AuthError, MalformedState, SessionError, StoreError};
pub use identity::{ImpersonationStack, SessionIdentity};
pub use manager::{SessionManager, SessionSnapshot, SessionState};
pub use sqlite::SqliteSessionStore;
pub use store::{InMemorySessionStore, SessionStore, StoreWrite};
