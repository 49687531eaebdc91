//! `callboard-api`: backend access and the role-aware dashboard.
//!
//! [`HttpBackend`] speaks to the call-center REST API and implements the
//! auth, stats and clients seams. [`Dashboard`] fetches for whichever
//! identity the session manager currently publishes and feeds the payloads
//! through the reconciler.

pub mod backend;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod http;

pub use backend::{Backend, ClientPayload, ClientsApi, StatsApi};
pub use config::{ApiConfig, ConfigError};
pub use dashboard::{Dashboard, DashboardState, RefreshOutcome, RoleView, ViewOwner};
pub use error::FetchError;
pub use http::HttpBackend;
