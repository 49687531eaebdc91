//! `callboard-views`: the view-model reconciler.
//!
//! Pure, synchronous transforms from raw backend JSON into the typed
//! collections each role's dashboard renders. Nothing here performs IO or
//! returns an error: malformed or missing fields degrade to defaults.

pub mod agent;
pub mod client;
pub mod history;
pub mod optimistic;
pub mod org;
pub mod team;

mod raw;

pub use agent::{
    AgentStat, AgentView, FigureSource, PeriodBreakdown, PeriodFigures, hours_to_minutes,
    reconcile_agent_view,
};
pub use client::{
    AgentRef, ClientRecord, ClientStatus, ClientStatusSummary, filter_clients_by_role,
    parse_timestamp, reconcile_clients,
};
pub use history::{HistoryPoint, Period, reconcile_history};
pub use optimistic::{PendingRateEdit, apply_hourly_rate};
pub use org::{OrgOverview, reconcile_org_overview};
pub use team::{TeamOrgView, TeamStat, reconcile_team_org_view, reconcile_teams};
