//! Team statistics and the TEAM/NOVA view.

use serde::Serialize;
use serde_json::Value;

use callboard_core::Role;

use crate::agent::{self, AgentStat};
use crate::client::{self, ClientRecord};
use crate::raw::{self, RawRecord};

const NAME: &[&str] = &["team_name", "teamName", "name", "campagne", "campaign"];
const AGENT_COUNT: &[&str] = &["agent_count", "agentCount", "agents_count", "agentsCount"];
const CALLS: &[&str] = &["total_calls", "totalCalls"];
const SALES: &[&str] = &["total_sales", "totalSales", "bookings"];
const TALK: &[&str] = &["talk_time_hours", "talkTimeHours"];
const WAIT: &[&str] = &["wait_time_hours", "waitTimeHours"];
const PAUSE: &[&str] = &["pause_time_hours", "pauseTimeHours"];
const EARNINGS: &[&str] = &["estimated_earnings", "estimatedEarnings"];
const RANK: &[&str] = &["rank", "rang"];
const AGENTS: &[&str] = &["agents", "agent_stats", "agentStats"];

/// Aggregated counters for one team plus its agents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamStat {
    pub team_name: String,
    pub agent_count: u64,
    pub total_calls: u64,
    pub total_sales: u64,
    pub talk_time_hours: f64,
    pub wait_time_hours: f64,
    pub pause_time_hours: f64,
    pub estimated_earnings: f64,
    pub rank: u32,
    pub agents: Vec<AgentStat>,
}

impl TeamStat {
    fn from_raw(record: RawRecord<'_>) -> Self {
        let agents = agent::agents_from_records(record.list(AGENTS));
        let agent_count = record
            .opt_count(AGENT_COUNT)
            .unwrap_or(agents.len() as u64);

        Self {
            team_name: record.text(NAME),
            agent_count,
            total_calls: record.count(CALLS),
            total_sales: record.count(SALES),
            talk_time_hours: record.hours(TALK),
            wait_time_hours: record.hours(WAIT),
            pause_time_hours: record.hours(PAUSE),
            estimated_earnings: record.opt_amount(EARNINGS).unwrap_or(0.0),
            rank: record
                .opt_id(RANK)
                .map(|r| u32::try_from(r).unwrap_or(u32::MAX))
                .unwrap_or(0),
            agents,
        }
    }

    /// Sales per call, `0.0` when the team made no calls.
    pub fn conversion_rate(&self) -> f64 {
        ratio(self.total_sales, self.total_calls)
    }
}

pub(crate) fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Normalize a teams payload (one object, a list, or `{"teams": [...]}`).
pub fn reconcile_teams(teams: &Value) -> Vec<TeamStat> {
    let mut teams: Vec<TeamStat> = raw::records_in(teams, &["teams", "data"])
        .into_iter()
        .map(TeamStat::from_raw)
        .collect();

    agent::fill_missing_ranks(teams.iter_mut().map(|t| (&mut t.rank, t.total_sales)));
    teams
}

/// Result of [`reconcile_team_org_view`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamOrgView {
    pub role: Role,
    pub teams: Vec<TeamStat>,
    pub clients: Vec<ClientRecord>,
    /// Index into `teams` of the acting team lead's own team (TEAM role only).
    pub own_team: Option<usize>,
}

impl TeamOrgView {
    pub fn own_team(&self) -> Option<&TeamStat> {
        self.own_team.and_then(|i| self.teams.get(i))
    }
}

/// Build the team/org view from the raw teams and clients payloads.
///
/// Clients are normalized but not filtered; see
/// [`crate::client::filter_clients_by_role`].
pub fn reconcile_team_org_view(
    teams_list: &Value,
    clients_list: &Value,
    role: Role,
    current_username: &str,
) -> TeamOrgView {
    let teams = reconcile_teams(teams_list);
    let clients = client::reconcile_clients(clients_list);

    let own_team = match role {
        Role::Team if !teams.is_empty() => Some(
            teams
                .iter()
                .position(|t| t.team_name == current_username)
                .unwrap_or(0),
        ),
        _ => None,
    };

    TeamOrgView {
        role,
        teams,
        clients,
        own_team,
    }
}
