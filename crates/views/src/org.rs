//! Organisation-wide overview for the NOVA role.

use serde::Serialize;
use serde_json::Value;

use crate::raw::{self, RawRecord};
use crate::team::{self, TeamStat};

/// Number of teams shown in the leaderboard when the backend sends none.
pub const TOP_TEAMS: usize = 5;

/// Org-wide totals plus the team leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrgOverview {
    pub team_count: u64,
    pub agent_count: u64,
    pub total_calls: u64,
    pub total_sales: u64,
    pub talk_time_hours: f64,
    pub wait_time_hours: f64,
    pub pause_time_hours: f64,
    pub estimated_earnings: f64,
    pub conversion_rate: f64,
    pub top_teams: Vec<TeamStat>,
}

/// Build the overview.
///
/// Totals supplied in `org` win field by field; anything it omits is summed
/// from `teams`. The leaderboard comes from `top_teams` when that payload is
/// non-empty, otherwise from the best-ranked entries of `teams`.
pub fn reconcile_org_overview(org: &Value, teams: &[TeamStat], top_teams: &Value) -> OrgOverview {
    let org_record = raw::records(org).into_iter().next();
    let measured = |names: &[&str]| org_record.and_then(|r: RawRecord<'_>| r.opt_count(names));
    let measured_hours = |names: &[&str]| org_record.and_then(|r: RawRecord<'_>| r.opt_hours(names));

    let total_calls = measured(&["total_calls", "totalCalls"])
        .unwrap_or_else(|| teams.iter().map(|t| t.total_calls).sum());
    let total_sales = measured(&["total_sales", "totalSales"])
        .unwrap_or_else(|| teams.iter().map(|t| t.total_sales).sum());

    let mut leaderboard = team::reconcile_teams(top_teams);
    if leaderboard.is_empty() {
        leaderboard = teams.to_vec();
        leaderboard.sort_by_key(|t| t.rank);
        leaderboard.truncate(TOP_TEAMS);
    }

    OrgOverview {
        team_count: measured(&["team_count", "teamCount", "total_teams", "totalTeams"])
            .unwrap_or(teams.len() as u64),
        agent_count: measured(&["agent_count", "agentCount", "total_agents", "totalAgents"])
            .unwrap_or_else(|| teams.iter().map(|t| t.agent_count).sum()),
        total_calls,
        total_sales,
        talk_time_hours: measured_hours(&["talk_time_hours", "talkTimeHours"])
            .unwrap_or_else(|| teams.iter().map(|t| t.talk_time_hours).sum()),
        wait_time_hours: measured_hours(&["wait_time_hours", "waitTimeHours"])
            .unwrap_or_else(|| teams.iter().map(|t| t.wait_time_hours).sum()),
        pause_time_hours: measured_hours(&["pause_time_hours", "pauseTimeHours"])
            .unwrap_or_else(|| teams.iter().map(|t| t.pause_time_hours).sum()),
        estimated_earnings: org_record
            .and_then(|r| r.opt_amount(&["estimated_earnings", "estimatedEarnings"]))
            .unwrap_or_else(|| teams.iter().map(|t| t.estimated_earnings).sum()),
        conversion_rate: team::ratio(total_sales, total_calls),
        top_teams: leaderboard,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn teams() -> Vec<TeamStat> {
        team::reconcile_teams(&json!([
            {"teamName": "A", "agentCount": 3, "totalCalls": 100, "totalSales": 10, "rank": 2},
            {"teamName": "B", "agentCount": 2, "totalCalls": 50, "totalSales": 15, "rank": 1},
        ]))
    }

    #[test]
    fn totals_are_summed_when_backend_omits_them() {
        let overview = reconcile_org_overview(&Value::Null, &teams(), &Value::Null);
        assert_eq!(overview.team_count, 2);
        assert_eq!(overview.agent_count, 5);
        assert_eq!(overview.total_calls, 150);
        assert_eq!(overview.total_sales, 25);
        assert!((overview.conversion_rate - 25.0 / 150.0).abs() < 1e-12);
    }

    #[test]
    fn backend_totals_win() {
        let org = json!({"totalCalls": 1000, "totalSales": 100});
        let overview = reconcile_org_overview(&org, &teams(), &Value::Null);
        assert_eq!(overview.total_calls, 1000);
        assert_eq!(overview.agent_count, 5);
        assert!((overview.conversion_rate - 0.1).abs() < 1e-12);
    }

    #[test]
    fn leaderboard_falls_back_to_rank_order() {
        let overview = reconcile_org_overview(&Value::Null, &teams(), &json!([]));
        let names: Vec<&str> = overview.top_teams.iter().map(|t| t.team_name.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);
    }

    #[test]
    fn empty_org_has_zero_conversion() {
        let overview = reconcile_org_overview(&Value::Null, &[], &Value::Null);
        assert_eq!(overview.total_calls, 0);
        assert_eq!(overview.conversion_rate, 0.0);
        assert!(overview.top_teams.is_empty());
    }
}
