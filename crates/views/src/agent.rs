//! Agent statistics: merge of "my stats" and "top agents" payloads.

use serde::Serialize;
use serde_json::Value;

use callboard_core::{AgentKey, Role};

use crate::raw::{self, RawRecord};

/// Multipliers used to approximate week/month figures from a day when the
/// backend does not supply them.
pub const WEEK_ESTIMATE_MULTIPLIER: u32 = 5;
pub const MONTH_ESTIMATE_MULTIPLIER: u32 = 20;

const ID: &[&str] = &["vicidial_id", "vicidialId", "id"];
const NAME: &[&str] = &["agent_name", "agentName", "name", "username"];
const EMAIL: &[&str] = &["email", "agent_email", "agentEmail"];
const CAMPAIGN: &[&str] = &["campaign", "campagne", "team_name", "teamName"];
const CALLS: &[&str] = &["total_calls", "totalCalls", "calls"];
const SALES: &[&str] = &["total_sales", "totalSales", "bookings", "sales"];
const CALLBACKS: &[&str] = &["callbacks", "callback_count", "callbackCount"];
const NO_ANSWER: &[&str] = &["no_answer", "noAnswer"];
const NOT_INTERESTED: &[&str] = &["not_interested", "notInterested"];
const TALK: &[&str] = &["talk_time_hours", "talkTimeHours"];
const WAIT: &[&str] = &["wait_time_hours", "waitTimeHours"];
const PAID: &[&str] = &["paid_time_hours", "paidTimeHours"];
const RATE: &[&str] = &["hourly_rate", "hourlyRate"];
const EARNINGS: &[&str] = &["estimated_earnings", "estimatedEarnings"];
const RANK: &[&str] = &["rank", "rang"];

/// Where a period figure came from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FigureSource {
    /// Supplied by the backend.
    Measured,
    /// Synthesized as `today × multiplier`; display as an estimate.
    Estimated { multiplier: u32 },
}

/// Calls, sales and talk time over one period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodFigures {
    pub calls: u64,
    pub sales: u64,
    pub talk_time_hours: f64,
    pub source: FigureSource,
}

impl PeriodFigures {
    pub fn is_estimate(&self) -> bool {
        matches!(self.source, FigureSource::Estimated { .. })
    }

    fn estimated_from(today: &PeriodFigures, multiplier: u32) -> Self {
        let m = u64::from(multiplier);
        Self {
            calls: today.calls.saturating_mul(m),
            sales: today.sales.saturating_mul(m),
            talk_time_hours: today.talk_time_hours * f64::from(multiplier),
            source: FigureSource::Estimated { multiplier },
        }
    }
}

/// Today/week/month view of an agent's activity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodBreakdown {
    pub today: PeriodFigures,
    pub week: PeriodFigures,
    pub month: PeriodFigures,
}

/// One agent's aggregated performance for a period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentStat {
    pub vicidial_id: Option<u64>,
    pub agent_name: String,
    pub email: Option<String>,
    pub campaign: String,
    pub total_calls: u64,
    pub total_sales: u64,
    pub callbacks: u64,
    pub no_answer: u64,
    pub not_interested: u64,
    pub talk_time_hours: f64,
    pub wait_time_hours: f64,
    pub paid_time_hours: f64,
    pub hourly_rate: f64,
    pub estimated_earnings: f64,
    /// 1-based; backend-supplied unless the backend omitted it.
    pub rank: u32,
    pub periods: PeriodBreakdown,
}

impl AgentStat {
    pub fn key(&self) -> AgentKey {
        match self.vicidial_id {
            Some(id) => AgentKey::Id(id),
            None => AgentKey::Name(self.agent_name.clone()),
        }
    }

    /// Whether this entry is identified by `key`.
    pub fn has_key(&self, key: &AgentKey) -> bool {
        match key {
            AgentKey::Id(id) => self.vicidial_id == Some(*id),
            AgentKey::Name(name) => self.vicidial_id.is_none() && &self.agent_name == name,
        }
    }

    pub fn talk_minutes(&self) -> u64 {
        hours_to_minutes(self.talk_time_hours)
    }

    pub fn wait_minutes(&self) -> u64 {
        hours_to_minutes(self.wait_time_hours)
    }

    pub fn paid_minutes(&self) -> u64 {
        hours_to_minutes(self.paid_time_hours)
    }
}

/// Display-only minutes, rounded toward zero.
pub fn hours_to_minutes(hours: f64) -> u64 {
    if hours.is_finite() && hours > 0.0 {
        (hours * 60.0).trunc() as u64
    } else {
        0
    }
}

/// Result of [`reconcile_agent_view`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentView {
    pub role: Role,
    pub agents: Vec<AgentStat>,
    pub my_agent: Option<AgentStat>,
}

/// Merge the personal stats payload with the top-agents payload.
///
/// Either payload may be one object, a list, or absent. Entries are merged by
/// identity key (dialer id when both sides carry one, display name
/// otherwise); `my_stats` fields win on conflict and fill in nothing the
/// other side already provides. Entries only in `top5` follow every
/// `my_stats` entry, in `top5` order.
pub fn reconcile_agent_view(
    my_stats: &Value,
    top5: &Value,
    role: Role,
    current_username: &str,
) -> AgentView {
    let primary: Vec<AgentDraft> = raw::records(my_stats)
        .into_iter()
        .map(AgentDraft::from_raw)
        .collect();
    let secondary: Vec<AgentDraft> = raw::records(top5)
        .into_iter()
        .map(AgentDraft::from_raw)
        .collect();

    let agents = finish_agents(merge_drafts(primary, secondary));
    let my_agent = agents
        .iter()
        .find(|a| is_current_user(a, current_username))
        .cloned();

    AgentView {
        role,
        agents,
        my_agent,
    }
}

/// Normalize a plain list of agent records (e.g. a team's embedded list).
pub(crate) fn agents_from_records(records: Vec<RawRecord<'_>>) -> Vec<AgentStat> {
    let drafts = records.into_iter().map(AgentDraft::from_raw).collect();
    finish_agents(merge_drafts(drafts, Vec::new()))
}

fn is_current_user(agent: &AgentStat, current_username: &str) -> bool {
    if current_username.is_empty() {
        return false;
    }
    agent.agent_name == current_username || agent.email.as_deref() == Some(current_username)
}

fn merge_drafts(primary: Vec<AgentDraft>, secondary: Vec<AgentDraft>) -> Vec<AgentDraft> {
    let mut merged: Vec<AgentDraft> = Vec::with_capacity(primary.len() + secondary.len());
    for draft in primary.into_iter().chain(secondary) {
        match merged.iter_mut().find(|existing| existing.same_agent(&draft)) {
            Some(existing) => existing.fill_from(draft),
            None => merged.push(draft),
        }
    }
    merged
}

fn finish_agents(drafts: Vec<AgentDraft>) -> Vec<AgentStat> {
    let mut agents: Vec<AgentStat> = drafts.into_iter().map(AgentDraft::finish).collect();
    fill_missing_ranks(agents.iter_mut().map(|a| (&mut a.rank, a.total_sales)));
    agents
}

/// Rank entries the backend left unranked (`0`) after the highest backend
/// rank, by descending booking count; equal counts keep input order.
pub(crate) fn fill_missing_ranks<'a>(entries: impl IntoIterator<Item = (&'a mut u32, u64)>) {
    let entries: Vec<(&mut u32, u64)> = entries.into_iter().collect();
    let highest = entries.iter().map(|(rank, _)| **rank).max().unwrap_or(0);

    let mut unranked: Vec<(&mut u32, u64)> =
        entries.into_iter().filter(|(rank, _)| **rank == 0).collect();
    unranked.sort_by(|a, b| b.1.cmp(&a.1));
    for (position, (rank, _)) in unranked.into_iter().enumerate() {
        let offset = u32::try_from(position + 1).unwrap_or(u32::MAX);
        *rank = highest.saturating_add(offset);
    }
}

#[derive(Debug, Clone, Default)]
struct PeriodDraft {
    calls: Option<u64>,
    sales: Option<u64>,
    talk_time_hours: Option<f64>,
}

impl PeriodDraft {
    fn from_raw(record: RawRecord<'_>) -> Self {
        Self {
            calls: record.opt_count(CALLS),
            sales: record.opt_count(SALES),
            talk_time_hours: record.opt_hours(TALK),
        }
    }

    fn measured(self) -> PeriodFigures {
        PeriodFigures {
            calls: self.calls.unwrap_or(0),
            sales: self.sales.unwrap_or(0),
            talk_time_hours: self.talk_time_hours.unwrap_or(0.0),
            source: FigureSource::Measured,
        }
    }
}

/// Agent record with every field optional, so two partial records can be
/// combined before defaults are applied.
#[derive(Debug, Clone, Default)]
struct AgentDraft {
    vicidial_id: Option<u64>,
    agent_name: Option<String>,
    email: Option<String>,
    campaign: Option<String>,
    total_calls: Option<u64>,
    total_sales: Option<u64>,
    callbacks: Option<u64>,
    no_answer: Option<u64>,
    not_interested: Option<u64>,
    talk_time_hours: Option<f64>,
    wait_time_hours: Option<f64>,
    paid_time_hours: Option<f64>,
    hourly_rate: Option<f64>,
    estimated_earnings: Option<f64>,
    rank: Option<u32>,
    today: Option<PeriodDraft>,
    week: Option<PeriodDraft>,
    month: Option<PeriodDraft>,
}

impl AgentDraft {
    fn from_raw(record: RawRecord<'_>) -> Self {
        Self {
            vicidial_id: record.opt_id(ID),
            agent_name: record.opt_text(NAME),
            email: record.opt_text(EMAIL),
            campaign: record.opt_text(CAMPAIGN),
            total_calls: record.opt_count(CALLS),
            total_sales: record.opt_count(SALES),
            callbacks: record.opt_count(CALLBACKS),
            no_answer: record.opt_count(NO_ANSWER),
            not_interested: record.opt_count(NOT_INTERESTED),
            talk_time_hours: record.opt_hours(TALK),
            wait_time_hours: record.opt_hours(WAIT),
            paid_time_hours: record.opt_hours(PAID),
            hourly_rate: record.opt_hours(RATE),
            estimated_earnings: record.opt_amount(EARNINGS),
            rank: record
                .opt_id(RANK)
                .map(|r| u32::try_from(r).unwrap_or(u32::MAX)),
            today: record.object(&["today", "aujourdhui"]).map(PeriodDraft::from_raw),
            week: record.object(&["week", "semaine"]).map(PeriodDraft::from_raw),
            month: record.object(&["month", "mois"]).map(PeriodDraft::from_raw),
        }
    }

    fn same_agent(&self, other: &AgentDraft) -> bool {
        if let (Some(a), Some(b)) = (self.vicidial_id, other.vicidial_id) {
            return a == b;
        }
        match (&self.agent_name, &other.agent_name) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Fill every field this draft lacks from `other`.
    fn fill_from(&mut self, other: AgentDraft) {
        fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
            if slot.is_none() {
                *slot = value;
            }
        }

        fill(&mut self.vicidial_id, other.vicidial_id);
        fill(&mut self.agent_name, other.agent_name);
        fill(&mut self.email, other.email);
        fill(&mut self.campaign, other.campaign);
        fill(&mut self.total_calls, other.total_calls);
        fill(&mut self.total_sales, other.total_sales);
        fill(&mut self.callbacks, other.callbacks);
        fill(&mut self.no_answer, other.no_answer);
        fill(&mut self.not_interested, other.not_interested);
        fill(&mut self.talk_time_hours, other.talk_time_hours);
        fill(&mut self.wait_time_hours, other.wait_time_hours);
        fill(&mut self.paid_time_hours, other.paid_time_hours);
        fill(&mut self.hourly_rate, other.hourly_rate);
        fill(&mut self.estimated_earnings, other.estimated_earnings);
        fill(&mut self.rank, other.rank);
        fill(&mut self.today, other.today);
        fill(&mut self.week, other.week);
        fill(&mut self.month, other.month);
    }

    fn finish(self) -> AgentStat {
        let total_calls = self.total_calls.unwrap_or(0);
        let total_sales = self.total_sales.unwrap_or(0);
        let talk_time_hours = self.talk_time_hours.unwrap_or(0.0);

        let today = match self.today {
            Some(day) => day.measured(),
            None => PeriodFigures {
                calls: total_calls,
                sales: total_sales,
                talk_time_hours,
                source: FigureSource::Measured,
            },
        };
        let week = match self.week {
            Some(week) => week.measured(),
            None => PeriodFigures::estimated_from(&today, WEEK_ESTIMATE_MULTIPLIER),
        };
        let month = match self.month {
            Some(month) => month.measured(),
            None => PeriodFigures::estimated_from(&today, MONTH_ESTIMATE_MULTIPLIER),
        };

        AgentStat {
            vicidial_id: self.vicidial_id,
            agent_name: self.agent_name.unwrap_or_default(),
            email: self.email,
            campaign: self.campaign.unwrap_or_default(),
            total_calls,
            total_sales,
            callbacks: self.callbacks.unwrap_or(0),
            no_answer: self.no_answer.unwrap_or(0),
            not_interested: self.not_interested.unwrap_or(0),
            talk_time_hours,
            wait_time_hours: self.wait_time_hours.unwrap_or(0.0),
            paid_time_hours: self.paid_time_hours.unwrap_or(0.0),
            hourly_rate: self.hourly_rate.unwrap_or(0.0),
            estimated_earnings: self.estimated_earnings.unwrap_or(0.0),
            rank: self.rank.unwrap_or(0),
            periods: PeriodBreakdown { today, week, month },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn duplicate_agent_keeps_personal_fields() {
        let my_stats = json!([{"vicidialId": 7, "agentName": "A", "totalCalls": 10}]);
        let top5 = json!([{"vicidialId": 7, "agentName": "A", "totalCalls": 99}]);

        let view = reconcile_agent_view(&my_stats, &top5, Role::Agent, "A");
        assert_eq!(view.agents.len(), 1);
        assert_eq!(view.agents[0].total_calls, 10);
        assert_eq!(view.my_agent.as_ref().map(|a| a.total_calls), Some(10));
    }

    #[test]
    fn secondary_source_fills_missing_fields() {
        let my_stats = json!({"vicidial_id": 3, "agent_name": "B", "total_calls": 4});
        let top5 = json!([{"vicidialId": 3, "agentName": "B", "totalSales": 2, "rank": 1}]);

        let view = reconcile_agent_view(&my_stats, &top5, Role::Agent, "B");
        let b = &view.agents[0];
        assert_eq!(b.total_calls, 4);
        assert_eq!(b.total_sales, 2);
        assert_eq!(b.rank, 1);
    }

    #[test]
    fn falls_back_to_name_when_one_side_has_no_id() {
        let my_stats = json!({"agentName": "C", "totalCalls": 1});
        let top5 = json!([{"vicidialId": 11, "agentName": "C", "totalCalls": 50}]);

        let view = reconcile_agent_view(&my_stats, &top5, Role::Agent, "C");
        assert_eq!(view.agents.len(), 1);
        assert_eq!(view.agents[0].total_calls, 1);
        assert_eq!(view.agents[0].vicidial_id, Some(11));
    }

    #[test]
    fn different_ids_never_merge_even_with_same_name() {
        let my_stats = json!({"vicidialId": 1, "agentName": "Same"});
        let top5 = json!({"vicidialId": 2, "agentName": "Same"});

        let view = reconcile_agent_view(&my_stats, &top5, Role::Agent, "");
        assert_eq!(view.agents.len(), 2);
    }

    #[test]
    fn top5_only_entries_follow_in_original_order() {
        let my_stats = json!({"vicidialId": 1, "agentName": "Me"});
        let top5 = json!([
            {"vicidialId": 9, "agentName": "Z"},
            {"vicidialId": 1, "agentName": "Me"},
            {"vicidialId": 4, "agentName": "Y"},
        ]);

        let view = reconcile_agent_view(&my_stats, &top5, Role::Agent, "Me");
        let names: Vec<&str> = view.agents.iter().map(|a| a.agent_name.as_str()).collect();
        assert_eq!(names, vec!["Me", "Z", "Y"]);
    }

    #[test]
    fn absent_inputs_yield_empty_view() {
        let view = reconcile_agent_view(&Value::Null, &Value::Null, Role::Agent, "x");
        assert!(view.agents.is_empty());
        assert!(view.my_agent.is_none());
    }

    #[test]
    fn my_agent_matches_email_case_sensitively() {
        let my_stats = json!({"agentName": "Hassan", "email": "hassan@corp.test"});

        let found = reconcile_agent_view(&my_stats, &Value::Null, Role::Agent, "hassan@corp.test");
        assert!(found.my_agent.is_some());

        let missed = reconcile_agent_view(&my_stats, &Value::Null, Role::Agent, "HASSAN@corp.test");
        assert!(missed.my_agent.is_none());
    }

    #[test]
    fn missing_week_and_month_are_labeled_estimates() {
        let my_stats = json!({"agentName": "D", "totalCalls": 3, "totalSales": 1, "talkTimeHours": 0.5});
        let view = reconcile_agent_view(&my_stats, &Value::Null, Role::Agent, "D");
        let periods = &view.agents[0].periods;

        assert_eq!(periods.today.calls, 3);
        assert!(!periods.today.is_estimate());
        assert_eq!(periods.week.calls, 15);
        assert_eq!(periods.week.source, FigureSource::Estimated { multiplier: 5 });
        assert_eq!(periods.month.sales, 20);
        assert_eq!(periods.month.talk_time_hours, 10.0);
    }

    #[test]
    fn backend_period_data_wins_over_estimate() {
        let my_stats = json!({
            "agentName": "E",
            "totalCalls": 3,
            "week": {"totalCalls": 12, "totalSales": 2},
        });
        let view = reconcile_agent_view(&my_stats, &Value::Null, Role::Agent, "E");
        let periods = &view.agents[0].periods;

        assert_eq!(periods.week.calls, 12);
        assert_eq!(periods.week.source, FigureSource::Measured);
        assert!(periods.month.is_estimate());
    }

    #[test]
    fn missing_rank_is_derived_from_bookings() {
        let top5 = json!([
            {"agentName": "low", "totalSales": 1},
            {"agentName": "high", "totalSales": 9},
            {"agentName": "tie", "totalSales": 1},
        ]);
        let view = reconcile_agent_view(&Value::Null, &top5, Role::Nova, "");
        let ranks: Vec<u32> = view.agents.iter().map(|a| a.rank).collect();
        assert_eq!(ranks, vec![2, 1, 3]);
    }

    #[test]
    fn unranked_agents_follow_backend_ranks() {
        let my_stats = json!({"agentName": "me", "totalSales": 50});
        let top5 = json!([
            {"agentName": "first", "totalSales": 10, "rank": 1},
            {"agentName": "second", "totalSales": 8, "rank": 2},
            {"agentName": "quiet", "totalSales": 0},
        ]);
        let view = reconcile_agent_view(&my_stats, &top5, Role::Agent, "me");
        let ranks: Vec<(&str, u32)> = view
            .agents
            .iter()
            .map(|a| (a.agent_name.as_str(), a.rank))
            .collect();
        assert_eq!(
            ranks,
            vec![("me", 3), ("first", 1), ("second", 2), ("quiet", 4)]
        );
    }

    #[test]
    fn backend_rank_is_not_rederived() {
        let top5 = json!([
            {"agentName": "a", "totalSales": 1, "rank": 1},
            {"agentName": "b", "totalSales": 9, "rank": 2},
        ]);
        let view = reconcile_agent_view(&Value::Null, &top5, Role::Nova, "");
        assert_eq!(view.agents[0].rank, 1);
        assert_eq!(view.agents[1].rank, 2);
    }

    #[test]
    fn negative_hours_clamp_and_minutes_truncate() {
        let my_stats = json!({"agentName": "F", "talkTimeHours": 1.999, "waitTimeHours": -2});
        let view = reconcile_agent_view(&my_stats, &Value::Null, Role::Agent, "F");
        let f = &view.agents[0];
        assert_eq!(f.wait_time_hours, 0.0);
        assert_eq!(f.talk_minutes(), 119);
        assert_eq!(f.wait_minutes(), 0);
    }

    fn agent_json() -> impl Strategy<Value = Value> {
        (1u64..6, 0u64..100, 0u64..20).prop_map(|(id, calls, sales)| {
            json!({
                "vicidialId": id,
                "agentName": format!("agent-{id}"),
                "totalCalls": calls,
                "totalSales": sales,
            })
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: every identity key appears exactly once, and keys
        /// present in `my_stats` carry `my_stats` values.
        #[test]
        fn merged_keys_are_unique_and_personal_values_win(
            mine in prop::collection::vec(agent_json(), 0..5),
            top in prop::collection::vec(agent_json(), 0..5),
        ) {
            let view = reconcile_agent_view(&Value::Array(mine.clone()), &Value::Array(top), Role::Agent, "");

            let mut keys: Vec<AgentKey> = view.agents.iter().map(AgentStat::key).collect();
            let total = keys.len();
            keys.sort_by_key(|k| k.to_string());
            keys.dedup();
            prop_assert_eq!(keys.len(), total);

            for m in &mine {
                let id = m["vicidialId"].as_u64().unwrap();
                let first = mine.iter().find(|x| x["vicidialId"].as_u64() == Some(id)).unwrap();
                let merged = view.agents.iter().find(|a| a.vicidial_id == Some(id)).unwrap();
                prop_assert_eq!(merged.total_calls, first["totalCalls"].as_u64().unwrap());
            }
        }

        #[test]
        fn reconciliation_is_idempotent(
            mine in prop::collection::vec(agent_json(), 0..5),
            top in prop::collection::vec(agent_json(), 0..5),
        ) {
            let mine = Value::Array(mine);
            let top = Value::Array(top);
            let first = reconcile_agent_view(&mine, &top, Role::Team, "agent-1");
            let second = reconcile_agent_view(&mine, &top, Role::Team, "agent-1");
            prop_assert_eq!(first, second);
        }
    }
}
