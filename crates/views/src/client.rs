//! Client (lead/customer) records and role-scoped filtering.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;

use callboard_core::{ClientId, Role};

use crate::raw::{self, RawRecord};

const ID: &[&str] = &["id", "client_id", "clientId"];
const FULL_NAME: &[&str] = &["nom_complet", "nomComplet", "full_name", "fullName"];
const PHONE: &[&str] = &["telephone", "phone", "tel"];
const EMAIL: &[&str] = &["email"];
const ADDRESS: &[&str] = &["adresse", "address"];
const STATUS: &[&str] = &["statut_service", "statutService", "status"];
const SERVICE_TYPE: &[&str] = &["type_service", "typeService", "service_type", "serviceType"];
const VISIT_AT: &[&str] = &["date_visite", "dateVisite", "visit_at", "visitAt"];
const CREATED_AT: &[&str] = &["date_creation", "dateCreation", "created_at", "createdAt"];
const NOTES: &[&str] = &["notes", "commentaire"];
const RECORDING: &[&str] = &["enregistrement_url", "enregistrementUrl", "recording_url", "recordingUrl"];
const AGENT: &[&str] = &["agent"];
const AGENT_USERNAME: &[&str] = &["agent_username", "agentUsername"];
const AGENT_TEAM: &[&str] = &["agent_campagne", "agentCampagne", "agent_team", "agentTeam"];
const NESTED_USERNAME: &[&str] = &["username", "agent_name", "agentName"];
const NESTED_TEAM: &[&str] = &["campagne", "campaign", "team_name", "teamName"];

/// Booking status of a client record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClientStatus {
    #[default]
    Pending,
    Confirmed,
    Cancelled,
    Rescheduled,
    NoShow,
    /// Any status this client does not know; kept verbatim.
    Other(String),
}

impl ClientStatus {
    /// Lenient parse of a backend status value.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let key = trimmed.to_lowercase().replace([' ', '-'], "_");
        match key.as_str() {
            "" | "en_attente" | "pending" => ClientStatus::Pending,
            "confirme" | "confirmé" | "confirmed" => ClientStatus::Confirmed,
            "annule" | "annulé" | "cancelled" | "canceled" => ClientStatus::Cancelled,
            "reporte" | "reporté" | "rescheduled" => ClientStatus::Rescheduled,
            "absent" | "no_show" => ClientStatus::NoShow,
            _ => ClientStatus::Other(trimmed.to_string()),
        }
    }

    /// Backend spelling.
    pub fn as_str(&self) -> &str {
        match self {
            ClientStatus::Pending => "en_attente",
            ClientStatus::Confirmed => "confirme",
            ClientStatus::Cancelled => "annule",
            ClientStatus::Rescheduled => "reporte",
            ClientStatus::NoShow => "absent",
            ClientStatus::Other(raw) => raw.as_str(),
        }
    }
}

impl core::fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ClientStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// The agent who owns a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AgentRef {
    pub username: String,
    /// Team/campaign label.
    pub team: String,
}

/// A lead/customer record, normalized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientRecord {
    pub id: ClientId,
    pub full_name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub status: ClientStatus,
    pub service_type: String,
    pub visit_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub notes: String,
    pub recording_url: Option<String>,
    pub agent: AgentRef,
}

impl ClientRecord {
    fn from_raw(record: RawRecord<'_>) -> Option<Self> {
        let id = ClientId::new(record.opt_id(ID)?);
        let nested = record.object(AGENT);

        let username = record
            .opt_text(AGENT_USERNAME)
            .or_else(|| nested.and_then(|a| a.opt_text(NESTED_USERNAME)))
            .or_else(|| record.opt_text(AGENT))
            .unwrap_or_default();
        let team = record
            .opt_text(AGENT_TEAM)
            .or_else(|| nested.and_then(|a| a.opt_text(NESTED_TEAM)))
            .unwrap_or_default();

        Some(Self {
            id,
            full_name: record.text(FULL_NAME),
            phone: record.text(PHONE),
            email: record.text(EMAIL),
            address: record.text(ADDRESS),
            status: record
                .opt_text(STATUS)
                .map(|s| ClientStatus::parse(&s))
                .unwrap_or_default(),
            service_type: record.text(SERVICE_TYPE),
            visit_at: record.opt_text(VISIT_AT).and_then(|s| parse_timestamp(&s)),
            created_at: record.opt_text(CREATED_AT).and_then(|s| parse_timestamp(&s)),
            notes: record.text(NOTES),
            recording_url: record.opt_text(RECORDING),
            agent: AgentRef { username, team },
        })
    }
}

/// Normalize a clients payload. Records without a usable id are dropped.
pub fn reconcile_clients(clients: &Value) -> Vec<ClientRecord> {
    raw::records_in(clients, &["clients", "data"])
        .into_iter()
        .filter_map(ClientRecord::from_raw)
        .collect()
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`, or a bare date.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Records visible to the acting role, in input order.
///
/// - AGENT: records owned by `current_username`
/// - TEAM: records whose owning agent belongs to `current_team_name`
/// - NOVA: everything
pub fn filter_clients_by_role(
    clients: &[ClientRecord],
    role: Role,
    current_username: &str,
    current_team_name: &str,
) -> Vec<ClientRecord> {
    clients
        .iter()
        .filter(|c| match role {
            Role::Agent => c.agent.username == current_username,
            Role::Team => c.agent.team == current_team_name,
            Role::Nova => true,
        })
        .cloned()
        .collect()
}

/// Count of records per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClientStatusSummary {
    pub total: usize,
    pub pending: usize,
    pub confirmed: usize,
    pub cancelled: usize,
    pub rescheduled: usize,
    pub no_show: usize,
    pub other: BTreeMap<String, usize>,
}

impl ClientStatusSummary {
    pub fn from_records(clients: &[ClientRecord]) -> Self {
        let mut summary = Self::default();
        for client in clients {
            summary.total += 1;
            match &client.status {
                ClientStatus::Pending => summary.pending += 1,
                ClientStatus::Confirmed => summary.confirmed += 1,
                ClientStatus::Cancelled => summary.cancelled += 1,
                ClientStatus::Rescheduled => summary.rescheduled += 1,
                ClientStatus::NoShow => summary.no_show += 1,
                ClientStatus::Other(raw) => *summary.other.entry(raw.clone()).or_insert(0) += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use proptest::prelude::*;
    use serde_json::json;

    fn sample() -> Vec<ClientRecord> {
        reconcile_clients(&json!([
            {"id": 1, "nom_complet": "Client One", "agent_username": "a1", "agent_campagne": "T1"},
            {"id": 2, "nomComplet": "Client Two", "agentUsername": "a2", "agentCampagne": "T2"},
            {"id": 3, "nom_complet": "Client Three", "agent": {"username": "a3", "campagne": "T1"}},
            {"id": 4, "nom_complet": "Client Four", "agent_username": "a1", "agent_campagne": "T1"},
        ]))
    }

    #[test]
    fn snake_case_wins_over_camel_case() {
        let clients = reconcile_clients(&json!([{
            "id": 9,
            "nom_complet": "Snake",
            "nomComplet": "Camel",
            "statutService": "confirme",
        }]));
        assert_eq!(clients[0].full_name, "Snake");
        assert_eq!(clients[0].status, ClientStatus::Confirmed);
    }

    #[test]
    fn records_without_id_are_dropped() {
        let clients = reconcile_clients(&json!([{"nom_complet": "ghost"}, {"id": "5"}]));
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].id, ClientId::new(5));
        assert_eq!(clients[0].status, ClientStatus::Pending);
    }

    #[test]
    fn agent_filter_keeps_own_records() {
        let visible = filter_clients_by_role(&sample(), Role::Agent, "a1", "T1");
        let ids: Vec<u64> = visible.iter().map(|c| c.id.get()).collect();
        assert_eq!(ids, vec![1, 4]);
    }

    #[test]
    fn team_filter_keeps_teammates_records() {
        let visible = filter_clients_by_role(&sample(), Role::Team, "a1", "T1");
        let ids: Vec<u64> = visible.iter().map(|c| c.id.get()).collect();
        assert_eq!(ids, vec![1, 3, 4]);
    }

    #[test]
    fn nova_sees_everything_unchanged() {
        let all = sample();
        assert_eq!(filter_clients_by_role(&all, Role::Nova, "", ""), all);
    }

    #[test]
    fn statuses_parse_leniently() {
        assert_eq!(ClientStatus::parse("Annulé"), ClientStatus::Cancelled);
        assert_eq!(ClientStatus::parse("en attente"), ClientStatus::Pending);
        assert_eq!(ClientStatus::parse("reporte"), ClientStatus::Rescheduled);
        assert_eq!(
            ClientStatus::parse("Rappel"),
            ClientStatus::Other("Rappel".to_string())
        );
        assert_eq!(ClientStatus::Confirmed.to_string(), "confirme");
    }

    #[test]
    fn timestamps_accept_backend_formats() {
        let a = parse_timestamp("2024-03-05T10:30:00Z").unwrap();
        assert_eq!((a.day(), a.hour()), (5, 10));
        let b = parse_timestamp("2024-03-05 10:30:00").unwrap();
        assert_eq!(a, b);
        let c = parse_timestamp("2024-03-05").unwrap();
        assert_eq!(c.hour(), 0);
        assert!(parse_timestamp("05/03/2024").is_none());
    }

    #[test]
    fn summary_counts_each_status() {
        let clients = reconcile_clients(&json!([
            {"id": 1, "statut_service": "confirme"},
            {"id": 2, "statut_service": "confirme"},
            {"id": 3, "statut_service": "annule"},
            {"id": 4},
            {"id": 5, "statut_service": "rappel"},
        ]));
        let summary = ClientStatusSummary::from_records(&clients);
        assert_eq!(summary.total, 5);
        assert_eq!(summary.confirmed, 2);
        assert_eq!(summary.cancelled, 1);
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.other.get("rappel"), Some(&1));
    }

    fn owned_client() -> impl Strategy<Value = Value> {
        (1u64..1000, 0usize..3, 0usize..2).prop_map(|(id, agent, team)| {
            json!({
                "id": id,
                "agent_username": format!("a{agent}"),
                "agent_campagne": format!("T{team}"),
            })
        })
    }

    proptest! {
        /// Property: filtering never mutates its input and yields an
        /// order-preserving subsequence.
        #[test]
        fn filter_is_an_ordered_subsequence(
            raw in prop::collection::vec(owned_client(), 0..20),
            role_index in 0usize..3,
        ) {
            let role = [Role::Agent, Role::Team, Role::Nova][role_index];
            let clients = reconcile_clients(&Value::Array(raw));
            let before = clients.clone();

            let visible = filter_clients_by_role(&clients, role, "a1", "T1");
            prop_assert_eq!(&clients, &before);

            let mut cursor = clients.iter();
            for record in &visible {
                prop_assert!(cursor.any(|c| c == record));
            }
        }
    }
}
