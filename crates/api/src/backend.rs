//! Backend seams the dashboard fetches through.
//!
//! Payloads come back as raw JSON; `callboard-views` does the normalizing.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use callboard_core::{AgentKey, ClientId};
use callboard_views::{ClientStatus, Period};

use crate::error::FetchError;

/// Statistics endpoints.
#[async_trait]
pub trait StatsApi: Send + Sync {
    async fn my_stats(&self, token: &str) -> Result<Value, FetchError>;
    async fn top5_agents(&self, token: &str) -> Result<Value, FetchError>;
    async fn history(&self, token: &str, period: Period) -> Result<Value, FetchError>;
    async fn my_team_stats(&self, token: &str) -> Result<Value, FetchError>;
    async fn all_teams(&self, token: &str) -> Result<Value, FetchError>;
    async fn top5_teams(&self, token: &str) -> Result<Value, FetchError>;
    async fn org_stats(&self, token: &str) -> Result<Value, FetchError>;
    async fn update_hourly_rate(
        &self,
        token: &str,
        agent: &AgentKey,
        rate: f64,
    ) -> Result<(), FetchError>;
}

/// Client (lead) endpoints.
#[async_trait]
pub trait ClientsApi: Send + Sync {
    async fn all_clients(&self, token: &str) -> Result<Value, FetchError>;
    async fn create_client(&self, token: &str, client: &ClientPayload) -> Result<Value, FetchError>;
    async fn update_client(
        &self,
        token: &str,
        id: ClientId,
        client: &ClientPayload,
    ) -> Result<Value, FetchError>;
    async fn update_client_status(
        &self,
        token: &str,
        id: ClientId,
        status: &ClientStatus,
    ) -> Result<(), FetchError>;
    async fn delete_client(&self, token: &str, id: ClientId) -> Result<(), FetchError>;
}

/// Fields sent when creating or editing a client. Unset fields are omitted
/// so a partial update leaves them untouched server-side.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClientPayload {
    #[serde(rename = "nom_complet", skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(rename = "telephone", skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "adresse", skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(rename = "type_service", skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
    #[serde(rename = "statut_service", skip_serializing_if = "Option::is_none")]
    pub status: Option<ClientStatus>,
    /// `YYYY-MM-DD HH:MM:SS`, as the backend stores it.
    #[serde(rename = "date_visite", skip_serializing_if = "Option::is_none")]
    pub visit_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ClientPayload {
    pub fn named(full_name: impl Into<String>) -> Self {
        Self {
            full_name: Some(full_name.into()),
            ..Self::default()
        }
    }
}

/// Everything the dashboard needs from one backend.
pub trait Backend: StatsApi + ClientsApi {}

impl<T: StatsApi + ClientsApi> Backend for T {}

#[async_trait]
impl<T> StatsApi for std::sync::Arc<T>
where
    T: StatsApi + ?Sized,
{
    async fn my_stats(&self, token: &str) -> Result<Value, FetchError> {
        (**self).my_stats(token).await
    }
    async fn top5_agents(&self, token: &str) -> Result<Value, FetchError> {
        (**self).top5_agents(token).await
    }
    async fn history(&self, token: &str, period: Period) -> Result<Value, FetchError> {
        (**self).history(token, period).await
    }
    async fn my_team_stats(&self, token: &str) -> Result<Value, FetchError> {
        (**self).my_team_stats(token).await
    }
    async fn all_teams(&self, token: &str) -> Result<Value, FetchError> {
        (**self).all_teams(token).await
    }
    async fn top5_teams(&self, token: &str) -> Result<Value, FetchError> {
        (**self).top5_teams(token).await
    }
    async fn org_stats(&self, token: &str) -> Result<Value, FetchError> {
        (**self).org_stats(token).await
    }
    async fn update_hourly_rate(
        &self,
        token: &str,
        agent: &AgentKey,
        rate: f64,
    ) -> Result<(), FetchError> {
        (**self).update_hourly_rate(token, agent, rate).await
    }
}

#[async_trait]
impl<T> ClientsApi for std::sync::Arc<T>
where
    T: ClientsApi + ?Sized,
{
    async fn all_clients(&self, token: &str) -> Result<Value, FetchError> {
        (**self).all_clients(token).await
    }
    async fn create_client(&self, token: &str, client: &ClientPayload) -> Result<Value, FetchError> {
        (**self).create_client(token, client).await
    }
    async fn update_client(
        &self,
        token: &str,
        id: ClientId,
        client: &ClientPayload,
    ) -> Result<Value, FetchError> {
        (**self).update_client(token, id, client).await
    }
    async fn update_client_status(
        &self,
        token: &str,
        id: ClientId,
        status: &ClientStatus,
    ) -> Result<(), FetchError> {
        (**self).update_client_status(token, id, status).await
    }
    async fn delete_client(&self, token: &str, id: ClientId) -> Result<(), FetchError> {
        (**self).delete_client(token, id).await
    }
}
