//! reqwest-backed implementation of every backend seam.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};
use tracing::{debug, warn};
use uuid::Uuid;

use callboard_auth::{AuthClient, AuthError, ImpersonationGrant, LoginGrant};
use callboard_core::{Action, AgentKey, ClientId, PermissionError, Role};
use callboard_views::{ClientStatus, Period};

use crate::backend::{ClientPayload, ClientsApi, StatsApi};
use crate::config::{ApiConfig, ConfigError};
use crate::error::FetchError;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Why a call did not produce a JSON body.
#[derive(Debug)]
enum Failure {
    Transport(String),
    Status { status: StatusCode, message: String },
    Decode(String),
}

impl Failure {
    fn into_fetch(self, action: Action) -> FetchError {
        match self {
            Failure::Transport(msg) => FetchError::Network(msg),
            Failure::Decode(msg) => FetchError::Parse(msg),
            Failure::Status { status, .. } if status == StatusCode::UNAUTHORIZED => {
                FetchError::Unauthorized
            }
            Failure::Status { status, message } if status == StatusCode::FORBIDDEN => {
                FetchError::Permission(PermissionError::new(None, action).with_message(message))
            }
            Failure::Status { status, message } => FetchError::Api {
                status: status.as_u16(),
                message,
            },
        }
    }

    fn into_auth(self, on_unauthorized: AuthError) -> AuthError {
        match self {
            Failure::Transport(msg) => AuthError::Transport(msg),
            Failure::Decode(msg) => AuthError::Rejected(format!("unreadable response: {msg}")),
            Failure::Status { status, .. } if status == StatusCode::UNAUTHORIZED => on_unauthorized,
            Failure::Status { status, message } if status == StatusCode::FORBIDDEN => {
                AuthError::Forbidden(Some(message).filter(|m| !m.trim().is_empty()))
            }
            Failure::Status { status, message } if message.is_empty() => {
                AuthError::Rejected(format!("status {}", status.as_u16()))
            }
            Failure::Status { message, .. } => AuthError::Rejected(message),
        }
    }
}

/// HTTP client for the call-center backend.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: &ApiConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<Value, Failure> {
        let url = format!("{}{}", self.base_url, path);
        let request_id = Uuid::now_v7();
        debug!(%method, %url, %request_id, "backend request");

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(REQUEST_ID_HEADER, request_id.to_string());
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Failure::Transport(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Failure::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = error_message(&text);
            warn!(%method, %url, %request_id, status = status.as_u16(), %message, "backend refused request");
            return Err(Failure::Status { status, message });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| Failure::Decode(e.to_string()))
    }

    async fn fetch(&self, path: &str, token: &str, action: Action) -> Result<Value, FetchError> {
        self.call(Method::GET, path, Some(token), &[], None)
            .await
            .map_err(|f| f.into_fetch(action))
    }

    async fn impersonation(
        &self,
        path: &str,
        token: &str,
        target: &str,
    ) -> Result<ImpersonationGrant, AuthError> {
        let body = self
            .call(
                Method::POST,
                path,
                Some(token),
                &[],
                Some(json!({ "username": target })),
            )
            .await
            .map_err(|f| f.into_auth(AuthError::InvalidToken))?;
        Ok(parse_impersonation(&body))
    }
}

/// Pull a human message out of an error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["message", "error", "detail"] {
            if let Some(msg) = value.get(key).and_then(Value::as_str) {
                return msg.trim().to_string();
            }
        }
    }
    body.trim().chars().take(200).collect()
}

fn text_field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| value.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn role_field(value: &Value) -> Option<Role> {
    let raw = text_field(value, &["role"])
        .or_else(|| value.get("user").and_then(|u| text_field(u, &["role"])))?;
    match raw.parse::<Role>() {
        Ok(role) => Some(role),
        Err(err) => {
            warn!(error = %err, "ignoring unknown role in auth response");
            None
        }
    }
}

fn token_field(value: &Value) -> Option<String> {
    text_field(value, &["token", "access_token", "accessToken"]).map(str::to_string)
}

fn parse_impersonation(body: &Value) -> ImpersonationGrant {
    let token = token_field(body);
    ImpersonationGrant {
        success: body
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(token.is_some()),
        token,
        role: role_field(body),
        message: text_field(body, &["message", "error"]).map(str::to_string),
    }
}

#[async_trait]
impl AuthClient for HttpBackend {
    async fn login(&self, username: &str, password: &str) -> Result<LoginGrant, AuthError> {
        let body = self
            .call(
                Method::POST,
                "/auth/login",
                None,
                &[],
                Some(json!({ "username": username, "password": password })),
            )
            .await
            .map_err(|f| f.into_auth(AuthError::InvalidCredentials))?;

        let token = token_field(&body).ok_or(AuthError::InvalidToken)?;
        let role = role_field(&body)
            .ok_or_else(|| AuthError::Rejected("login response carries no valid role".into()))?;
        Ok(LoginGrant { token, role })
    }

    async fn logout(&self, token: &str) -> Result<(), AuthError> {
        self.call(Method::POST, "/auth/logout", Some(token), &[], None)
            .await
            .map(|_| ())
            .map_err(|f| f.into_auth(AuthError::InvalidToken))
    }

    async fn impersonate_team(
        &self,
        token: &str,
        team_username: &str,
    ) -> Result<ImpersonationGrant, AuthError> {
        self.impersonation("/auth/impersonate/team", token, team_username)
            .await
    }

    async fn impersonate_agent(
        &self,
        token: &str,
        agent_username: &str,
    ) -> Result<ImpersonationGrant, AuthError> {
        self.impersonation("/auth/impersonate/agent", token, agent_username)
            .await
    }
}

#[async_trait]
impl StatsApi for HttpBackend {
    async fn my_stats(&self, token: &str) -> Result<Value, FetchError> {
        self.fetch("/stats/agent/me", token, Action::ViewAgentStats)
            .await
    }

    async fn top5_agents(&self, token: &str) -> Result<Value, FetchError> {
        self.fetch("/stats/agent/top5", token, Action::ViewAgentStats)
            .await
    }

    async fn history(&self, token: &str, period: Period) -> Result<Value, FetchError> {
        self.call(
            Method::GET,
            "/stats/agent/history",
            Some(token),
            &[("period", period.as_str())],
            None,
        )
        .await
        .map_err(|f| f.into_fetch(Action::ViewAgentStats))
    }

    async fn my_team_stats(&self, token: &str) -> Result<Value, FetchError> {
        self.fetch("/stats/team/me", token, Action::ViewTeamStats)
            .await
    }

    async fn all_teams(&self, token: &str) -> Result<Value, FetchError> {
        self.fetch("/stats/team/all", token, Action::ViewTeamStats)
            .await
    }

    async fn top5_teams(&self, token: &str) -> Result<Value, FetchError> {
        self.fetch("/stats/team/top5", token, Action::ViewTeamStats)
            .await
    }

    async fn org_stats(&self, token: &str) -> Result<Value, FetchError> {
        self.fetch("/stats/org", token, Action::ViewOrgStats).await
    }

    async fn update_hourly_rate(
        &self,
        token: &str,
        agent: &AgentKey,
        rate: f64,
    ) -> Result<(), FetchError> {
        let body = match agent {
            AgentKey::Id(id) => json!({ "vicidial_id": id, "hourly_rate": rate }),
            AgentKey::Name(name) => json!({ "agent_name": name, "hourly_rate": rate }),
        };
        self.call(
            Method::PUT,
            "/stats/agent/hourly-rate",
            Some(token),
            &[],
            Some(body),
        )
        .await
        .map(|_| ())
        .map_err(|f| f.into_fetch(Action::UpdateHourlyRate))
    }
}

#[async_trait]
impl ClientsApi for HttpBackend {
    async fn all_clients(&self, token: &str) -> Result<Value, FetchError> {
        self.fetch("/clients", token, Action::ViewClients).await
    }

    async fn create_client(&self, token: &str, client: &ClientPayload) -> Result<Value, FetchError> {
        let body = serde_json::to_value(client).map_err(|e| FetchError::Parse(e.to_string()))?;
        self.call(Method::POST, "/clients", Some(token), &[], Some(body))
            .await
            .map_err(|f| f.into_fetch(Action::EditClient))
    }

    async fn update_client(
        &self,
        token: &str,
        id: ClientId,
        client: &ClientPayload,
    ) -> Result<Value, FetchError> {
        let body = serde_json::to_value(client).map_err(|e| FetchError::Parse(e.to_string()))?;
        self.call(
            Method::PUT,
            &format!("/clients/{id}"),
            Some(token),
            &[],
            Some(body),
        )
        .await
        .map_err(|f| f.into_fetch(Action::EditClient))
    }

    async fn update_client_status(
        &self,
        token: &str,
        id: ClientId,
        status: &ClientStatus,
    ) -> Result<(), FetchError> {
        self.call(
            Method::PATCH,
            &format!("/clients/{id}/status"),
            Some(token),
            &[],
            Some(json!({ "statut_service": status })),
        )
        .await
        .map(|_| ())
        .map_err(|f| f.into_fetch(Action::EditClient))
    }

    async fn delete_client(&self, token: &str, id: ClientId) -> Result<(), FetchError> {
        self.call(
            Method::DELETE,
            &format!("/clients/{id}"),
            Some(token),
            &[],
            None,
        )
        .await
        .map(|_| ())
        .map_err(|f| f.into_fetch(Action::DeleteClient))
    }
}
