//! Role-aware dashboard state driven by the session snapshot.
//!
//! A refresh is tagged with the session epoch it started under. If the
//! identity changes while the fetch is in flight, the result is thrown away
//! instead of being shown to the wrong account.

use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use callboard_auth::{SessionIdentity, SessionSnapshot};
use callboard_core::{AgentKey, ClientId, Role};
use callboard_views::{
    AgentStat, AgentView, ClientRecord, ClientStatus, ClientStatusSummary, HistoryPoint,
    OrgOverview, PendingRateEdit, Period, TeamOrgView, TeamStat, apply_hourly_rate,
    filter_clients_by_role,
    reconcile_agent_view, reconcile_clients, reconcile_history, reconcile_org_overview,
    reconcile_team_org_view, reconcile_teams,
};

use crate::backend::{Backend, ClientPayload};
use crate::error::FetchError;

/// What the active role sees.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RoleView {
    Agent(AgentView),
    Team(TeamOrgView),
    Nova {
        view: TeamOrgView,
        overview: OrgOverview,
    },
}

impl RoleView {
    pub fn role(&self) -> Role {
        match self {
            RoleView::Agent(_) => Role::Agent,
            RoleView::Team(_) => Role::Team,
            RoleView::Nova { .. } => Role::Nova,
        }
    }

    /// Team name used to scope TEAM client visibility.
    fn team_name(&self) -> Option<&str> {
        match self {
            RoleView::Team(view) => view.own_team().map(|t| t.team_name.as_str()),
            _ => None,
        }
    }

    fn teams(&self) -> &[TeamStat] {
        match self {
            RoleView::Agent(_) => &[],
            RoleView::Team(view) | RoleView::Nova { view, .. } => &view.teams,
        }
    }

    fn apply_rate(&mut self, key: &AgentKey, rate: f64) -> Option<PendingRateEdit> {
        match self {
            RoleView::Agent(view) => {
                let edit = apply_hourly_rate(&mut view.agents, key, rate)?;
                if let Some(me) = view.my_agent.as_mut().filter(|a| a.has_key(key)) {
                    sync_rate(me, &view.agents, key);
                }
                Some(edit)
            }
            RoleView::Team(view) | RoleView::Nova { view, .. } => view
                .teams
                .iter_mut()
                .find_map(|team| apply_hourly_rate(&mut team.agents, key, rate)),
        }
    }

    fn rollback(&mut self, edit: &PendingRateEdit) -> bool {
        match self {
            RoleView::Agent(view) => {
                let restored = edit.rollback(&mut view.agents);
                if let Some(me) = view.my_agent.as_mut().filter(|a| a.has_key(&edit.key)) {
                    sync_rate(me, &view.agents, &edit.key);
                }
                restored
            }
            RoleView::Team(view) | RoleView::Nova { view, .. } => view
                .teams
                .iter_mut()
                .any(|team| edit.rollback(&mut team.agents)),
        }
    }
}

fn sync_rate(target: &mut AgentStat, agents: &[AgentStat], key: &AgentKey) {
    if let Some(source) = agents.iter().find(|a| a.has_key(key)) {
        target.hourly_rate = source.hourly_rate;
        target.estimated_earnings = source.estimated_earnings;
    }
}

/// The account a view was built for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewOwner {
    pub username: String,
    pub role: Role,
}

impl ViewOwner {
    fn of(identity: &SessionIdentity) -> Self {
        Self {
            username: identity.username.clone(),
            role: identity.role,
        }
    }
}

/// Everything the UI renders.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardState {
    /// Session epoch the state was last committed under.
    pub epoch: u64,
    pub owner: Option<ViewOwner>,
    pub view: Option<RoleView>,
    /// Every reconciled client, before role filtering.
    pub all_clients: Vec<ClientRecord>,
    /// Clients visible to `owner`.
    pub clients: Vec<ClientRecord>,
    /// Set when the last refresh failed and the view (if any) is stale.
    pub degraded: Option<String>,
}

impl DashboardState {
    pub fn client_summary(&self) -> ClientStatusSummary {
        ClientStatusSummary::from_records(&self.clients)
    }

    /// Scope `all_clients` to `identity`. Only narrows what was fetched.
    fn refilter_for(&mut self, identity: Option<&SessionIdentity>) -> usize {
        self.clients = match identity {
            Some(identity) => {
                let team = self.team_name_for(identity).to_string();
                filter_clients_by_role(&self.all_clients, identity.role, &identity.username, &team)
            }
            None => Vec::new(),
        };
        self.clients.len()
    }

    /// The owner's own team when the view is theirs, otherwise a listed team
    /// named after the account, otherwise the account name itself.
    fn team_name_for<'a>(&'a self, identity: &'a SessionIdentity) -> &'a str {
        let view = self.view.as_ref();
        let owned = self.owner.as_ref() == Some(&ViewOwner::of(identity));
        let own_team = view.filter(|_| owned).and_then(RoleView::team_name);
        own_team
            .or_else(|| {
                view.into_iter()
                    .flat_map(RoleView::teams)
                    .find(|t| t.team_name == identity.username)
                    .map(|t| t.team_name.as_str())
            })
            .unwrap_or(&identity.username)
    }
}

/// Result of [`Dashboard::refresh`].
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Applied,
    /// The identity changed mid-fetch; nothing was committed.
    Stale,
    /// The fetch failed; the previous view for the same identity is kept.
    Degraded(FetchError),
    Unauthenticated,
}

struct Fetched {
    view: RoleView,
    clients: Vec<ClientRecord>,
}

pub struct Dashboard<B> {
    backend: B,
    session: watch::Receiver<SessionSnapshot>,
    state: Mutex<DashboardState>,
}

impl<B: Backend> Dashboard<B> {
    pub fn new(backend: B, session: watch::Receiver<SessionSnapshot>) -> Self {
        Self {
            backend,
            session,
            state: Mutex::new(DashboardState::default()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub async fn state(&self) -> DashboardState {
        self.state.lock().await.clone()
    }

    fn snapshot(&self) -> SessionSnapshot {
        self.session.borrow().clone()
    }

    fn current_epoch(&self) -> u64 {
        self.session.borrow().epoch
    }

    /// Fetch and reconcile for the active identity, then commit if that
    /// identity is still active.
    pub async fn refresh(&self) -> RefreshOutcome {
        let snapshot = self.snapshot();
        let Some(identity) = snapshot.state.identity().cloned() else {
            let mut state = self.state.lock().await;
            *state = DashboardState {
                epoch: snapshot.epoch,
                ..DashboardState::default()
            };
            return RefreshOutcome::Unauthenticated;
        };

        let fetched = self.fetch_for(&identity).await;

        let mut state = self.state.lock().await;
        if self.current_epoch() != snapshot.epoch || state.epoch > snapshot.epoch {
            debug!(
                epoch = snapshot.epoch,
                username = %identity.username,
                "discarding fetch for a previous identity"
            );
            return RefreshOutcome::Stale;
        }

        let owner = ViewOwner::of(&identity);
        match fetched {
            Ok(Fetched { view, clients }) => {
                state.epoch = snapshot.epoch;
                state.owner = Some(owner);
                state.view = Some(view);
                state.all_clients = clients;
                state.degraded = None;
                state.refilter_for(Some(&identity));
                info!(
                    username = %identity.username,
                    role = %identity.role,
                    clients = state.clients.len(),
                    "dashboard refreshed"
                );
                RefreshOutcome::Applied
            }
            Err(err) => {
                let err = err.for_role(identity.role);
                warn!(username = %identity.username, error = %err, "dashboard refresh failed");
                if state.owner.as_ref() != Some(&owner) {
                    *state = DashboardState {
                        owner: Some(owner),
                        ..DashboardState::default()
                    };
                }
                state.epoch = snapshot.epoch;
                state.degraded = Some(err.to_string());
                RefreshOutcome::Degraded(err)
            }
        }
    }

    /// Refresh on every identity change until the session source goes away.
    pub async fn follow_session(&self) {
        let mut changes = self.session.clone();
        while changes.changed().await.is_ok() {
            self.refresh().await;
        }
    }

    /// Re-scope the already-fetched clients to the current session identity
    /// without going back to the backend. Returns how many stay visible.
    pub async fn refilter(&self) -> usize {
        let snapshot = self.snapshot();
        self.state.lock().await.refilter_for(snapshot.state.identity())
    }

    async fn fetch_for(&self, identity: &SessionIdentity) -> Result<Fetched, FetchError> {
        let token = identity.token.as_str();
        let username = identity.username.as_str();
        let api = &self.backend;

        let (view, clients) = match identity.role {
            Role::Agent => {
                let (mine, top5, clients) = tokio::try_join!(
                    api.my_stats(token),
                    api.top5_agents(token),
                    api.all_clients(token),
                )?;
                let view = reconcile_agent_view(&mine, &top5, Role::Agent, username);
                (RoleView::Agent(view), reconcile_clients(&clients))
            }
            Role::Team => {
                let (teams, clients) =
                    tokio::try_join!(api.all_teams(token), api.all_clients(token))?;
                let teams = if reconcile_teams(&teams).is_empty() {
                    debug!("team list empty; falling back to own team stats");
                    api.my_team_stats(token).await?
                } else {
                    teams
                };
                let view = reconcile_team_org_view(&teams, &clients, Role::Team, username);
                let clients = view.clients.clone();
                (RoleView::Team(view), clients)
            }
            Role::Nova => {
                let (teams, top5, org, clients) = tokio::try_join!(
                    api.all_teams(token),
                    api.top5_teams(token),
                    api.org_stats(token),
                    api.all_clients(token),
                )?;
                let view = reconcile_team_org_view(&teams, &clients, Role::Nova, username);
                let overview = reconcile_org_overview(&org, &view.teams, &top5);
                let clients = view.clients.clone();
                (RoleView::Nova { view, overview }, clients)
            }
        };

        Ok(Fetched { view, clients })
    }

    fn require_identity(&self) -> Result<SessionIdentity, FetchError> {
        self.session
            .borrow()
            .state
            .identity()
            .cloned()
            .ok_or(FetchError::NotAuthenticated)
    }

    /// Call history for the active identity.
    pub async fn history(&self, period: Period) -> Result<Vec<HistoryPoint>, FetchError> {
        let identity = self.require_identity()?;
        let payload = self
            .backend
            .history(&identity.token, period)
            .await
            .map_err(|e| e.for_role(identity.role))?;
        Ok(reconcile_history(&payload))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────

    pub async fn create_client(&self, client: &ClientPayload) -> Result<RefreshOutcome, FetchError> {
        let identity = self.require_identity()?;
        self.backend
            .create_client(&identity.token, client)
            .await
            .map_err(|e| e.for_role(identity.role))?;
        Ok(self.refresh().await)
    }

    pub async fn update_client(
        &self,
        id: ClientId,
        client: &ClientPayload,
    ) -> Result<RefreshOutcome, FetchError> {
        let identity = self.require_identity()?;
        self.backend
            .update_client(&identity.token, id, client)
            .await
            .map_err(|e| e.for_role(identity.role))?;
        Ok(self.refresh().await)
    }

    pub async fn update_client_status(
        &self,
        id: ClientId,
        status: &ClientStatus,
    ) -> Result<RefreshOutcome, FetchError> {
        let identity = self.require_identity()?;
        self.backend
            .update_client_status(&identity.token, id, status)
            .await
            .map_err(|e| e.for_role(identity.role))?;
        Ok(self.refresh().await)
    }

    pub async fn delete_client(&self, id: ClientId) -> Result<RefreshOutcome, FetchError> {
        let identity = self.require_identity()?;
        self.backend
            .delete_client(&identity.token, id)
            .await
            .map_err(|e| e.for_role(identity.role))?;
        Ok(self.refresh().await)
    }

    /// Change an agent's hourly rate, showing the new figures immediately.
    ///
    /// The local edit is undone if the backend refuses it, unless the
    /// identity changed in the meantime (the view then belongs to someone
    /// else and is left alone).
    pub async fn update_hourly_rate(&self, key: &AgentKey, rate: f64) -> Result<(), FetchError> {
        if !rate.is_finite() || rate < 0.0 {
            return Err(FetchError::InvalidInput(format!(
                "hourly rate must be a non-negative number, got {rate}"
            )));
        }
        let snapshot = self.snapshot();
        let identity = snapshot
            .state
            .identity()
            .cloned()
            .ok_or(FetchError::NotAuthenticated)?;

        let pending = {
            let mut state = self.state.lock().await;
            if state.epoch == snapshot.epoch {
                state.view.as_mut().and_then(|v| v.apply_rate(key, rate))
            } else {
                None
            }
        };

        let result = self
            .backend
            .update_hourly_rate(&identity.token, key, rate)
            .await
            .map_err(|e| e.for_role(identity.role));

        if let (Err(err), Some(edit)) = (&result, pending) {
            let mut state = self.state.lock().await;
            if state.epoch == snapshot.epoch && self.current_epoch() == snapshot.epoch {
                let restored = state.view.as_mut().is_some_and(|v| v.rollback(&edit));
                warn!(agent = %edit.key, error = %err, restored, "hourly rate rejected; rolled back");
            }
        }
        result
    }
}
