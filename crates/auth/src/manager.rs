//! Session / impersonation state machine.
//!
//! ```text
//! Unauthenticated --login/restore--> Authenticated(identity, 0)
//! Authenticated(i, d) --impersonate(t)--> Authenticated(t, d + 1)
//! Authenticated(t, d) --return_to_previous--> Authenticated(top, d - 1)   (d > 0)
//! any --logout--> Unauthenticated
//! ```
//!
//! Every identity change is persisted before it is published, so anything
//! triggered by the new snapshot already runs under the new credentials.

use tokio::sync::watch;
use tracing::{debug, info, warn};

use callboard_core::{Action, PermissionError, Role};

use crate::client::{AuthClient, ImpersonationGrant};
use crate::error::{AuthError, MalformedState, SessionError, StoreError};
use crate::identity::{ImpersonationStack, SessionIdentity};
use crate::store::{
    self, ROLE_KEY, STACK_KEY, SessionStore, StoreWrite, TOKEN_KEY, USERNAME_KEY,
};

/// Who is acting now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated {
        identity: SessionIdentity,
        /// Number of identities waiting on the impersonation stack.
        depth: usize,
    },
}

impl SessionState {
    pub fn identity(&self) -> Option<&SessionIdentity> {
        match self {
            SessionState::Unauthenticated => None,
            SessionState::Authenticated { identity, .. } => Some(identity),
        }
    }

    pub fn role(&self) -> Option<Role> {
        self.identity().map(|i| i.role)
    }

    pub fn depth(&self) -> usize {
        match self {
            SessionState::Unauthenticated => 0,
            SessionState::Authenticated { depth, .. } => *depth,
        }
    }

    pub fn is_impersonating(&self) -> bool {
        self.depth() > 0
    }
}

/// Published session state.
///
/// `epoch` increases on every identity change; a fetch tagged with an older
/// epoch belongs to a previous identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub epoch: u64,
    pub state: SessionState,
}

/// Owns the persisted identity and the impersonation stack.
pub struct SessionManager<A, S> {
    auth: A,
    store: S,
    state: watch::Sender<SessionSnapshot>,
}

impl<A, S> SessionManager<A, S>
where
    A: AuthClient,
    S: SessionStore,
{
    /// Start unauthenticated; call [`Self::restore`] to load persisted state.
    pub fn new(auth: A, store: S) -> Self {
        let (state, _) = watch::channel(SessionSnapshot {
            epoch: 0,
            state: SessionState::Unauthenticated,
        });
        Self { auth, store, state }
    }

    pub fn auth(&self) -> &A {
        &self.auth
    }

    /// Observe identity changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn current(&self) -> Option<SessionIdentity> {
        self.state.borrow().state.identity().cloned()
    }

    pub fn depth(&self) -> usize {
        self.state.borrow().state.depth()
    }

    /// Whether `epoch` still names the active identity.
    pub fn is_current(&self, epoch: u64) -> bool {
        self.state.borrow().epoch == epoch
    }

    // ─────────────────────────────────────────────────────────────────────
    // Transitions
    // ─────────────────────────────────────────────────────────────────────

    /// Load the persisted session. Never fails: corrupt state is cleared.
    pub async fn restore(&self) -> SessionState {
        let state = match self.load_identity().await {
            Ok(None) => SessionState::Unauthenticated,
            Ok(Some(identity)) => {
                let depth = self.load_stack().await.depth();
                SessionState::Authenticated { identity, depth }
            }
            Err(cause) => {
                warn!(%cause, "discarding corrupt persisted session");
                if let Err(err) = self.store.apply(store::clear_writes()).await {
                    warn!(error = %err, "failed to clear corrupt session");
                }
                SessionState::Unauthenticated
            }
        };

        if let Some(identity) = state.identity() {
            info!(username = %identity.username, role = %identity.role, depth = state.depth(), "session restored");
        }
        self.publish(state.clone());
        state
    }

    /// Authenticate and start a fresh session at depth 0.
    ///
    /// On failure nothing is persisted and the state is unchanged.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<SessionIdentity, SessionError> {
        let grant = self.auth.login(username, password).await?;
        if grant.token.trim().is_empty() {
            return Err(AuthError::InvalidToken.into());
        }

        let identity = SessionIdentity::new(grant.token, grant.role, username);
        if !identity.is_complete() {
            return Err(AuthError::IncompleteIdentity.into());
        }
        let mut writes = store::identity_writes(&identity);
        writes.push(StoreWrite::remove(STACK_KEY));
        self.store.apply(writes).await?;

        info!(username = %identity.username, role = %identity.role, "logged in");
        self.publish(SessionState::Authenticated {
            identity: identity.clone(),
            depth: 0,
        });
        Ok(identity)
    }

    /// End the session. The backend call is best-effort; local state is
    /// always cleared.
    pub async fn logout(&self) {
        if let Some(identity) = self.current() {
            if let Err(err) = self.auth.logout(&identity.token).await {
                warn!(error = %err, "backend logout failed; clearing local session anyway");
            }
            info!(username = %identity.username, "logged out");
        }

        if let Err(err) = self.store.apply(store::clear_writes()).await {
            warn!(error = %err, "failed to clear persisted session");
        }
        self.publish(SessionState::Unauthenticated);
    }

    /// Act as `target`, remembering the current identity for the way back.
    ///
    /// Authorization must already have been granted by the backend.
    /// Returns the new depth.
    pub async fn impersonate(&self, target: SessionIdentity) -> Result<usize, SessionError> {
        let current = self.current().ok_or(SessionError::NotAuthenticated)?;
        if !target.is_complete() {
            return Err(AuthError::IncompleteIdentity.into());
        }

        let mut stack = self.load_stack().await;
        stack.push(current.clone());
        let encoded = stack
            .encode()
            .map_err(|e| StoreError::Backend(format!("failed to encode impersonation stack: {e}")))?;

        let mut writes = store::identity_writes(&target);
        writes.push(StoreWrite::set(STACK_KEY, encoded));
        self.store.apply(writes).await?;

        let depth = stack.depth();
        info!(from = %current.username, to = %target.username, role = %target.role, depth, "impersonating");
        self.publish(SessionState::Authenticated {
            identity: target,
            depth,
        });
        Ok(depth)
    }

    /// Ask the backend for a team lead's credentials, then impersonate.
    pub async fn impersonate_team(
        &self,
        team_username: &str,
    ) -> Result<SessionIdentity, SessionError> {
        let current = self.current().ok_or(SessionError::NotAuthenticated)?;
        if team_username.trim().is_empty() {
            return Err(AuthError::IncompleteIdentity.into());
        }
        let grant = self
            .auth
            .impersonate_team(&current.token, team_username)
            .await;
        let target = grant_to_identity(grant, &current, Role::Team, team_username)?;
        self.impersonate(target.clone()).await?;
        Ok(target)
    }

    /// Ask the backend for an agent's credentials, then impersonate.
    pub async fn impersonate_agent(
        &self,
        agent_username: &str,
    ) -> Result<SessionIdentity, SessionError> {
        let current = self.current().ok_or(SessionError::NotAuthenticated)?;
        if agent_username.trim().is_empty() {
            return Err(AuthError::IncompleteIdentity.into());
        }
        let grant = self
            .auth
            .impersonate_agent(&current.token, agent_username)
            .await;
        let target = grant_to_identity(grant, &current, Role::Agent, agent_username)?;
        self.impersonate(target.clone()).await?;
        Ok(target)
    }

    /// Pop one impersonation level and restore that identity exactly.
    ///
    /// The stack is re-read from the store rather than trusted from memory,
    /// and the shorter stack is written in the same batch as the restored
    /// identity. Returns `None` (no-op) when there is nothing to return to.
    pub async fn return_to_previous(&self) -> Result<Option<SessionIdentity>, SessionError> {
        let mut stack = self.load_stack().await;
        let Some(previous) = stack.pop() else {
            debug!("return_to_previous with empty stack; nothing to do");
            self.correct_depth(0);
            return Ok(None);
        };

        let mut writes = store::identity_writes(&previous);
        if stack.is_empty() {
            writes.push(StoreWrite::remove(STACK_KEY));
        } else {
            let encoded = stack.encode().map_err(|e| {
                StoreError::Backend(format!("failed to encode impersonation stack: {e}"))
            })?;
            writes.push(StoreWrite::set(STACK_KEY, encoded));
        }
        self.store.apply(writes).await?;

        let depth = stack.depth();
        info!(username = %previous.username, role = %previous.role, depth, "returned to previous identity");
        self.publish(SessionState::Authenticated {
            identity: previous.clone(),
            depth,
        });
        Ok(Some(previous))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Persistence helpers
    // ─────────────────────────────────────────────────────────────────────

    async fn load_identity(&self) -> Result<Option<SessionIdentity>, MalformedState> {
        let read = |r: Result<Option<String>, StoreError>| {
            r.map_err(|e| MalformedState::Unreadable(e.to_string()))
        };
        let token = read(self.store.get(TOKEN_KEY).await)?;
        let role = read(self.store.get(ROLE_KEY).await)?;
        let username = read(self.store.get(USERNAME_KEY).await)?;

        match (token, role, username) {
            (None, None, None) => {
                // A stack without an identity is meaningless.
                if read(self.store.get(STACK_KEY).await)?.is_some() {
                    return Err(MalformedState::PartialIdentity);
                }
                Ok(None)
            }
            (Some(token), Some(role), Some(username)) => {
                let role = role
                    .parse::<Role>()
                    .map_err(|_| MalformedState::UnknownRole(role.clone()))?;
                let identity = SessionIdentity::new(token, role, username);
                if !identity.is_complete() {
                    return Err(MalformedState::PartialIdentity);
                }
                Ok(Some(identity))
            }
            _ => Err(MalformedState::PartialIdentity),
        }
    }

    /// Freshest persisted stack. Unreadable or empty stacks are removed and
    /// read as empty.
    async fn load_stack(&self) -> ImpersonationStack {
        let raw = match self.store.get(STACK_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return ImpersonationStack::new(),
            Err(err) => {
                warn!(error = %err, "impersonation stack unreadable; treating as empty");
                return ImpersonationStack::new();
            }
        };

        match ImpersonationStack::decode(&raw) {
            Ok(stack) if !stack.is_empty() => stack,
            Ok(_) => {
                self.drop_stack_key().await;
                ImpersonationStack::new()
            }
            Err(err) => {
                let cause = MalformedState::Stack(err.to_string());
                warn!(%cause, "discarding corrupt impersonation stack");
                self.drop_stack_key().await;
                ImpersonationStack::new()
            }
        }
    }

    async fn drop_stack_key(&self) {
        if let Err(err) = self.store.apply(vec![StoreWrite::remove(STACK_KEY)]).await {
            warn!(error = %err, "failed to remove impersonation stack");
        }
    }

    fn publish(&self, state: SessionState) {
        self.state.send_modify(|snapshot| {
            snapshot.epoch += 1;
            snapshot.state = state;
        });
    }

    /// Align the in-memory depth with the store without changing identity.
    fn correct_depth(&self, depth: usize) {
        self.state.send_if_modified(|snapshot| match &mut snapshot.state {
            SessionState::Authenticated { depth: d, .. } if *d != depth => {
                *d = depth;
                true
            }
            _ => false,
        });
    }
}

fn grant_to_identity(
    grant: Result<ImpersonationGrant, AuthError>,
    current: &SessionIdentity,
    default_role: Role,
    username: &str,
) -> Result<SessionIdentity, SessionError> {
    let denied = |message: Option<String>| {
        let err = PermissionError::new(Some(current.role), Action::Impersonate);
        SessionError::Permission(match message {
            Some(msg) => err.with_message(msg),
            None => err,
        })
    };

    let grant = match grant {
        Ok(grant) => grant,
        Err(AuthError::Forbidden(message)) => return Err(denied(message)),
        Err(err) => return Err(err.into()),
    };
    if !grant.success {
        return Err(denied(grant.message));
    }

    let token = grant
        .token
        .filter(|t| !t.trim().is_empty())
        .ok_or(AuthError::InvalidToken)?;
    Ok(SessionIdentity::new(
        token,
        grant.role.unwrap_or(default_role),
        username,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use crate::client::LoginGrant;
    use crate::store::InMemorySessionStore;

    #[derive(Default)]
    struct FakeAuth {
        logouts: Mutex<Vec<String>>,
        fail_logout: bool,
        refuse_impersonation: bool,
    }

    #[async_trait]
    impl AuthClient for FakeAuth {
        async fn login(&self, username: &str, password: &str) -> Result<LoginGrant, AuthError> {
            match (username, password) {
                ("nova", "pw") => Ok(LoginGrant { token: "tok-nova".into(), role: Role::Nova }),
                ("lead", "pw") => Ok(LoginGrant { token: "tok-lead".into(), role: Role::Team }),
                _ => Err(AuthError::InvalidCredentials),
            }
        }

        async fn logout(&self, token: &str) -> Result<(), AuthError> {
            self.logouts.lock().unwrap().push(token.to_string());
            if self.fail_logout {
                Err(AuthError::Transport("offline".into()))
            } else {
                Ok(())
            }
        }

        async fn impersonate_team(
            &self,
            _token: &str,
            team_username: &str,
        ) -> Result<ImpersonationGrant, AuthError> {
            Ok(ImpersonationGrant {
                success: !self.refuse_impersonation,
                token: Some(format!("tok-{team_username}")),
                role: Some(Role::Team),
                message: self.refuse_impersonation.then(|| "not your team".to_string()),
            })
        }

        async fn impersonate_agent(
            &self,
            _token: &str,
            agent_username: &str,
        ) -> Result<ImpersonationGrant, AuthError> {
            if self.refuse_impersonation {
                return Err(AuthError::Forbidden(None));
            }
            Ok(ImpersonationGrant {
                success: true,
                token: Some(format!("tok-{agent_username}")),
                role: None,
                message: None,
            })
        }
    }

    fn identity(name: &str, role: Role) -> SessionIdentity {
        SessionIdentity::new(format!("tok-{name}"), role, name)
    }

    fn manager() -> (
        SessionManager<FakeAuth, Arc<InMemorySessionStore>>,
        Arc<InMemorySessionStore>,
    ) {
        let store = Arc::new(InMemorySessionStore::new());
        (SessionManager::new(FakeAuth::default(), store.clone()), store)
    }

    #[tokio::test]
    async fn login_persists_identity_and_clears_stale_stack() {
        let store = Arc::new(InMemorySessionStore::with_entries([(STACK_KEY, "garbage")]));
        let manager = SessionManager::new(FakeAuth::default(), store.clone());

        let identity = manager.login("lead", "pw").await.unwrap();
        assert_eq!(identity, identity_for_lead());
        assert_eq!(manager.depth(), 0);
        assert_eq!(store.peek(TOKEN_KEY).as_deref(), Some("tok-lead"));
        assert_eq!(store.peek(ROLE_KEY).as_deref(), Some("TEAM"));
        assert_eq!(store.peek(STACK_KEY), None);
    }

    fn identity_for_lead() -> SessionIdentity {
        SessionIdentity::new("tok-lead", Role::Team, "lead")
    }

    #[tokio::test]
    async fn failed_login_writes_nothing() {
        let (manager, store) = manager();
        let err = manager.login("lead", "wrong").await.unwrap_err();
        assert_eq!(err, SessionError::Auth(AuthError::InvalidCredentials));
        assert!(store.is_empty());
        assert_eq!(manager.snapshot().state, SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn impersonation_unwinds_in_lifo_order() {
        let (manager, store) = manager();
        let i0 = manager.login("nova", "pw").await.unwrap();
        let i1 = identity("lead", Role::Team);
        let i2 = identity("agent", Role::Agent);

        assert_eq!(manager.impersonate(i1.clone()).await.unwrap(), 1);
        assert_eq!(manager.impersonate(i2.clone()).await.unwrap(), 2);
        assert_eq!(manager.current(), Some(i2));

        assert_eq!(manager.return_to_previous().await.unwrap(), Some(i1.clone()));
        assert_eq!(manager.current(), Some(i1));
        assert_eq!(manager.depth(), 1);

        assert_eq!(manager.return_to_previous().await.unwrap(), Some(i0.clone()));
        assert_eq!(manager.current(), Some(i0));
        assert_eq!(manager.depth(), 0);
        assert_eq!(store.peek(STACK_KEY), None);

        let epoch = manager.snapshot().epoch;
        assert_eq!(manager.return_to_previous().await.unwrap(), None);
        assert_eq!(manager.snapshot().epoch, epoch);
    }

    #[tokio::test]
    async fn restore_reads_depth_from_persisted_stack() {
        let (manager, store) = manager();
        manager.login("nova", "pw").await.unwrap();
        manager.impersonate(identity("lead", Role::Team)).await.unwrap();

        let reloaded = SessionManager::new(FakeAuth::default(), store.clone());
        let state = reloaded.restore().await;
        assert_eq!(state.depth(), 1);
        assert_eq!(state.role(), Some(Role::Team));

        let back = reloaded.return_to_previous().await.unwrap().unwrap();
        assert_eq!(back.username, "nova");
    }

    #[tokio::test]
    async fn corrupt_stack_is_cleared_on_restore() {
        let store = Arc::new(InMemorySessionStore::with_entries([
            (TOKEN_KEY, "t"),
            (ROLE_KEY, "AGENT"),
            (USERNAME_KEY, "a1"),
            (STACK_KEY, "[{broken"),
        ]));
        let manager = SessionManager::new(FakeAuth::default(), store.clone());

        let state = manager.restore().await;
        assert_eq!(state.depth(), 0);
        assert_eq!(state.identity().map(|i| i.username.as_str()), Some("a1"));
        assert_eq!(store.peek(STACK_KEY), None);
    }

    #[tokio::test]
    async fn partial_identity_clears_everything() {
        let store = Arc::new(InMemorySessionStore::with_entries([
            (TOKEN_KEY, "t"),
            (STACK_KEY, "[]"),
        ]));
        let manager = SessionManager::new(FakeAuth::default(), store.clone());

        assert_eq!(manager.restore().await, SessionState::Unauthenticated);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn unknown_role_clears_everything() {
        let store = Arc::new(InMemorySessionStore::with_entries([
            (TOKEN_KEY, "t"),
            (ROLE_KEY, "ADMIN"),
            (USERNAME_KEY, "root"),
        ]));
        let manager = SessionManager::new(FakeAuth::default(), store.clone());

        assert_eq!(manager.restore().await, SessionState::Unauthenticated);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn logout_clears_even_when_backend_fails() {
        let store = Arc::new(InMemorySessionStore::new());
        let auth = FakeAuth {
            fail_logout: true,
            ..FakeAuth::default()
        };
        let manager = SessionManager::new(auth, store.clone());
        manager.login("nova", "pw").await.unwrap();
        manager.impersonate(identity("lead", Role::Team)).await.unwrap();

        manager.logout().await;
        assert!(store.is_empty());
        assert_eq!(manager.current(), None);
        assert_eq!(manager.auth().logouts.lock().unwrap().as_slice(), ["tok-lead"]);
    }

    #[tokio::test]
    async fn refused_impersonation_is_a_role_aware_permission_error() {
        let store = Arc::new(InMemorySessionStore::new());
        let auth = FakeAuth {
            refuse_impersonation: true,
            ..FakeAuth::default()
        };
        let manager = SessionManager::new(auth, store.clone());
        manager.login("lead", "pw").await.unwrap();

        let err = manager.impersonate_agent("stranger").await.unwrap_err();
        match err {
            SessionError::Permission(p) => {
                assert_eq!(p.role, Some(Role::Team));
                assert_eq!(p.action, Action::Impersonate);
            }
            other => panic!("expected permission error, got {other:?}"),
        }

        let err = manager.impersonate_team("other-team").await.unwrap_err();
        assert!(err.to_string().contains("not your team"));
        assert_eq!(manager.depth(), 0);
        assert_eq!(store.peek(STACK_KEY), None);
    }

    #[tokio::test]
    async fn granted_agent_impersonation_defaults_role() {
        let (manager, _store) = manager();
        manager.login("lead", "pw").await.unwrap();
        let target = manager.impersonate_agent("hassan.belkadi").await.unwrap();
        assert_eq!(target.role, Role::Agent);
        assert_eq!(target.token, "tok-hassan.belkadi");
        assert_eq!(manager.depth(), 1);
    }

    #[tokio::test]
    async fn incomplete_target_is_refused_and_session_survives_reload() {
        let (manager, store) = manager();
        manager.login("nova", "pw").await.unwrap();
        manager.impersonate(identity("lead", Role::Team)).await.unwrap();

        for target in [
            SessionIdentity::new("tok-x", Role::Agent, ""),
            SessionIdentity::new("  ", Role::Agent, "x"),
        ] {
            let err = manager.impersonate(target).await.unwrap_err();
            assert_eq!(err, SessionError::Auth(AuthError::IncompleteIdentity));
        }
        let err = manager.impersonate_agent(" ").await.unwrap_err();
        assert_eq!(err, SessionError::Auth(AuthError::IncompleteIdentity));
        assert_eq!(manager.depth(), 1);

        let reloaded = SessionManager::new(FakeAuth::default(), store.clone());
        let state = reloaded.restore().await;
        assert_eq!(state.depth(), 1);
        assert_eq!(state.identity(), Some(&identity("lead", Role::Team)));
        assert_eq!(
            reloaded.return_to_previous().await.unwrap().map(|i| i.username),
            Some("nova".to_string())
        );
    }

    #[tokio::test]
    async fn blank_username_login_writes_nothing() {
        struct BlankNameAuth;

        #[async_trait]
        impl AuthClient for BlankNameAuth {
            async fn login(&self, _u: &str, _p: &str) -> Result<LoginGrant, AuthError> {
                Ok(LoginGrant { token: "tok".into(), role: Role::Agent })
            }
            async fn logout(&self, _token: &str) -> Result<(), AuthError> {
                Ok(())
            }
            async fn impersonate_team(
                &self,
                _token: &str,
                _team: &str,
            ) -> Result<ImpersonationGrant, AuthError> {
                Err(AuthError::Forbidden(None))
            }
            async fn impersonate_agent(
                &self,
                _token: &str,
                _agent: &str,
            ) -> Result<ImpersonationGrant, AuthError> {
                Err(AuthError::Forbidden(None))
            }
        }

        let store = Arc::new(InMemorySessionStore::new());
        let manager = SessionManager::new(BlankNameAuth, store.clone());
        let err = manager.login("   ", "pw").await.unwrap_err();
        assert_eq!(err, SessionError::Auth(AuthError::IncompleteIdentity));
        assert!(store.is_empty());
        assert_eq!(manager.current(), None);
    }

    #[tokio::test]
    async fn impersonation_requires_a_session() {
        let (manager, _store) = manager();
        let err = manager.impersonate(identity("x", Role::Agent)).await.unwrap_err();
        assert_eq!(err, SessionError::NotAuthenticated);
    }

    #[tokio::test]
    async fn subscribers_see_each_identity_change() {
        let (manager, _store) = manager();
        let mut rx = manager.subscribe();

        manager.login("nova", "pw").await.unwrap();
        assert!(rx.has_changed().unwrap());
        let first = rx.borrow_and_update().epoch;

        manager.impersonate(identity("lead", Role::Team)).await.unwrap();
        let second = rx.borrow_and_update().epoch;
        assert!(second > first);
        assert!(!manager.is_current(first));
        assert!(manager.is_current(second));
    }

    /// Store whose writes can be switched off, to simulate a crash between
    /// popping and persisting.
    struct FlakyStore {
        inner: InMemorySessionStore,
        fail_writes: Mutex<bool>,
    }

    #[async_trait]
    impl SessionStore for FlakyStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key).await
        }

        async fn apply(&self, writes: Vec<StoreWrite>) -> Result<(), StoreError> {
            if *self.fail_writes.lock().unwrap() {
                return Err(StoreError::Backend("disk full".into()));
            }
            self.inner.apply(writes).await
        }
    }

    #[tokio::test]
    async fn failed_pop_leaves_persisted_stack_and_identity_untouched() {
        let store = Arc::new(FlakyStore {
            inner: InMemorySessionStore::new(),
            fail_writes: Mutex::new(false),
        });
        let manager = SessionManager::new(FakeAuth::default(), store.clone());
        manager.login("nova", "pw").await.unwrap();
        manager.impersonate(identity("lead", Role::Team)).await.unwrap();
        let stack_before = store.inner.peek(STACK_KEY);

        *store.fail_writes.lock().unwrap() = true;
        let err = manager.return_to_previous().await.unwrap_err();
        assert!(matches!(err, SessionError::Storage(_)));
        assert_eq!(store.inner.peek(STACK_KEY), stack_before);
        assert_eq!(store.inner.peek(USERNAME_KEY).as_deref(), Some("lead"));
        assert_eq!(manager.depth(), 1);

        *store.fail_writes.lock().unwrap() = false;
        let back = manager.return_to_previous().await.unwrap().unwrap();
        assert_eq!(back.username, "nova");
    }
}
