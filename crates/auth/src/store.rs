//! Durable key/value surface holding the session.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::identity::SessionIdentity;

pub const TOKEN_KEY: &str = "callboard.token";
pub const ROLE_KEY: &str = "callboard.role";
pub const USERNAME_KEY: &str = "callboard.username";
pub const STACK_KEY: &str = "callboard.impersonation_stack";

/// Every key the session owns; cleared together.
pub const SESSION_KEYS: [&str; 4] = [TOKEN_KEY, ROLE_KEY, USERNAME_KEY, STACK_KEY];

/// One mutation in an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreWrite {
    Set(String, String),
    Remove(String),
}

impl StoreWrite {
    pub fn set(key: &str, value: impl Into<String>) -> Self {
        Self::Set(key.to_string(), value.into())
    }

    pub fn remove(key: &str) -> Self {
        Self::Remove(key.to_string())
    }
}

/// Writes that make `identity` the persisted current identity.
pub(crate) fn identity_writes(identity: &SessionIdentity) -> Vec<StoreWrite> {
    vec![
        StoreWrite::set(TOKEN_KEY, identity.token.as_str()),
        StoreWrite::set(ROLE_KEY, identity.role.as_str()),
        StoreWrite::set(USERNAME_KEY, identity.username.as_str()),
    ]
}

/// Writes that erase the whole session.
pub(crate) fn clear_writes() -> Vec<StoreWrite> {
    SESSION_KEYS.iter().map(|k| StoreWrite::remove(k)).collect()
}

/// Persistence surface for the session.
///
/// `apply` must be atomic: either every write in the batch lands or none
/// does.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn apply(&self, writes: Vec<StoreWrite>) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> SessionStore for Arc<S>
where
    S: SessionStore + ?Sized,
{
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key).await
    }

    async fn apply(&self, writes: Vec<StoreWrite>) -> Result<(), StoreError> {
        (**self).apply(writes).await
    }
}

/// In-memory store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    inner: RwLock<HashMap<String, String>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with raw entries (e.g. to simulate corruption).
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            inner: RwLock::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Synchronous read, for assertions.
    pub fn peek(&self, key: &str) -> Option<String> {
        self.inner.read().ok()?.get(key).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().map(|m| m.is_empty()).unwrap_or(true)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let map = self
            .inner
            .read()
            .map_err(|_| StoreError::Backend("session store lock poisoned".into()))?;
        Ok(map.get(key).cloned())
    }

    async fn apply(&self, writes: Vec<StoreWrite>) -> Result<(), StoreError> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| StoreError::Backend("session store lock poisoned".into()))?;
        for write in writes {
            match write {
                StoreWrite::Set(key, value) => {
                    map.insert(key, value);
                }
                StoreWrite::Remove(key) => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }
}
