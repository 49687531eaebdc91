//! SQLite-backed session store.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::error::StoreError;
use crate::store::{SessionStore, StoreWrite};

/// Session store persisted in a local SQLite file.
///
/// Each [`SessionStore::apply`] batch runs in one transaction.
#[derive(Debug, Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// Open (creating if needed) the store at `path`.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create session directory at {parent:?}"))?;
        }
        let url = format!("sqlite://{}", path.to_string_lossy());
        Self::connect(&url).await
    }

    /// Open the store at the platform default location.
    pub async fn open_default() -> Result<Self, StoreError> {
        let path = default_db_path()?;
        Self::open(&path).await
    }

    /// Private in-memory database (tests).
    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::connect("sqlite::memory:").await
    }

    async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("invalid SQLite url {url}"))?
            .create_if_missing(true);

        // One connection: `sqlite::memory:` databases are per-connection and
        // the session has a single writer anyway.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open session store at {url}"))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS session_state (
                key   TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .context("failed to create session_state table")?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT value FROM session_state WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read session key {key}"))?;

        match row {
            Some(row) => {
                let value: String = row
                    .try_get("value")
                    .context("session_state.value is not text")?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn apply(&self, writes: Vec<StoreWrite>) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin session transaction")?;

        for write in &writes {
            match write {
                StoreWrite::Set(key, value) => {
                    sqlx::query(
                        r#"
                        INSERT INTO session_state (key, value)
                        VALUES (?1, ?2)
                        ON CONFLICT(key) DO UPDATE SET value = excluded.value
                        "#,
                    )
                    .bind(key)
                    .bind(value)
                    .execute(&mut *tx)
                    .await
                    .with_context(|| format!("failed to write session key {key}"))?;
                }
                StoreWrite::Remove(key) => {
                    sqlx::query("DELETE FROM session_state WHERE key = ?1")
                        .bind(key)
                        .execute(&mut *tx)
                        .await
                        .with_context(|| format!("failed to remove session key {key}"))?;
                }
            }
        }

        tx.commit()
            .await
            .context("failed to commit session transaction")?;
        Ok(())
    }
}

/// `{app_data_dir}/callboard/session.db`.
pub fn default_db_path() -> Result<PathBuf, StoreError> {
    let mut dir = dirs::data_dir()
        .or_else(|| {
            dirs::home_dir().map(|mut h| {
                h.push(".local");
                h.push("share");
                h
            })
        })
        .context("failed to resolve OS app data directory")?;
    dir.push("callboard");
    dir.push("session.db");
    Ok(dir)
}
