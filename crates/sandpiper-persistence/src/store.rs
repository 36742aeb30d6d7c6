//! Store bootstrap: connection pool and schema.

use crate::errors::PersistenceResult;
use crate::responses::CachedResponseStore;
use crate::workflows::WorkflowStore;
use sandpiper_config::StorageConfig;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// SQL schema, executed idempotently at open.
const SCHEMA_SQL: &str = r#"
-- Content-addressed extraction results.
CREATE TABLE IF NOT EXISTS cached_responses (
    fingerprint TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    kind TEXT NOT NULL,
    selector TEXT NOT NULL,
    wait_policy TEXT NOT NULL,
    options_json TEXT NOT NULL,
    data TEXT NOT NULL,
    metadata_json TEXT NOT NULL,
    hit_count INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cached_responses_url ON cached_responses(url);
CREATE INDEX IF NOT EXISTS idx_cached_responses_expires ON cached_responses(expires_at);

-- Persisted action sequences with execution statistics.
CREATE TABLE IF NOT EXISTS workflows (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    url TEXT NOT NULL,
    actions_json TEXT NOT NULL,
    tags_json TEXT NOT NULL DEFAULT '[]',
    created_by TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    total_executions INTEGER NOT NULL DEFAULT 0,
    successful_executions INTEGER NOT NULL DEFAULT 0,
    failed_executions INTEGER NOT NULL DEFAULT 0,
    last_executed_at INTEGER,
    average_duration_ms REAL
);

CREATE INDEX IF NOT EXISTS idx_workflows_name ON workflows(name);
CREATE INDEX IF NOT EXISTS idx_workflows_tags ON workflows(tags_json);

-- Contract tables for the component-hosting collaborators.
CREATE TABLE IF NOT EXISTS cached_components (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    url TEXT NOT NULL,
    selector TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS component_files (
    id TEXT PRIMARY KEY,
    component_id TEXT NOT NULL REFERENCES cached_components(id),
    file_name TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
"#;

/// Shared handle over the SQLite pool. Cloning is cheap; all repositories
/// view the same database.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database named by the configuration
    /// and apply the schema.
    pub async fn open(config: &StorageConfig) -> PersistenceResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        sqlx::query(SCHEMA_SQL).execute(&pool).await?;

        info!(database_url = %config.database_url, "Opened sandpiper store");
        Ok(Self { pool })
    }

    /// In-memory store for tests. A single connection keeps every query on
    /// the same memory database.
    pub async fn open_in_memory() -> PersistenceResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        sqlx::query(SCHEMA_SQL).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub fn responses(&self) -> CachedResponseStore {
        CachedResponseStore::new(self.pool.clone())
    }

    pub fn workflows(&self) -> WorkflowStore {
        WorkflowStore::new(self.pool.clone())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
