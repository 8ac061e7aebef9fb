//! Database context: owns the pool and hands out repositories.

use std::path::Path;

use diesel_async::SimpleAsyncConnection;
use tracing::info;

use super::experiment::ExperimentRepository;
use super::pool::{DbPool, DieselError};
use super::protocol::ProtocolRepository;
use super::util::redact_url_password;
use crate::with_conn;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS protocol_documents (
    document_id TEXT PRIMARY KEY,
    document_name TEXT NOT NULL,
    description TEXT,
    object_url TEXT NOT NULL,
    mime_type TEXT,
    ingestion_status TEXT NOT NULL DEFAULT 'pending',
    ingested_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS protocols (
    protocol_id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES protocol_documents(document_id) ON DELETE CASCADE,
    protocol_name TEXT NOT NULL,
    description TEXT,
    created_by_user_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS protocol_steps (
    protocol_step_id TEXT PRIMARY KEY,
    protocol_id TEXT NOT NULL REFERENCES protocols(protocol_id) ON DELETE CASCADE,
    step_number INTEGER NOT NULL,
    step_name TEXT NOT NULL,
    instruction TEXT NOT NULL,
    expected_duration_minutes INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS experiments (
    experiment_id TEXT PRIMARY KEY,
    protocol_id TEXT NOT NULL REFERENCES protocols(protocol_id) ON DELETE CASCADE,
    user_id TEXT,
    start_time TEXT,
    end_time TEXT,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS experiment_steps (
    experiment_step_id TEXT PRIMARY KEY,
    experiment_id TEXT NOT NULL REFERENCES experiments(experiment_id) ON DELETE CASCADE,
    protocol_step_id TEXT NOT NULL REFERENCES protocol_steps(protocol_step_id) ON DELETE CASCADE,
    actual_start_time TEXT,
    actual_end_time TEXT,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS experiment_conversations (
    message_id TEXT PRIMARY KEY,
    experiment_id TEXT NOT NULL REFERENCES experiments(experiment_id) ON DELETE CASCADE,
    experiment_step_id TEXT REFERENCES experiment_steps(experiment_step_id) ON DELETE SET NULL,
    sender_role TEXT NOT NULL,
    message_type TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_protocols_document ON protocols(document_id);
CREATE INDEX IF NOT EXISTS idx_protocol_steps_protocol ON protocol_steps(protocol_id, step_number);
CREATE INDEX IF NOT EXISTS idx_experiments_protocol ON experiments(protocol_id, created_at);
CREATE INDEX IF NOT EXISTS idx_experiments_user ON experiments(user_id, created_at);
CREATE INDEX IF NOT EXISTS idx_experiment_steps_experiment ON experiment_steps(experiment_id, created_at);
CREATE INDEX IF NOT EXISTS idx_conversations_experiment ON experiment_conversations(experiment_id, created_at);
"#;

/// Owns the connection pool and provides repository access.
///
/// Build one per process and clone it into whatever needs database access;
/// clones share the underlying pool.
///
/// # Example
/// ```ignore
/// let ctx = DbContext::from_url("copilot.db")?;
/// ctx.init_schema().await?;
/// let protocols = ctx.protocols().list_protocols().await?;
/// ```
#[derive(Clone)]
pub struct DbContext {
    pool: DbPool,
}

impl DbContext {
    /// Supports SQLite paths (optionally `sqlite:`-prefixed) and `postgres://` URLs.
    pub fn from_url(database_url: &str) -> Result<Self, DieselError> {
        info!(
            "Opening database {}",
            redact_url_password(database_url)
        );
        Ok(Self {
            pool: DbPool::from_url(database_url)?,
        })
    }

    pub fn from_sqlite_path(path: &Path) -> Self {
        Self {
            pool: DbPool::sqlite_from_path(path),
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn protocols(&self) -> ProtocolRepository {
        ProtocolRepository::new(self.pool.clone())
    }

    pub fn experiments(&self) -> ExperimentRepository {
        ExperimentRepository::new(self.pool.clone())
    }

    /// Create all tables and indexes if they don't exist.
    pub async fn init_schema(&self) -> Result<(), DieselError> {
        with_conn!(self.pool, conn => {
            conn.batch_execute(SCHEMA_SQL).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_init_schema_is_idempotent() {
        let dir = tempdir().unwrap();
        let ctx = DbContext::from_sqlite_path(&dir.path().join("test.db"));

        ctx.init_schema().await.unwrap();
        ctx.init_schema().await.unwrap();

        assert!(ctx.protocols().list_protocols().await.unwrap().is_empty());
        assert!(ctx.experiments().list_experiments().await.unwrap().is_empty());
    }
}
