// src/storage/sqlite.rs
//! SQLite persistence for the local index, the subject directory and the
//! audit trail.
//!
//! The audit table is append-only: this module has no statement that updates
//! or deletes an audit row.

use crate::models::audit::AuditEvent;
use crate::models::did::DIDRecord;
use crate::models::subject::Subject;
use crate::services::audit::{AuditError, AuditSink};
use crate::storage::local_index::{IndexError, LocalIndex};
use crate::storage::subjects::SubjectDirectory;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS subjects (
        id TEXT PRIMARY KEY NOT NULL,
        display_name TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS did_records (
        id TEXT PRIMARY KEY NOT NULL,
        subject_id TEXT NOT NULL UNIQUE,
        did TEXT NOT NULL,
        document_cid TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS audit_events (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        action TEXT NOT NULL,
        actor_id TEXT NOT NULL,
        did TEXT NOT NULL,
        metadata TEXT NOT NULL,
        timestamp TEXT NOT NULL
    )",
];

/// SQLite-backed store shared by the index, subject directory and audit sink.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the database at `path` and ensures the
    /// schema exists.
    pub async fn open(path: &Path) -> Result<Self, IndexError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| IndexError::Database(sqlx::Error::Io(e)))?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .busy_timeout(Duration::from_secs(5)),
            )
            .await?;

        Self::with_pool(pool).await
    }

    /// Single-connection in-memory database.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, IndexError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, IndexError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(SqliteStore { pool })
    }

    /// Audit events in append order.
    #[cfg(test)]
    pub async fn audit_events(&self) -> Result<Vec<AuditEvent>, IndexError> {
        use chrono::{DateTime, Utc};
        use sqlx::Row;

        let rows = sqlx::query(
            "SELECT action, actor_id, did, metadata, timestamp FROM audit_events ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<AuditEvent, IndexError> {
                let action: String = row.try_get("action")?;
                let metadata: String = row.try_get("metadata")?;
                let timestamp: DateTime<Utc> = row.try_get("timestamp")?;
                Ok(AuditEvent {
                    action: serde_json::from_value(serde_json::Value::String(action))
                        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
                    actor_id: row.try_get("actor_id")?,
                    did: row.try_get("did")?,
                    metadata: serde_json::from_str(&metadata)
                        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
                    timestamp,
                })
            })
            .collect()
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

#[async_trait]
impl LocalIndex for SqliteStore {
    async fn find(&self, subject_id: &str) -> Result<Option<DIDRecord>, IndexError> {
        let record = sqlx::query_as::<_, DIDRecord>(
            "SELECT id, subject_id, did, document_cid, created_at FROM did_records WHERE subject_id = ?1",
        )
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn create(&self, record: DIDRecord) -> Result<DIDRecord, IndexError> {
        let result = sqlx::query(
            "INSERT INTO did_records (id, subject_id, did, document_cid, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&record.id)
        .bind(&record.subject_id)
        .bind(&record.did)
        .bind(&record.document_cid)
        .bind(record.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(record),
            Err(e) if is_unique_violation(&e) => Err(IndexError::Conflict(record.subject_id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, record_id: &str) -> Result<(), IndexError> {
        sqlx::query("DELETE FROM did_records WHERE id = ?1")
            .bind(record_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SubjectDirectory for SqliteStore {
    async fn find_subject(&self, subject_id: &str) -> Result<Option<Subject>, IndexError> {
        let subject = sqlx::query_as::<_, Subject>(
            "SELECT id, display_name, created_at FROM subjects WHERE id = ?1",
        )
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(subject)
    }

    async fn upsert_subject(&self, subject: &Subject) -> Result<(), IndexError> {
        sqlx::query(
            "INSERT INTO subjects (id, display_name, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name",
        )
        .bind(&subject.id)
        .bind(&subject.display_name)
        .bind(subject.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AuditSink for SqliteStore {
    async fn append(&self, event: &AuditEvent) -> Result<(), AuditError> {
        sqlx::query(
            "INSERT INTO audit_events (action, actor_id, did, metadata, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(event.action.as_str())
        .bind(&event.actor_id)
        .bind(&event.did)
        .bind(event.metadata.to_string())
        .bind(event.timestamp)
        .execute(&self.pool)
        .await
        .map_err(IndexError::from)?;
        Ok(())
    }
}
