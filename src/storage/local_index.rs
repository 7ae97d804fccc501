// src/storage/local_index.rs
//! Local index mapping each subject to its current DID record.
//!
//! The index is a projection of the ledger. It answers lookups quickly but the
//! ledger wins whenever the two disagree.

use crate::models::did::DIDRecord;
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by local persistence (index, subjects, audit table).
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A record already exists for the subject
    #[error("subject {0} already has an index record")]
    Conflict(String),
}

/// Durable subject → DID record store.
#[async_trait]
pub trait LocalIndex: Send + Sync {
    async fn find(&self, subject_id: &str) -> Result<Option<DIDRecord>, IndexError>;

    /// Inserts `record`; fails with [`IndexError::Conflict`] when the subject
    /// already has one, so two writers can never both succeed.
    async fn create(&self, record: DIDRecord) -> Result<DIDRecord, IndexError>;

    /// Removes the record with id `record_id`. Deleting a missing record is
    /// not an error.
    async fn delete(&self, record_id: &str) -> Result<(), IndexError>;
}
