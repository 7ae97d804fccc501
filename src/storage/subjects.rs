// src/storage/subjects.rs
//! Directory of the subjects that may hold a DID.

use crate::models::subject::Subject;
use crate::storage::local_index::IndexError;
use async_trait::async_trait;

/// Lookup of the entities that may hold a DID.
#[async_trait]
pub trait SubjectDirectory: Send + Sync {
    async fn find_subject(&self, subject_id: &str) -> Result<Option<Subject>, IndexError>;

    /// Enrols a subject, or refreshes its display name if it exists.
    async fn upsert_subject(&self, subject: &Subject) -> Result<(), IndexError>;
}
