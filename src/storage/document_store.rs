// src/storage/document_store.rs
//! Content-addressed document publishing.

use crate::models::did::DIDDocument;
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised while publishing a document.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("document serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage node or pinning service could not be reached
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    /// Backend answered but refused the upload
    #[error("storage backend rejected upload ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Publishes immutable JSON documents and returns their content address.
///
/// Publishing identical bytes twice yields the same CID, so a publish whose
/// result was lost can be repeated without creating a second document.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn publish(&self, document: &DIDDocument, label: &str) -> Result<String, StorageError>;
}
