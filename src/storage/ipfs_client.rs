// src/storage/ipfs_client.rs
//! IPFS storage client for DID documents.
//!
//! Publishes documents to an IPFS node through its HTTP API. All stored data is
//! public and permanent; the node's CID is returned as the document address.

use crate::models::did::DIDDocument;
use crate::storage::document_store::{DocumentStore, StorageError};
use crate::utils::serialization::to_canonical_json;
use async_trait::async_trait;
use ipfs_api_backend_hyper::{IpfsApi, IpfsClient, TryFromUri};
use log::debug;
use std::io::Cursor;
use std::sync::Arc;
use tokio::task;

/// Default local node API endpoint.
pub const DEFAULT_IPFS_API_URL: &str = "http://localhost:5001";

/// Thread-safe IPFS client wrapper.
#[derive(Clone)]
pub struct IpfsStorage {
    /// Shared IPFS client instance (thread-safe via Arc)
    client: Arc<IpfsClient>,
}

impl IpfsStorage {
    /// Creates a client for the node API at `api_url`.
    ///
    /// No connection is made here; an unreachable node surfaces as
    /// `StorageError::Unavailable` on the first publish.
    pub fn new(api_url: &str) -> Result<Self, StorageError> {
        let client = IpfsClient::from_str(api_url)
            .map_err(|e| StorageError::Unavailable(format!("invalid IPFS API URL {}: {}", api_url, e)))?;
        Ok(IpfsStorage {
            client: Arc::new(client),
        })
    }

    /// Stores raw bytes and returns the CID.
    ///
    /// The hyper backend's futures are not `Send`, so the upload runs on a
    /// dedicated current-thread runtime inside a blocking task.
    pub async fn store_data(&self, data: Vec<u8>) -> Result<String, StorageError> {
        let client = self.client.clone();

        task::spawn_blocking(move || -> Result<String, StorageError> {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| StorageError::Unavailable(e.to_string()))?;
            rt.block_on(async {
                let res = client
                    .add(Cursor::new(data))
                    .await
                    .map_err(|e| StorageError::Unavailable(e.to_string()))?;
                Ok(res.hash)
            })
        })
        .await
        .map_err(|join_err| StorageError::Unavailable(join_err.to_string()))?
    }
}

#[async_trait]
impl DocumentStore for IpfsStorage {
    async fn publish(&self, document: &DIDDocument, label: &str) -> Result<String, StorageError> {
        let bytes = to_canonical_json(document)?;
        let cid = self.store_data(bytes).await?;
        debug!("published {} to IPFS as {}", label, cid);
        Ok(cid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_malformed_api_url() {
        assert!(IpfsStorage::new(DEFAULT_IPFS_API_URL).is_ok());
        assert!(matches!(
            IpfsStorage::new("not a url"),
            Err(StorageError::Unavailable(_))
        ));
    }
}
