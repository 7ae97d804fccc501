// src/storage/pinata_client.rs
//! Pinata pinning service backend.
//!
//! Uploads documents with `pinJSONToIPFS`, naming each pin with the document
//! label so pins can be found in the Pinata dashboard.

use crate::models::did::DIDDocument;
use crate::storage::document_store::{DocumentStore, StorageError};
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PINATA_API_URL: &str = "https://api.pinata.cloud";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PinJsonRequest<'a> {
    pinata_content: &'a DIDDocument,
    pinata_metadata: PinMetadata<'a>,
    pinata_options: PinOptions,
}

#[derive(Serialize)]
struct PinMetadata<'a> {
    name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PinOptions {
    cid_version: u8,
}

#[derive(Deserialize)]
struct PinJsonResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

/// Pinata client authenticated with a JWT.
#[derive(Clone)]
pub struct PinataStorage {
    http: reqwest::Client,
    api_url: String,
    jwt: String,
}

impl PinataStorage {
    pub fn new(api_url: &str, jwt: &str) -> Self {
        PinataStorage {
            http: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            jwt: jwt.to_string(),
        }
    }

    fn pin_json_url(&self) -> String {
        format!("{}/pinning/pinJSONToIPFS", self.api_url)
    }
}

#[async_trait]
impl DocumentStore for PinataStorage {
    async fn publish(&self, document: &DIDDocument, label: &str) -> Result<String, StorageError> {
        let body = PinJsonRequest {
            pinata_content: document,
            pinata_metadata: PinMetadata { name: label },
            pinata_options: PinOptions { cid_version: 1 },
        };

        let response = self
            .http
            .post(self.pin_json_url())
            .bearer_auth(&self.jwt)
            .json(&body)
            .send()
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let pinned: PinJsonResponse = response
            .json()
            .await
            .map_err(|e| StorageError::Unavailable(format!("malformed pin response: {}", e)))?;

        debug!("pinned {} on Pinata as {}", label, pinned.ipfs_hash);
        Ok(pinned.ipfs_hash)
    }
}
