// src/models/did.rs
//! Decentralized Identifier (DID) data model implementation.
//!
//! Defines the W3C-shaped DID Document published to content-addressed storage
//! and the local index record that references it by CID.
//! See the [DID Core Specification](https://www.w3.org/TR/did-core/).

use crate::utils::crypto::hash_data;
use chrono::{DateTime, Utc};
use ethers::utils::hex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// JSON-LD context every published document carries.
pub const DID_CONTEXT: &str = "https://www.w3.org/ns/did/v1";

/// DID method used for every identifier this service derives.
pub const DID_METHOD: &str = "ethr";

/// Verification method type bound to the subject key.
pub const VERIFICATION_KEY_TYPE: &str = "EcdsaSecp256k1VerificationKey2019";

/// Derives the DID for a subject registered by `issuer_address`.
///
/// The result is `did:ethr:<lowercased issuer>:<subject id>` and depends on
/// nothing else, so the same issuer/subject pair always yields the same DID.
pub fn derive_did(issuer_address: &str, subject_id: &str) -> String {
    format!(
        "did:{}:{}:{}",
        DID_METHOD,
        issuer_address.trim().to_lowercase(),
        subject_id
    )
}

/// A DID Document representing a decentralized identity.
///
/// The shape is fixed: context, id, controller and exactly one verification
/// method keyed to the subject. Documents are immutable once published; any
/// change means a new document and a new CID.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DIDDocument {
    #[serde(rename = "@context")]
    pub context: String,

    /// The complete DID string identifier
    /// Example: "did:ethr:0xabc:u1"
    pub id: String,

    /// DID that controls this document (self-controlled)
    pub controller: String,

    #[serde(rename = "verificationMethod")]
    pub verification_method: Vec<VerificationMethod>,
}

/// Single key entry of a [`DIDDocument`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VerificationMethod {
    /// Fragment id, always `<did>#keys-1`
    pub id: String,

    #[serde(rename = "type")]
    pub key_type: String,

    pub controller: String,

    /// Account the key is bound to; the subject identifier
    #[serde(rename = "blockchainAccountId")]
    pub blockchain_account_id: String,
}

impl DIDDocument {
    /// Builds the document for `did`, keyed to `subject_id`.
    pub fn for_subject(did: &str, subject_id: &str) -> Self {
        DIDDocument {
            context: DID_CONTEXT.to_string(),
            id: did.to_string(),
            controller: did.to_string(),
            verification_method: vec![VerificationMethod {
                id: format!("{}#keys-1", did),
                key_type: VERIFICATION_KEY_TYPE.to_string(),
                controller: did.to_string(),
                blockchain_account_id: subject_id.to_string(),
            }],
        }
    }

    /// Label the document is published under.
    pub fn publish_label(&self) -> String {
        format!("did-{}", self.id)
    }
}

/// Local index entry associating a subject with its active DID.
///
/// There is no update path: a record is created once by Register (or by a
/// reconciliation backfill) and removed by Revoke.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DIDRecord {
    /// Deterministic record identifier, see [`DIDRecord::new`]
    pub id: String,
    pub subject_id: String,
    pub did: String,
    #[serde(rename = "documentCID")]
    pub document_cid: String,
    pub created_at: DateTime<Utc>,
}

impl DIDRecord {
    /// Creates a record; the id is the keccak-256 digest of did, CID and
    /// creation time.
    pub fn new(subject_id: &str, did: &str, document_cid: &str, created_at: DateTime<Utc>) -> Self {
        let seed = format!("{}|{}|{}", did, document_cid, created_at.to_rfc3339());
        DIDRecord {
            id: hex::encode(hash_data(seed.as_bytes())),
            subject_id: subject_id.to_string(),
            did: did.to_string(),
            document_cid: document_cid.to_string(),
            created_at,
        }
    }
}
