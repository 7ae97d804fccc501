// src/blockchain/ledger.rs
//! The authoritative ledger as seen by the lifecycle coordinator.
//!
//! The ledger is the source of truth for which subjects hold an active DID.
//! Everything local (index records, audit entries) is a projection of it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by a ledger backend.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// RPC endpoint unreachable or returned a transport error
    #[error("ledger transport error: {0}")]
    Transport(String),

    /// Call could not be encoded against the contract ABI
    #[error("contract call encoding failed: {0}")]
    Encoding(String),

    /// Node rejected the transaction before it was mined
    #[error("transaction rejected: {0}")]
    Rejected(String),

    /// Transaction was mined but reverted
    #[error("transaction {0} reverted")]
    Reverted(String),

    /// Transaction disappeared from the mempool
    #[error("transaction dropped before confirmation")]
    Dropped,

    #[error("invalid address {0}")]
    InvalidAddress(String),
}

/// Confirmation of a mined ledger write.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub tx_hash: String,
    pub block_number: Option<u64>,
}

/// What the ledger currently records for a subject.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OnChainDIDView {
    pub did: String,
    pub revoked: bool,
    /// Only present for ledgers that anchor the document address
    #[serde(rename = "documentCID")]
    pub document_cid: Option<String>,
}

/// On-chain identity registry operations.
///
/// Implementations perform exactly one network round trip per call and never
/// retry internally. `is_on_chain_issuer` is a live query and must not be
/// memoized.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn is_on_chain_issuer(&self, address: &str) -> Result<bool, LedgerError>;

    async fn register_on_chain(&self, subject_id: &str, did: &str) -> Result<TxReceipt, LedgerError>;

    async fn revoke_on_chain(&self, subject_id: &str) -> Result<TxReceipt, LedgerError>;

    /// `Ok(None)` when the subject has never been registered.
    async fn get_on_chain_did(&self, subject_id: &str) -> Result<Option<OnChainDIDView>, LedgerError>;
}
