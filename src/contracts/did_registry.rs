// src/contracts/did_registry.rs
//! DID Registry smart contract interface implementation.
//!
//! Binds the [`Ledger`] operations to the DIDRegistry contract: issuer
//! recognition, registration, revocation and lookup of a subject's DID.

use crate::blockchain::evm_client::EvmClient;
use crate::blockchain::ledger::{Ledger, LedgerError, OnChainDIDView, TxReceipt};
use async_trait::async_trait;
use ethers::abi::{parse_abi, Abi};
use ethers::types::Address;
use log::debug;
use std::str::FromStr;

/// Human-readable ABI of the functions this service calls.
pub const DID_REGISTRY_ABI: &[&str] = &[
    "function isIssuer(address account) external view returns (bool)",
    "function registerDID(string userId, string did) external",
    "function revokeDID(string userId) external",
    "function getDID(string userId) external view returns (string did, bool active)",
];

/// DID Registry smart contract interface.
///
/// Every call goes to the chain; nothing is cached, so an issuer whose
/// authority is revoked on chain loses it here on the next request.
pub struct DidRegistry {
    client: EvmClient,
    address: Address,
    abi: Abi,
}

impl DidRegistry {
    /// Creates a new DidRegistry bound to a deployed contract.
    ///
    /// # Errors
    /// Returns `InvalidAddress` if `contract_address` is not a hex address.
    pub fn new(client: EvmClient, contract_address: &str) -> Result<Self, LedgerError> {
        let address = Address::from_str(contract_address)
            .map_err(|_| LedgerError::InvalidAddress(contract_address.to_string()))?;
        let abi = parse_abi(DID_REGISTRY_ABI).map_err(|e| LedgerError::Encoding(e.to_string()))?;
        Ok(DidRegistry { client, address, abi })
    }
}

/// Interprets the `getDID` return tuple. An empty DID means the subject was
/// never registered.
fn view_from_tuple(did: String, active: bool) -> Option<OnChainDIDView> {
    if did.is_empty() {
        return None;
    }
    Some(OnChainDIDView {
        did,
        revoked: !active,
        document_cid: None,
    })
}

#[async_trait]
impl Ledger for DidRegistry {
    async fn is_on_chain_issuer(&self, address: &str) -> Result<bool, LedgerError> {
        // An unparseable wallet is simply not an issuer.
        let account = match Address::from_str(address.trim()) {
            Ok(account) => account,
            Err(_) => {
                debug!("issuer address {} is not a valid account", address);
                return Ok(false);
            }
        };
        self.client
            .query_contract(self.address, &self.abi, "isIssuer", account)
            .await
    }

    async fn register_on_chain(&self, subject_id: &str, did: &str) -> Result<TxReceipt, LedgerError> {
        self.client
            .send_transaction(
                self.address,
                &self.abi,
                "registerDID",
                (subject_id.to_string(), did.to_string()),
            )
            .await
    }

    async fn revoke_on_chain(&self, subject_id: &str) -> Result<TxReceipt, LedgerError> {
        self.client
            .send_transaction(self.address, &self.abi, "revokeDID", subject_id.to_string())
            .await
    }

    async fn get_on_chain_did(&self, subject_id: &str) -> Result<Option<OnChainDIDView>, LedgerError> {
        let (did, active): (String, bool) = self
            .client
            .query_contract(self.address, &self.abi, "getDID", subject_id.to_string())
            .await?;
        Ok(view_from_tuple(did, active))
    }
}
