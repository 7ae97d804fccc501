// src/blockchain/evm_client.rs
//! EVM blockchain client implementation.
//!
//! Provides a high-level interface for interacting with an EVM chain hosting
//! the DID registry: signed transaction sending and read-only contract calls.

use crate::blockchain::ledger::{LedgerError, TxReceipt};
use ethers::{
    abi::{Abi, Detokenize, Tokenize},
    contract::Contract,
    middleware::SignerMiddleware,
    providers::{Http, Middleware, Provider},
    signers::{LocalWallet, Signer},
    types::{Address, H256, U64},
};
use log::debug;
use std::sync::Arc;

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// EVM client managing the issuing wallet and contract interactions.
///
/// This client provides:
/// - Wallet management with a hex private key
/// - Transaction sending that waits for the mined receipt
/// - Contract query functionality
#[derive(Clone)]
pub struct EvmClient {
    /// Provider wrapped with the signing wallet
    client: Arc<SignerClient>,
}

impl EvmClient {
    /// Creates a new client instance.
    ///
    /// # Arguments
    /// * `rpc_url` - JSON-RPC endpoint URL
    /// * `private_key` - Hex-encoded private key (with or without 0x prefix)
    ///
    /// # Errors
    /// Returns error if:
    /// - RPC URL is malformed or the chain ID cannot be retrieved
    /// - Private key is invalid
    pub async fn connect(rpc_url: &str, private_key: &str) -> Result<Self, LedgerError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| LedgerError::Transport(format!("invalid RPC URL {}: {}", rpc_url, e)))?;

        let chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?
            .as_u64();

        let wallet = private_key
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|e| LedgerError::Transport(format!("invalid private key: {}", e)))?
            .with_chain_id(chain_id);

        debug!("connected to chain {} as 0x{:x}", chain_id, wallet.address());

        Ok(Self {
            client: Arc::new(SignerMiddleware::new(provider, wallet)),
        })
    }

    /// Gets the issuing wallet's address.
    pub fn address(&self) -> Address {
        self.client.address()
    }

    /// Sends a transaction to a smart contract and waits until it is mined.
    ///
    /// # Errors
    /// - `Encoding` if the method or parameters do not match the ABI
    /// - `Rejected` if the node refuses the transaction
    /// - `Dropped` if it never gets mined
    /// - `Reverted` if the receipt reports failure
    pub async fn send_transaction(
        &self,
        contract_address: Address,
        abi: &Abi,
        method: &str,
        params: impl Tokenize,
    ) -> Result<TxReceipt, LedgerError> {
        let contract = Contract::new(contract_address, abi.clone(), self.client.clone());

        let call = contract
            .method::<_, H256>(method, params)
            .map_err(|e| LedgerError::Encoding(e.to_string()))?;

        let pending = call
            .send()
            .await
            .map_err(|e| LedgerError::Rejected(e.to_string()))?;
        let tx_hash = format!("0x{:x}", *pending);

        let receipt = pending
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?
            .ok_or(LedgerError::Dropped)?;

        if receipt.status == Some(U64::zero()) {
            return Err(LedgerError::Reverted(tx_hash));
        }

        Ok(TxReceipt {
            tx_hash,
            block_number: receipt.block_number.map(|n| n.as_u64()),
        })
    }

    /// Queries a smart contract (read-only operation).
    pub async fn query_contract<R: Detokenize>(
        &self,
        contract_address: Address,
        abi: &Abi,
        method: &str,
        params: impl Tokenize,
    ) -> Result<R, LedgerError> {
        let contract = Contract::new(contract_address, abi.clone(), self.client.clone());

        contract
            .method::<_, R>(method, params)
            .map_err(|e| LedgerError::Encoding(e.to_string()))?
            .call()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))
    }
}
