// src/blockchain/mod.rs
//! Ledger access: the [`ledger::Ledger`] seam and the EVM client behind it.

pub mod evm_client;
pub mod ledger;
