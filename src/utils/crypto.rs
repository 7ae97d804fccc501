// src/utils/crypto.rs
//! Hashing helpers. Keccak-256 keeps derived identifiers comparable with what
//! the registry contract computes on chain.

use ethers::utils::keccak256;

/// Computes a Keccak-256 hash of the input data.
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    keccak256(data)
}
