// src/storage/mod.rs
//! Off-chain persistence: content-addressed documents, the local DID index,
//! the subject directory, and the SQLite store backing the last two.

pub mod document_store;
pub mod ipfs_client;
pub mod local_index;
pub mod pinata_client;
pub mod sqlite;
pub mod subjects;
