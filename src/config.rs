// src/config.rs
//! Layered service configuration.
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults
//! 2. `config/did-lifecycle.{toml,yaml,json}` (optional)
//! 3. `DID__<SECTION>__<KEY>` environment variables
//! 4. Legacy variables: `RPC_URL`, `PRIVATE_KEY`, `DID_REGISTRY_ADDRESS`,
//!    `IPFS_API_URL`, `PINATA_JWT`
//!
//! `.env` files are loaded into the environment by `main` before this runs.

use crate::storage::ipfs_client::DEFAULT_IPFS_API_URL;
use crate::storage::pinata_client::DEFAULT_PINATA_API_URL;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub ledger: LedgerConfig,
    pub documents: DocumentsConfig,
    pub index: IndexConfig,
    pub audit: AuditConfig,
    pub lifecycle: LifecycleConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    pub rpc_url: String,
    pub private_key: String,
    pub registry_address: String,
    /// Bound on every ledger call, reads and writes alike
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentBackend {
    Ipfs,
    Pinata,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentsConfig {
    pub backend: DocumentBackend,
    pub ipfs_api_url: String,
    pub pinata_api_url: String,
    pub pinata_jwt: Option<String>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfig {
    pub database_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    pub timeout_ms: u64,
}

/// What Register does for a subject that already holds a DID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistingDidPolicy {
    /// Return the existing record unchanged
    Return,
    /// Fail with `AlreadyExists`
    Reject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleConfig {
    pub on_existing: ExistingDidPolicy,
}

/// Timeouts and policies the coordinator runs with.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleSettings {
    pub ledger_timeout: Duration,
    pub storage_timeout: Duration,
    pub audit_timeout: Duration,
    pub on_existing: ExistingDidPolicy,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        LifecycleSettings {
            ledger_timeout: Duration::from_secs(30),
            storage_timeout: Duration::from_secs(15),
            audit_timeout: Duration::from_secs(5),
            on_existing: ExistingDidPolicy::Return,
        }
    }
}

impl AppConfig {
    /// Loads configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(File::with_name("config/did-lifecycle").required(false))
            .add_source(Environment::with_prefix("DID").prefix_separator("__").separator("__"))
            .set_override_option("ledger.rpc_url", env::var("RPC_URL").ok())?
            .set_override_option("ledger.private_key", env::var("PRIVATE_KEY").ok())?
            .set_override_option("ledger.registry_address", env::var("DID_REGISTRY_ADDRESS").ok())?
            .set_override_option("documents.ipfs_api_url", env::var("IPFS_API_URL").ok())?
            .set_override_option("documents.pinata_jwt", env::var("PINATA_JWT").ok())?
            .build()?
            .try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let defaults = LifecycleSettings::default();
        Config::builder()
            .set_default("server.bind_addr", "127.0.0.1:3000")?
            .set_default("server.request_timeout_ms", 120_000)?
            .set_default("ledger.rpc_url", "http://localhost:8545")?
            .set_default("ledger.private_key", "")?
            .set_default("ledger.registry_address", "")?
            .set_default("ledger.timeout_ms", defaults.ledger_timeout.as_millis() as u64)?
            .set_default("documents.backend", "ipfs")?
            .set_default("documents.ipfs_api_url", DEFAULT_IPFS_API_URL)?
            .set_default("documents.pinata_api_url", DEFAULT_PINATA_API_URL)?
            .set_default("documents.timeout_ms", defaults.storage_timeout.as_millis() as u64)?
            .set_default("index.database_path", "data/did-index.sqlite")?
            .set_default("audit.timeout_ms", defaults.audit_timeout.as_millis() as u64)?
            .set_default("lifecycle.on_existing", "return")
    }

    pub fn lifecycle_settings(&self) -> LifecycleSettings {
        LifecycleSettings {
            ledger_timeout: Duration::from_millis(self.ledger.timeout_ms),
            storage_timeout: Duration::from_millis(self.documents.timeout_ms),
            audit_timeout: Duration::from_millis(self.audit.timeout_ms),
            on_existing: self.lifecycle.on_existing,
        }
    }

    /// Rejects configurations that cannot possibly work at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger.private_key.is_empty() {
            return Err(ConfigError::Message("ledger.private_key (PRIVATE_KEY) must be set".into()));
        }
        if self.ledger.registry_address.is_empty() {
            return Err(ConfigError::Message(
                "ledger.registry_address (DID_REGISTRY_ADDRESS) must be set".into(),
            ));
        }
        if self.documents.backend == DocumentBackend::Pinata && self.documents.pinata_jwt.is_none() {
            return Err(ConfigError::Message(
                "documents.pinata_jwt (PINATA_JWT) is required for the pinata backend".into(),
            ));
        }
        Ok(())
    }
}
