// src/main.rs

//! # DID Lifecycle Service - Main Entry Point
//!
//! Wires the collaborators together and starts the API server.
//!
//! ## Architecture Overview
//! 1. **Blockchain Layer**: `EvmClient` + `DidRegistry`, the authoritative ledger
//! 2. **Storage Layer**: IPFS or Pinata for DID Documents, SQLite for the
//!    local index, the subject directory and the audit log
//! 3. **Services Layer**: `DidCoordinator` and the HTTP API over it
//!
//! ## Configuration
//! See [`config::AppConfig`]. At minimum `PRIVATE_KEY` and
//! `DID_REGISTRY_ADDRESS` must be set, in the environment or a `.env` file.

use crate::blockchain::evm_client::EvmClient;
use crate::config::{AppConfig, DocumentBackend};
use crate::contracts::did_registry::DidRegistry;
use crate::services::api_server::ApiServer;
use crate::services::audit::{AuditFailure, AuditTrail};
use crate::services::did_coordinator::DidCoordinator;
use crate::storage::document_store::DocumentStore;
use crate::storage::ipfs_client::IpfsStorage;
use crate::storage::pinata_client::PinataStorage;
use crate::storage::sqlite::SqliteStore;
use anyhow::Context;
use dotenv::dotenv;
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

// Module declarations (organized by functional domain)
mod blockchain; // Ledger seam and EVM client
mod config; // Layered configuration
mod contracts; // DIDRegistry binding
mod error; // Caller-facing errors
mod models; // Data structures
mod services; // Coordinator, audit trail and API
mod storage; // Documents, index, subjects
mod utils; // Helper functions

/// Main application entry point
///
/// # Initialization Sequence
/// 1. Load environment and configuration
/// 2. Connect to the chain and bind the registry contract
/// 3. Open the document backend and the SQLite store
/// 4. Start the API server, then flush pending audit writes on shutdown
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::load().context("loading configuration")?;
    config.validate().context("invalid configuration")?;
    let settings = config.lifecycle_settings();

    let client = EvmClient::connect(&config.ledger.rpc_url, &config.ledger.private_key)
        .await
        .context("connecting to the ledger")?;
    info!("issuing wallet 0x{:x}", client.address());
    let registry = DidRegistry::new(client, &config.ledger.registry_address)
        .context("binding the DID registry contract")?;

    let documents: Arc<dyn DocumentStore> = match config.documents.backend {
        DocumentBackend::Ipfs => Arc::new(
            IpfsStorage::new(&config.documents.ipfs_api_url).context("configuring IPFS")?,
        ),
        DocumentBackend::Pinata => {
            let jwt = config.documents.pinata_jwt.as_deref().unwrap_or_default();
            Arc::new(PinataStorage::new(&config.documents.pinata_api_url, jwt))
        }
    };
    info!("publishing documents via {:?}", config.documents.backend);

    let store = Arc::new(
        SqliteStore::open(&config.index.database_path)
            .await
            .with_context(|| format!("opening {}", config.index.database_path.display()))?,
    );

    let (failures_tx, mut failures_rx) = mpsc::unbounded_channel::<AuditFailure>();
    tokio::spawn(async move {
        while let Some(failure) = failures_rx.recv().await {
            error!(
                "audit gap: {} by {} for {} ({}): {}",
                failure.event.action, failure.event.actor_id, failure.event.did, failure.event.metadata, failure.reason
            );
        }
    });
    let audit = AuditTrail::new(store.clone(), settings.audit_timeout).with_failure_channel(failures_tx);

    let coordinator = Arc::new(DidCoordinator::new(
        store.clone(),
        Arc::new(registry),
        documents,
        store.clone(),
        audit,
        settings,
    ));

    let api_server = ApiServer::new(
        coordinator.clone(),
        store,
        Duration::from_millis(config.server.request_timeout_ms),
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for shutdown signal: {}", e);
        }
        info!("shutting down");
    };
    api_server
        .run(config.server.bind_addr, shutdown)
        .await
        .context("API server failed")?;

    coordinator.audit().flush().await;
    let gaps = coordinator.audit().failure_count();
    if gaps > 0 {
        error!("{} audit events were not recorded during this run", gaps);
    }
    Ok(())
}
