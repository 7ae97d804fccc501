// src/models/audit.rs
//! Append-only audit events for DID lifecycle transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Lifecycle transition recorded by an [`AuditEvent`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    #[serde(rename = "DID_added")]
    DidAdded,
    #[serde(rename = "DID_revoked")]
    DidRevoked,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::DidAdded => "DID_added",
            AuditAction::DidRevoked => "DID_revoked",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the audit trail. Never mutated once written.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub action: AuditAction,
    pub actor_id: String,
    pub did: String,
    pub metadata: Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    /// Event for a completed registration.
    pub fn did_added(actor_id: &str, subject_id: &str, did: &str, cid: &str, tx_hash: &str) -> Self {
        AuditEvent {
            action: AuditAction::DidAdded,
            actor_id: actor_id.to_string(),
            did: did.to_string(),
            metadata: json!({
                "did": did,
                "cid": cid,
                "subjectId": subject_id,
                "txHash": tx_hash,
            }),
            timestamp: Utc::now(),
        }
    }

    /// Event for a completed revocation.
    pub fn did_revoked(actor_id: &str, subject_id: &str, did: &str, reason: &str, tx_hash: &str) -> Self {
        AuditEvent {
            action: AuditAction::DidRevoked,
            actor_id: actor_id.to_string(),
            did: did.to_string(),
            metadata: json!({
                "did": did,
                "reason": reason,
                "subjectId": subject_id,
                "txHash": tx_hash,
            }),
            timestamp: Utc::now(),
        }
    }
}
