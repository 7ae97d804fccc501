// src/models/subject.rs
//! Subjects (the entities holding DIDs) and the caller issuing a request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An entity that may hold at most one active DID.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    /// Stable, opaque subject identifier
    pub id: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Subject {
    pub fn new(id: impl Into<String>) -> Self {
        Subject {
            id: id.into(),
            display_name: None,
            created_at: Utc::now(),
        }
    }
}

/// Identity of whoever invokes a lifecycle operation.
///
/// `issuer_address` is the caller's wallet. It is checked against the ledger
/// on every privileged call and never cached.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Caller {
    /// Recorded as the actor of audit events
    pub actor_id: String,
    pub issuer_address: Option<String>,
}

impl Caller {
    pub fn new(actor_id: impl Into<String>, issuer_address: Option<String>) -> Self {
        Caller {
            actor_id: actor_id.into(),
            issuer_address,
        }
    }

    /// Issuer address with surrounding whitespace removed, `None` when blank.
    pub fn issuer(&self) -> Option<&str> {
        self.issuer_address
            .as_deref()
            .map(str::trim)
            .filter(|address| !address.is_empty())
    }
}
