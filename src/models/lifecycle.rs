// src/models/lifecycle.rs
//! Results returned by the DID lifecycle operations.

use crate::blockchain::ledger::OnChainDIDView;
use crate::models::did::DIDRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of Register.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub did: String,
    #[serde(rename = "documentCID")]
    pub document_cid: String,
}

impl From<&DIDRecord> for Registration {
    fn from(record: &DIDRecord) -> Self {
        Registration {
            did: record.did.clone(),
            document_cid: record.document_cid.clone(),
        }
    }
}

/// Result of a Resolve whose index record agrees with the ledger.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub did: String,
    #[serde(rename = "documentCID")]
    pub document_cid: String,
    #[serde(rename = "onChainDID")]
    pub on_chain_did: String,
}

/// Result of Revoke.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Revocation {
    pub tx_hash: String,
}

/// How the local index and the ledger disagree.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyKind {
    /// Index holds a record the ledger has never seen
    NotOnLedger,
    /// Index holds a record the ledger has revoked
    RevokedOnLedger,
    /// Ledger anchors a different DID for the subject
    DidMismatch,
    /// Ledger anchors a different document CID
    DocumentMismatch,
    /// Ledger has an active DID the index does not know about
    MissingFromIndex,
}

impl fmt::Display for DiscrepancyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DiscrepancyKind::NotOnLedger => "index record is not on the ledger",
            DiscrepancyKind::RevokedOnLedger => "ledger shows the DID as revoked",
            DiscrepancyKind::DidMismatch => "ledger holds a different DID",
            DiscrepancyKind::DocumentMismatch => "ledger holds a different document",
            DiscrepancyKind::MissingFromIndex => "ledger DID is missing from the index",
        };
        f.write_str(text)
    }
}

/// Both sides of a ledger/index disagreement, surfaced by Resolve.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Discrepancy {
    pub subject_id: String,
    pub kind: DiscrepancyKind,
    pub index: Option<DIDRecord>,
    pub ledger: Option<OnChainDIDView>,
}

impl Discrepancy {
    /// Compares an index record with the ledger view; `None` means they agree.
    pub fn between(record: &DIDRecord, view: Option<&OnChainDIDView>) -> Option<DiscrepancyKind> {
        let view = match view {
            Some(view) => view,
            None => return Some(DiscrepancyKind::NotOnLedger),
        };
        if view.revoked {
            return Some(DiscrepancyKind::RevokedOnLedger);
        }
        if view.did != record.did {
            return Some(DiscrepancyKind::DidMismatch);
        }
        match &view.document_cid {
            Some(cid) if *cid != record.document_cid => Some(DiscrepancyKind::DocumentMismatch),
            _ => None,
        }
    }
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subject {}: {}", self.subject_id, self.kind)
    }
}

/// What Reconcile did to bring the index in line with the ledger.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Consistent { record: DIDRecord },
    RemovedStale { removed: DIDRecord },
    Replaced { removed: DIDRecord, record: DIDRecord },
    Backfilled { record: DIDRecord },
    NothingToRepair,
}
