// src/error.rs
//! Caller-facing errors of the DID lifecycle operations.
//!
//! Every failure names the [`Step`] it happened at so a caller can retry
//! precisely that step.

use crate::blockchain::ledger::LedgerError;
use crate::models::did::DIDRecord;
use crate::models::lifecycle::Discrepancy;
use crate::storage::document_store::StorageError;
use crate::storage::local_index::IndexError;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Workflow step an operation was executing when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    SubjectLookup,
    IndexLookup,
    IssuerCheck,
    DocumentPublish,
    LedgerRegister,
    LedgerRevoke,
    LedgerRead,
    IndexCreate,
    IndexDelete,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::SubjectLookup => "subject lookup",
            Step::IndexLookup => "index lookup",
            Step::IssuerCheck => "issuer check",
            Step::DocumentPublish => "document publish",
            Step::LedgerRegister => "ledger register",
            Step::LedgerRevoke => "ledger revoke",
            Step::LedgerRead => "ledger read",
            Step::IndexCreate => "index create",
            Step::IndexDelete => "index delete",
        };
        f.write_str(name)
    }
}

/// Coarse classification of a [`LifecycleError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    StorageUnavailable,
    StorageTimeout,
    LedgerWriteFailed,
    LedgerReadFailed,
    LedgerTimeout,
    IndexWriteFailed,
    IndexReadFailed,
    Inconsistent,
    AlreadyExists,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("subject {0} not found")]
    SubjectNotFound(String),

    #[error("no DID registered for subject {0}")]
    DidNotFound(String),

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("document publish for subject {subject_id} failed: {source}")]
    StorageUnavailable {
        subject_id: String,
        #[source]
        source: StorageError,
    },

    #[error("document publish for subject {subject_id} timed out after {after:?}")]
    StorageTimeout { subject_id: String, after: Duration },

    #[error("{step} for subject {subject_id} failed: {source}")]
    LedgerWriteFailed {
        step: Step,
        subject_id: String,
        #[source]
        source: LedgerError,
    },

    #[error("{step} for subject {subject_id} failed: {source}")]
    LedgerReadFailed {
        step: Step,
        subject_id: String,
        #[source]
        source: LedgerError,
    },

    #[error("{step} for subject {subject_id} timed out after {after:?}")]
    LedgerTimeout {
        step: Step,
        subject_id: String,
        after: Duration,
    },

    #[error("{step} for {did} failed: {source}")]
    IndexWriteFailed {
        step: Step,
        did: String,
        #[source]
        source: IndexError,
    },

    #[error("{step} for subject {subject_id} failed: {source}")]
    IndexReadFailed {
        step: Step,
        subject_id: String,
        #[source]
        source: IndexError,
    },

    #[error("ledger and index disagree for {0}")]
    Inconsistent(Box<Discrepancy>),

    #[error("subject {} already holds {}", .0.subject_id, .0.did)]
    AlreadyExists(Box<DIDRecord>),
}

impl LifecycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LifecycleError::SubjectNotFound(_) | LifecycleError::DidNotFound(_) => ErrorKind::NotFound,
            LifecycleError::Unauthorized(_) => ErrorKind::Unauthorized,
            LifecycleError::StorageUnavailable { .. } => ErrorKind::StorageUnavailable,
            LifecycleError::StorageTimeout { .. } => ErrorKind::StorageTimeout,
            LifecycleError::LedgerWriteFailed { .. } => ErrorKind::LedgerWriteFailed,
            LifecycleError::LedgerReadFailed { .. } => ErrorKind::LedgerReadFailed,
            LifecycleError::LedgerTimeout { .. } => ErrorKind::LedgerTimeout,
            LifecycleError::IndexWriteFailed { .. } => ErrorKind::IndexWriteFailed,
            LifecycleError::IndexReadFailed { .. } => ErrorKind::IndexReadFailed,
            LifecycleError::Inconsistent(_) => ErrorKind::Inconsistent,
            LifecycleError::AlreadyExists(_) => ErrorKind::AlreadyExists,
        }
    }

    /// Step the failing operation was at.
    pub fn step(&self) -> Step {
        match self {
            LifecycleError::SubjectNotFound(_) => Step::SubjectLookup,
            LifecycleError::DidNotFound(_) | LifecycleError::AlreadyExists(_) => Step::IndexLookup,
            LifecycleError::Unauthorized(_) => Step::IssuerCheck,
            LifecycleError::StorageUnavailable { .. } | LifecycleError::StorageTimeout { .. } => {
                Step::DocumentPublish
            }
            LifecycleError::LedgerWriteFailed { step, .. }
            | LifecycleError::LedgerReadFailed { step, .. }
            | LifecycleError::LedgerTimeout { step, .. }
            | LifecycleError::IndexWriteFailed { step, .. }
            | LifecycleError::IndexReadFailed { step, .. } => *step,
            LifecycleError::Inconsistent(_) => Step::LedgerRead,
        }
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
