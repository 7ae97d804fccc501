// src/services/did_coordinator.rs
//! DID Lifecycle Coordinator
//!
//! Sequences the ledger, the document store, the local index and the audit
//! trail to register, resolve, revoke and reconcile a subject's DID.
//!
//! Side effects happen cheapest first: document publish, then the ledger
//! write, then the index. Nothing is rolled back across systems. Instead each
//! confirmed step is remembered per subject so a retry resumes where the
//! previous attempt stopped, and [`DidCoordinator::reconcile`] repairs the
//! index from the ledger, which is authoritative.

use crate::blockchain::ledger::{Ledger, LedgerError, OnChainDIDView, TxReceipt};
use crate::config::{ExistingDidPolicy, LifecycleSettings};
use crate::error::{LifecycleError, LifecycleResult, Step};
use crate::models::audit::AuditEvent;
use crate::models::did::{derive_did, DIDDocument, DIDRecord};
use crate::models::lifecycle::{
    Discrepancy, DiscrepancyKind, ReconcileOutcome, Registration, Resolution, Revocation,
};
use crate::models::subject::Caller;
use crate::services::audit::AuditTrail;
use crate::services::subject_locks::SubjectLocks;
use crate::storage::document_store::DocumentStore;
use crate::storage::local_index::LocalIndex;
use crate::storage::subjects::SubjectDirectory;
use chrono::Utc;
use log::{error, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Confirmed steps of a transition that has not completed yet.
#[derive(Debug, Clone)]
enum Progress {
    Registering {
        did: String,
        document_cid: String,
        receipt: Option<TxReceipt>,
    },
    Revoking {
        record_id: String,
        receipt: TxReceipt,
    },
}

pub struct DidCoordinator {
    subjects: Arc<dyn SubjectDirectory>,
    ledger: Arc<dyn Ledger>,
    documents: Arc<dyn DocumentStore>,
    index: Arc<dyn LocalIndex>,
    audit: AuditTrail,
    locks: SubjectLocks,
    progress: Mutex<HashMap<String, Progress>>,
    settings: LifecycleSettings,
}

impl DidCoordinator {
    pub fn new(
        subjects: Arc<dyn SubjectDirectory>,
        ledger: Arc<dyn Ledger>,
        documents: Arc<dyn DocumentStore>,
        index: Arc<dyn LocalIndex>,
        audit: AuditTrail,
        settings: LifecycleSettings,
    ) -> Self {
        DidCoordinator {
            subjects,
            ledger,
            documents,
            index,
            audit,
            locks: SubjectLocks::new(),
            progress: Mutex::new(HashMap::new()),
            settings,
        }
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    /// Registers a DID for `subject_id` on behalf of `caller`.
    ///
    /// # Process Flow
    /// 1. Subject must exist
    /// 2. An existing index record is returned unchanged (or rejected, per
    ///    [`ExistingDidPolicy`])
    /// 3. Caller must be a recognized on-chain issuer, checked live
    /// 4. Publish the DID Document, unless a previous attempt already did
    /// 5. Register on the ledger, unless a previous attempt already did
    /// 6. Create the index record
    /// 7. Schedule the `DID_added` audit event
    ///
    /// # Errors
    /// Each failure carries the step it happened at; see [`LifecycleError`].
    pub async fn register(&self, subject_id: &str, caller: &Caller) -> LifecycleResult<Registration> {
        let _guard = self.locks.acquire(subject_id).await;
        self.require_subject(subject_id).await?;

        if let Some(existing) = self.find_record(subject_id).await? {
            if let Some(receipt) = self.revocation_progress(subject_id, &existing.id) {
                // Revoked on the ledger, index delete still outstanding
                warn!(
                    "subject {}: {} (tx {}); finish the revocation first",
                    subject_id,
                    DiscrepancyKind::RevokedOnLedger,
                    receipt.tx_hash
                );
                let ledger = OnChainDIDView {
                    did: existing.did.clone(),
                    revoked: true,
                    document_cid: None,
                };
                return Err(LifecycleError::Inconsistent(Box::new(Discrepancy {
                    subject_id: subject_id.to_string(),
                    kind: DiscrepancyKind::RevokedOnLedger,
                    index: Some(existing),
                    ledger: Some(ledger),
                })));
            }
            self.clear_registration_progress(subject_id);
            return match self.settings.on_existing {
                ExistingDidPolicy::Return => {
                    info!("subject {} already holds {}", subject_id, existing.did);
                    Ok(Registration::from(&existing))
                }
                ExistingDidPolicy::Reject => Err(LifecycleError::AlreadyExists(Box::new(existing))),
            };
        }

        let issuer = self.authorize(subject_id, caller).await?;
        let did = derive_did(issuer, subject_id);

        let (document_cid, receipt) = match self.registration_progress(subject_id, &did) {
            Some((cid, receipt)) => {
                info!("resuming registration of {} with document {}", did, cid);
                (cid, receipt)
            }
            None => {
                let cid = self.publish(subject_id, &did).await?;
                self.save_progress(
                    subject_id,
                    Progress::Registering {
                        did: did.clone(),
                        document_cid: cid.clone(),
                        receipt: None,
                    },
                );
                (cid, None)
            }
        };

        let receipt = match receipt {
            Some(receipt) => receipt,
            None => {
                let receipt = self
                    .ledger_call(Step::LedgerRegister, subject_id, self.ledger.register_on_chain(subject_id, &did))
                    .await?;
                self.save_progress(
                    subject_id,
                    Progress::Registering {
                        did: did.clone(),
                        document_cid: document_cid.clone(),
                        receipt: Some(receipt.clone()),
                    },
                );
                receipt
            }
        };

        let record = DIDRecord::new(subject_id, &did, &document_cid, Utc::now());
        let record = self.index.create(record).await.map_err(|source| {
            error!(
                "ledger holds {} (tx {}) but the index write failed: {}",
                did, receipt.tx_hash, source
            );
            LifecycleError::IndexWriteFailed {
                step: Step::IndexCreate,
                did: did.clone(),
                source,
            }
        })?;
        self.clear_progress(subject_id);

        info!("registered {} for subject {} (tx {})", did, subject_id, receipt.tx_hash);
        self.audit.record(AuditEvent::did_added(
            &caller.actor_id,
            subject_id,
            &did,
            &document_cid,
            &receipt.tx_hash,
        ));

        Ok(Registration::from(&record))
    }

    /// Resolves the subject's DID, cross-checked against the ledger.
    ///
    /// Read-only. Any disagreement between the index and the ledger is
    /// returned as [`LifecycleError::Inconsistent`] and left for
    /// [`DidCoordinator::reconcile`].
    ///
    /// Resolve takes no subject lock. While a Register or Revoke for the same
    /// subject is between its ledger write and its index write, Resolve sees
    /// `MissingFromIndex` or `RevokedOnLedger`. That state is transient, so
    /// an `Inconsistent` answer during an in-flight transition can be retried
    /// before reaching for Reconcile.
    pub async fn resolve(&self, subject_id: &str) -> LifecycleResult<Resolution> {
        let record = match self.find_record(subject_id).await? {
            Some(record) => record,
            None => return Err(self.classify_index_miss(subject_id).await),
        };

        let view = self
            .ledger_call(Step::LedgerRead, subject_id, self.ledger.get_on_chain_did(subject_id))
            .await?;

        match view {
            Some(view) if Discrepancy::between(&record, Some(&view)).is_none() => Ok(Resolution {
                did: record.did,
                document_cid: record.document_cid,
                on_chain_did: view.did,
            }),
            view => {
                let kind = Discrepancy::between(&record, view.as_ref())
                    .unwrap_or(DiscrepancyKind::NotOnLedger);
                warn!("subject {}: {}", subject_id, kind);
                Err(LifecycleError::Inconsistent(Box::new(Discrepancy {
                    subject_id: subject_id.to_string(),
                    kind,
                    index: Some(record),
                    ledger: view,
                })))
            }
        }
    }

    /// Revokes the subject's DID on the ledger and removes its index record.
    ///
    /// A ledger failure leaves everything untouched. An index failure after
    /// the ledger revoke is reported as `IndexWriteFailed`; retrying skips the
    /// ledger step.
    pub async fn revoke(&self, subject_id: &str, reason: &str, caller: &Caller) -> LifecycleResult<Revocation> {
        let _guard = self.locks.acquire(subject_id).await;
        self.require_subject(subject_id).await?;

        let record = self
            .find_record(subject_id)
            .await?
            .ok_or_else(|| LifecycleError::DidNotFound(subject_id.to_string()))?;

        self.authorize(subject_id, caller).await?;

        let receipt = match self.revocation_progress(subject_id, &record.id) {
            Some(receipt) => {
                info!("resuming revocation of {} (tx {})", record.did, receipt.tx_hash);
                receipt
            }
            None => {
                let receipt = self
                    .ledger_call(Step::LedgerRevoke, subject_id, self.ledger.revoke_on_chain(subject_id))
                    .await?;
                self.save_progress(
                    subject_id,
                    Progress::Revoking {
                        record_id: record.id.clone(),
                        receipt: receipt.clone(),
                    },
                );
                receipt
            }
        };

        self.index.delete(&record.id).await.map_err(|source| {
            error!(
                "ledger revoked {} (tx {}) but the index still holds it: {}",
                record.did, receipt.tx_hash, source
            );
            LifecycleError::IndexWriteFailed {
                step: Step::IndexDelete,
                did: record.did.clone(),
                source,
            }
        })?;
        self.clear_progress(subject_id);

        info!("revoked {} for subject {} (tx {})", record.did, subject_id, receipt.tx_hash);
        self.audit.record(AuditEvent::did_revoked(
            &caller.actor_id,
            subject_id,
            &record.did,
            reason,
            &receipt.tx_hash,
        ));

        Ok(Revocation {
            tx_hash: receipt.tx_hash,
        })
    }

    /// Repairs the subject's index record from ledger state.
    ///
    /// Never writes to the ledger and records no audit event.
    pub async fn reconcile(&self, subject_id: &str) -> LifecycleResult<ReconcileOutcome> {
        let _guard = self.locks.acquire(subject_id).await;

        let record = self.find_record(subject_id).await?;
        let active = self
            .ledger_call(Step::LedgerRead, subject_id, self.ledger.get_on_chain_did(subject_id))
            .await?
            .filter(|view| !view.revoked);

        let outcome = match (record, active) {
            (Some(record), Some(view)) => match Discrepancy::between(&record, Some(&view)) {
                None => ReconcileOutcome::Consistent { record },
                Some(_) => {
                    let replacement = self.record_from_ledger(subject_id, &view).await?;
                    self.delete_record(&record).await?;
                    let record_new = self.create_record(replacement).await?;
                    ReconcileOutcome::Replaced {
                        removed: record,
                        record: record_new,
                    }
                }
            },
            (Some(record), None) => {
                self.delete_record(&record).await?;
                ReconcileOutcome::RemovedStale { removed: record }
            }
            (None, Some(view)) => {
                let record = self.record_from_ledger(subject_id, &view).await?;
                let record = self.create_record(record).await?;
                ReconcileOutcome::Backfilled { record }
            }
            (None, None) => ReconcileOutcome::NothingToRepair,
        };

        self.clear_progress(subject_id);
        match &outcome {
            ReconcileOutcome::Consistent { .. } | ReconcileOutcome::NothingToRepair => {}
            repaired => info!("reconciled subject {}: {:?}", subject_id, repaired),
        }
        Ok(outcome)
    }

    async fn require_subject(&self, subject_id: &str) -> LifecycleResult<()> {
        match self.subjects.find_subject(subject_id).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(LifecycleError::SubjectNotFound(subject_id.to_string())),
            Err(source) => Err(LifecycleError::IndexReadFailed {
                step: Step::SubjectLookup,
                subject_id: subject_id.to_string(),
                source,
            }),
        }
    }

    async fn find_record(&self, subject_id: &str) -> LifecycleResult<Option<DIDRecord>> {
        self.index
            .find(subject_id)
            .await
            .map_err(|source| LifecycleError::IndexReadFailed {
                step: Step::IndexLookup,
                subject_id: subject_id.to_string(),
                source,
            })
    }

    async fn create_record(&self, record: DIDRecord) -> LifecycleResult<DIDRecord> {
        let did = record.did.clone();
        self.index
            .create(record)
            .await
            .map_err(|source| LifecycleError::IndexWriteFailed {
                step: Step::IndexCreate,
                did,
                source,
            })
    }

    async fn delete_record(&self, record: &DIDRecord) -> LifecycleResult<()> {
        self.index
            .delete(&record.id)
            .await
            .map_err(|source| LifecycleError::IndexWriteFailed {
                step: Step::IndexDelete,
                did: record.did.clone(),
                source,
            })
    }

    /// Live issuer check. Returns the caller's issuer address.
    async fn authorize<'c>(&self, subject_id: &str, caller: &'c Caller) -> LifecycleResult<&'c str> {
        let issuer = caller
            .issuer()
            .ok_or_else(|| LifecycleError::Unauthorized("issuer address missing".to_string()))?;

        let recognized = self
            .ledger_call(Step::IssuerCheck, subject_id, self.ledger.is_on_chain_issuer(issuer))
            .await?;
        if !recognized {
            warn!("{} attempted a privileged operation on {} without issuer status", issuer, subject_id);
            return Err(LifecycleError::Unauthorized(format!(
                "{} is not a recognized on-chain issuer",
                issuer
            )));
        }
        Ok(issuer)
    }

    async fn publish(&self, subject_id: &str, did: &str) -> LifecycleResult<String> {
        let document = DIDDocument::for_subject(did, subject_id);
        let label = document.publish_label();
        let after = self.settings.storage_timeout;

        match tokio::time::timeout(after, self.documents.publish(&document, &label)).await {
            Ok(Ok(cid)) => Ok(cid),
            Ok(Err(source)) => Err(LifecycleError::StorageUnavailable {
                subject_id: subject_id.to_string(),
                source,
            }),
            Err(_) => Err(LifecycleError::StorageTimeout {
                subject_id: subject_id.to_string(),
                after,
            }),
        }
    }

    /// Runs one ledger call under the configured timeout and classifies its
    /// failure by `step`.
    async fn ledger_call<T>(
        &self,
        step: Step,
        subject_id: &str,
        call: impl Future<Output = Result<T, LedgerError>>,
    ) -> LifecycleResult<T> {
        let after = self.settings.ledger_timeout;
        let subject_id = subject_id.to_string();

        match tokio::time::timeout(after, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => match step {
                Step::LedgerRegister | Step::LedgerRevoke => Err(LifecycleError::LedgerWriteFailed {
                    step,
                    subject_id,
                    source,
                }),
                _ => Err(LifecycleError::LedgerReadFailed {
                    step,
                    subject_id,
                    source,
                }),
            },
            Err(_) => Err(LifecycleError::LedgerTimeout {
                step,
                subject_id,
                after,
            }),
        }
    }

    /// An index miss is only a plain `DidNotFound` if the ledger agrees.
    async fn classify_index_miss(&self, subject_id: &str) -> LifecycleError {
        let view = self
            .ledger_call(Step::LedgerRead, subject_id, self.ledger.get_on_chain_did(subject_id))
            .await;

        match view {
            Ok(Some(view)) if !view.revoked => {
                warn!("subject {}: {}", subject_id, DiscrepancyKind::MissingFromIndex);
                LifecycleError::Inconsistent(Box::new(Discrepancy {
                    subject_id: subject_id.to_string(),
                    kind: DiscrepancyKind::MissingFromIndex,
                    index: None,
                    ledger: Some(view),
                }))
            }
            Ok(_) => LifecycleError::DidNotFound(subject_id.to_string()),
            Err(e) => {
                warn!("could not cross-check index miss for {}: {}", subject_id, e);
                LifecycleError::DidNotFound(subject_id.to_string())
            }
        }
    }

    /// Index record matching the ledger's view of the subject.
    async fn record_from_ledger(&self, subject_id: &str, view: &OnChainDIDView) -> LifecycleResult<DIDRecord> {
        let cid = match &view.document_cid {
            Some(cid) => cid.clone(),
            None => match self.registration_progress(subject_id, &view.did) {
                Some((cid, _)) => cid,
                // The document is a pure function of did and subject, so
                // publishing it again yields the CID the ledger entry refers to.
                None => self.publish(subject_id, &view.did).await?,
            },
        };
        Ok(DIDRecord::new(subject_id, &view.did, &cid, Utc::now()))
    }

    fn registration_progress(&self, subject_id: &str, did: &str) -> Option<(String, Option<TxReceipt>)> {
        match self.progress.lock().get(subject_id) {
            Some(Progress::Registering {
                did: pending_did,
                document_cid,
                receipt,
            }) if pending_did == did => Some((document_cid.clone(), receipt.clone())),
            _ => None,
        }
    }

    fn revocation_progress(&self, subject_id: &str, record_id: &str) -> Option<TxReceipt> {
        match self.progress.lock().get(subject_id) {
            Some(Progress::Revoking {
                record_id: pending_id,
                receipt,
            }) if pending_id == record_id => Some(receipt.clone()),
            _ => None,
        }
    }

    fn save_progress(&self, subject_id: &str, progress: Progress) {
        self.progress.lock().insert(subject_id.to_string(), progress);
    }

    fn clear_progress(&self, subject_id: &str) {
        self.progress.lock().remove(subject_id);
    }

    fn clear_registration_progress(&self, subject_id: &str) {
        let mut progress = self.progress.lock();
        if let Some(Progress::Registering { .. }) = progress.get(subject_id) {
            progress.remove(subject_id);
        }
    }
}
