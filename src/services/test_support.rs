// src/services/test_support.rs
//! In-memory collaborators with call counters and injectable failures.

use crate::blockchain::ledger::{Ledger, LedgerError, OnChainDIDView, TxReceipt};
use crate::config::LifecycleSettings;
use crate::models::audit::AuditEvent;
use crate::models::did::{DIDDocument, DIDRecord};
use crate::models::subject::{Caller, Subject};
use crate::services::audit::{AuditError, AuditSink, AuditTrail};
use crate::services::did_coordinator::DidCoordinator;
use crate::storage::document_store::{DocumentStore, StorageError};
use crate::storage::local_index::{IndexError, LocalIndex};
use crate::storage::subjects::SubjectDirectory;
use crate::utils::crypto::hash_data;
use crate::utils::serialization::to_canonical_json;
use async_trait::async_trait;
use ethers::utils::hex;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const ISSUER: &str = "0xABC";

pub fn issuer_caller() -> Caller {
    Caller::new("admin", Some(ISSUER.to_string()))
}

async fn pause(delay: &Mutex<Duration>) {
    let delay = *delay.lock();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[derive(Default)]
pub struct MockLedger {
    issuers: Mutex<HashSet<String>>,
    dids: Mutex<HashMap<String, OnChainDIDView>>,
    register_calls: AtomicUsize,
    revoke_calls: AtomicUsize,
    issuer_checks: AtomicUsize,
    fail_register: AtomicBool,
    fail_revoke: AtomicBool,
    fail_reads: AtomicBool,
    delay: Mutex<Duration>,
}

impl MockLedger {
    pub fn with_issuer(address: &str) -> Self {
        let ledger = MockLedger::default();
        ledger.add_issuer(address);
        ledger
    }

    pub fn add_issuer(&self, address: &str) {
        self.issuers.lock().insert(address.to_lowercase());
    }

    pub fn remove_issuer(&self, address: &str) {
        self.issuers.lock().remove(&address.to_lowercase());
    }

    pub fn set_view(&self, subject_id: &str, view: Option<OnChainDIDView>) {
        let mut dids = self.dids.lock();
        match view {
            Some(view) => dids.insert(subject_id.to_string(), view),
            None => dids.remove(subject_id),
        };
    }

    pub fn view(&self, subject_id: &str) -> Option<OnChainDIDView> {
        self.dids.lock().get(subject_id).cloned()
    }

    pub fn fail_register(&self, fail: bool) {
        self.fail_register.store(fail, Ordering::SeqCst);
    }

    pub fn fail_revoke(&self, fail: bool) {
        self.fail_revoke.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn revoke_calls(&self) -> usize {
        self.revoke_calls.load(Ordering::SeqCst)
    }

    pub fn issuer_checks(&self) -> usize {
        self.issuer_checks.load(Ordering::SeqCst)
    }

    fn receipt(n: usize) -> TxReceipt {
        TxReceipt {
            tx_hash: format!("0x{:064x}", n),
            block_number: Some(n as u64),
        }
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn is_on_chain_issuer(&self, address: &str) -> Result<bool, LedgerError> {
        self.issuer_checks.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(LedgerError::Transport("node offline".into()));
        }
        Ok(self.issuers.lock().contains(&address.to_lowercase()))
    }

    async fn register_on_chain(&self, subject_id: &str, did: &str) -> Result<TxReceipt, LedgerError> {
        pause(&self.delay).await;
        let n = self.register_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(LedgerError::Rejected("nonce too low".into()));
        }
        self.set_view(
            subject_id,
            Some(OnChainDIDView {
                did: did.to_string(),
                revoked: false,
                document_cid: None,
            }),
        );
        Ok(Self::receipt(n))
    }

    async fn revoke_on_chain(&self, subject_id: &str) -> Result<TxReceipt, LedgerError> {
        pause(&self.delay).await;
        let n = self.revoke_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_revoke.load(Ordering::SeqCst) {
            return Err(LedgerError::Rejected("out of gas".into()));
        }
        let receipt = Self::receipt(1000 + n);
        match self.dids.lock().get_mut(subject_id) {
            Some(view) if !view.revoked => {
                view.revoked = true;
                Ok(receipt)
            }
            _ => Err(LedgerError::Reverted(receipt.tx_hash)),
        }
    }

    async fn get_on_chain_did(&self, subject_id: &str) -> Result<Option<OnChainDIDView>, LedgerError> {
        pause(&self.delay).await;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(LedgerError::Transport("node offline".into()));
        }
        Ok(self.view(subject_id))
    }
}

#[derive(Default)]
pub struct MockDocumentStore {
    published: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
    delay: Mutex<Duration>,
}

impl MockDocumentStore {
    /// CID the mock assigns to `document`.
    pub fn cid_for(document: &DIDDocument) -> String {
        let bytes = to_canonical_json(document).unwrap();
        format!("bafy{}", &hex::encode(hash_data(&bytes))[..16])
    }

    pub fn publish_calls(&self) -> usize {
        self.published.lock().len()
    }

    pub fn labels(&self) -> Vec<String> {
        self.published.lock().iter().map(|(label, _)| label.clone()).collect()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }
}

#[async_trait]
impl DocumentStore for MockDocumentStore {
    async fn publish(&self, document: &DIDDocument, label: &str) -> Result<String, StorageError> {
        pause(&self.delay).await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("gateway 502".into()));
        }
        let cid = Self::cid_for(document);
        self.published.lock().push((label.to_string(), cid.clone()));
        Ok(cid)
    }
}

/// HashMap-backed index keyed by subject.
#[derive(Default)]
pub struct MemoryIndex {
    records: Mutex<HashMap<String, DIDRecord>>,
    create_calls: AtomicUsize,
    fail_create: AtomicBool,
    fail_delete: AtomicBool,
}

impl MemoryIndex {
    pub fn insert(&self, record: DIDRecord) {
        self.records.lock().insert(record.subject_id.clone(), record);
    }

    pub fn get(&self, subject_id: &str) -> Option<DIDRecord> {
        self.records.lock().get(subject_id).cloned()
    }

    pub fn count(&self) -> usize {
        self.records.lock().len()
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LocalIndex for MemoryIndex {
    async fn find(&self, subject_id: &str) -> Result<Option<DIDRecord>, IndexError> {
        Ok(self.get(subject_id))
    }

    async fn create(&self, record: DIDRecord) -> Result<DIDRecord, IndexError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(IndexError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut records = self.records.lock();
        if records.contains_key(&record.subject_id) {
            return Err(IndexError::Conflict(record.subject_id));
        }
        records.insert(record.subject_id.clone(), record.clone());
        Ok(record)
    }

    async fn delete(&self, record_id: &str) -> Result<(), IndexError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(IndexError::Database(sqlx::Error::PoolTimedOut));
        }
        self.records.lock().retain(|_, record| record.id != record_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySubjects {
    subjects: Mutex<HashMap<String, Subject>>,
}

impl MemorySubjects {
    pub fn with(ids: &[&str]) -> Self {
        let subjects = MemorySubjects::default();
        for id in ids {
            subjects.subjects.lock().insert(id.to_string(), Subject::new(*id));
        }
        subjects
    }
}

#[async_trait]
impl SubjectDirectory for MemorySubjects {
    async fn find_subject(&self, subject_id: &str) -> Result<Option<Subject>, IndexError> {
        Ok(self.subjects.lock().get(subject_id).cloned())
    }

    async fn upsert_subject(&self, subject: &Subject) -> Result<(), IndexError> {
        self.subjects.lock().insert(subject.id.clone(), subject.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAuditLog {
    events: Mutex<Vec<AuditEvent>>,
    fail: AtomicBool,
    delay: Mutex<Duration>,
}

impl MemoryAuditLog {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }
}

#[async_trait]
impl AuditSink for MemoryAuditLog {
    async fn append(&self, event: &AuditEvent) -> Result<(), AuditError> {
        pause(&self.delay).await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(AuditError::Rejected("audit table locked".into()));
        }
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// A coordinator wired to mocks, with handles kept for inspection.
pub struct Harness {
    pub subjects: Arc<MemorySubjects>,
    pub ledger: Arc<MockLedger>,
    pub documents: Arc<MockDocumentStore>,
    pub index: Arc<MemoryIndex>,
    pub audit_log: Arc<MemoryAuditLog>,
    pub coordinator: Arc<DidCoordinator>,
}

impl Harness {
    pub fn new(subjects: &[&str]) -> Self {
        Self::with_settings(subjects, LifecycleSettings::default())
    }

    pub fn with_settings(subjects: &[&str], settings: LifecycleSettings) -> Self {
        let subjects = Arc::new(MemorySubjects::with(subjects));
        let ledger = Arc::new(MockLedger::with_issuer(ISSUER));
        let documents = Arc::new(MockDocumentStore::default());
        let index = Arc::new(MemoryIndex::default());
        let audit_log = Arc::new(MemoryAuditLog::default());
        let audit = AuditTrail::new(audit_log.clone(), settings.audit_timeout);

        let coordinator = Arc::new(DidCoordinator::new(
            subjects.clone(),
            ledger.clone(),
            documents.clone(),
            index.clone(),
            audit,
            settings,
        ));

        Harness {
            subjects,
            ledger,
            documents,
            index,
            audit_log,
            coordinator,
        }
    }
}
