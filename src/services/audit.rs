// src/services/audit.rs
//! Audit trail dispatch.
//!
//! Audit writes run off the request path on a single worker task, so events
//! reach the sink in the order they were recorded. A failed write never fails
//! the lifecycle operation that produced it, but it is always logged, counted
//! and forwarded to the failure channel when one is attached.

use crate::models::audit::AuditEvent;
use crate::storage::local_index::IndexError;
use async_trait::async_trait;
use log::error;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit store error: {0}")]
    Store(#[from] IndexError),

    #[error("audit write timed out after {0:?}")]
    Timeout(Duration),

    #[error("audit sink rejected event: {0}")]
    Rejected(String),
}

/// Durable append-only destination for audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

/// An audit event that could not be written, with the reason.
#[derive(Debug, Clone)]
pub struct AuditFailure {
    pub event: AuditEvent,
    pub reason: String,
}

enum Command {
    Append(AuditEvent),
    Flush(oneshot::Sender<()>),
}

/// State shared between the trail handle and its worker.
struct Reporting {
    failures: Mutex<Option<UnboundedSender<AuditFailure>>>,
    failure_count: AtomicU64,
}

impl Reporting {
    fn report(&self, event: AuditEvent, e: AuditError) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        error!("audit event {} for {} was not recorded: {}", event.action, event.did, e);

        let failures = self.failures.lock().clone();
        if let Some(tx) = failures {
            let reason = e.to_string();
            if tx.send(AuditFailure { event, reason }).is_err() {
                error!("audit failure channel is closed");
            }
        }
    }
}

/// Fire-and-forget front end over an [`AuditSink`].
///
/// Must be created inside a tokio runtime; the worker lives until the trail
/// is dropped.
pub struct AuditTrail {
    queue: UnboundedSender<Command>,
    reporting: Arc<Reporting>,
}

impl AuditTrail {
    pub fn new(sink: Arc<dyn AuditSink>, timeout: Duration) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        let reporting = Arc::new(Reporting {
            failures: Mutex::new(None),
            failure_count: AtomicU64::new(0),
        });
        tokio::spawn(Self::drain(sink, timeout, reporting.clone(), rx));
        AuditTrail { queue, reporting }
    }

    /// Forwards every failed write to `tx`.
    pub fn with_failure_channel(self, tx: UnboundedSender<AuditFailure>) -> Self {
        *self.reporting.failures.lock() = Some(tx);
        self
    }

    /// Queues `event` for writing and returns immediately.
    pub fn record(&self, event: AuditEvent) {
        if let Err(mpsc::error::SendError(Command::Append(event))) = self.queue.send(Command::Append(event)) {
            self.reporting
                .report(event, AuditError::Rejected("audit worker has stopped".into()));
        }
    }

    /// Waits until every event recorded so far has been written or reported.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.queue.send(Command::Flush(done)).is_err() || wait.await.is_err() {
            error!("audit worker stopped before the flush completed");
        }
    }

    /// Number of events that failed to be written so far.
    pub fn failure_count(&self) -> u64 {
        self.reporting.failure_count.load(Ordering::Relaxed)
    }

    async fn drain(
        sink: Arc<dyn AuditSink>,
        timeout: Duration,
        reporting: Arc<Reporting>,
        mut rx: UnboundedReceiver<Command>,
    ) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Append(event) => {
                    let outcome = match tokio::time::timeout(timeout, sink.append(&event)).await {
                        Ok(result) => result,
                        Err(_) => Err(AuditError::Timeout(timeout)),
                    };
                    if let Err(e) = outcome {
                        reporting.report(event, e);
                    }
                }
                Command::Flush(done) => {
                    // The flusher may have stopped waiting
                    let _ = done.send(());
                }
            }
        }
    }
}
