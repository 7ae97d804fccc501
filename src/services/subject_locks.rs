// src/services/subject_locks.rs
//! Per-subject mutual exclusion.
//!
//! Each subject id maps to its own async mutex. Entries hold only weak
//! references and are pruned once no operation holds or waits on them, so
//! the map stays proportional to in-flight work.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Held for the duration of one lifecycle transition on a subject.
pub struct SubjectGuard {
    _guard: OwnedMutexGuard<()>,
}

#[derive(Default)]
pub struct SubjectLocks {
    locks: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

impl SubjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other operation holds `subject_id`, then takes it.
    pub async fn acquire(&self, subject_id: &str) -> SubjectGuard {
        let lock = {
            let mut locks = self.locks.lock();
            match locks.get(subject_id).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    locks.retain(|_, weak| weak.strong_count() > 0);
                    let lock = Arc::new(AsyncMutex::new(()));
                    locks.insert(subject_id.to_string(), Arc::downgrade(&lock));
                    lock
                }
            }
        };

        SubjectGuard {
            _guard: lock.lock_owned().await,
        }
    }

    /// Number of subjects with a live lock entry.
    #[cfg(test)]
    pub fn tracked(&self) -> usize {
        self.locks
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
