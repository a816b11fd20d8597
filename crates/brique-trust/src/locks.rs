//! Per-record exclusive access.
//!
//! Ingest reads the stored version, decides, and writes. Two peers delivering
//! versions of the same record at once must not interleave those steps, while
//! ingests of different records proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

use brique_core::RecordId;

type Slot = Arc<tokio::sync::Mutex<()>>;

/// Table of async mutexes keyed by record id.
///
/// Entries are created on demand and removed when the last holder releases.
#[derive(Debug, Default)]
pub struct KeyLocks {
    slots: Mutex<HashMap<RecordId, Slot>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: RecordId) -> KeyGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(key).or_default())
        };
        let guard = slot.lock_owned().await;
        KeyGuard {
            locks: self,
            key,
            guard: Some(guard),
        }
    }

    /// Number of records currently locked or awaited.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, key: &RecordId) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get(key) {
            // Only the table holds it: nobody is waiting.
            if Arc::strong_count(slot) == 1 {
                slots.remove(key);
            }
        }
    }
}

/// Exclusive access to one record id; released on drop.
pub struct KeyGuard<'a> {
    locks: &'a KeyLocks,
    key: RecordId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release(&self.key);
    }
}
