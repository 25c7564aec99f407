//! Per-owner run locks
//!
//! A sync pass for an owner holds that owner's lock for its whole duration.
//! Acquisition never waits: a second caller is told the run is in flight and
//! returns immediately.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Registry = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Registry of run locks keyed by owner id
///
/// An owner's entry lives only while a run for it holds the lock.
#[derive(Debug, Default, Clone)]
pub struct OwnerLocks {
    locks: Registry,
}

/// Proof that a run for `owner_id` is in progress; released on drop
#[derive(Debug)]
pub struct OwnerGuard {
    owner_id: String,
    registry: Registry,
    guard: Option<OwnedMutexGuard<()>>,
}

impl OwnerGuard {
    /// Owner this guard belongs to
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }
}

impl Drop for OwnerGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        // Remove the entry once nothing but the map refers to it
        if locks
            .get(&self.owner_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.owner_id);
        }
    }
}

impl OwnerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to start a run for `owner_id`
    ///
    /// Returns `None` if a run for the same owner is already in progress.
    pub fn try_acquire(&self, owner_id: &str) -> Option<OwnerGuard> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(owner_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        lock.try_lock_owned().ok().map(|guard| OwnerGuard {
            owner_id: owner_id.to_string(),
            registry: self.locks.clone(),
            guard: Some(guard),
        })
    }

    /// Whether a run for `owner_id` is currently in progress
    pub fn is_running(&self, owner_id: &str) -> bool {
        let locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .get(owner_id)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }

    /// Number of owners with a lock entry
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
