//! Per-instance advisory locks.
//!
//! Lifecycle calls for the same instance id are serialized; calls for different
//! instances never contend. Entries are dropped once nobody holds or waits on them.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct InstanceLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Held for the duration of one lifecycle call
#[derive(Debug)]
pub struct InstanceGuard<'a> {
    locks: &'a InstanceLocks,
    instance_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl InstanceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, instance_id: &str) -> InstanceGuard<'_> {
        let mutex = self.locks.entry(instance_id.to_string()).or_default().clone();
        let guard = mutex.lock_owned().await;
        InstanceGuard {
            locks: self,
            instance_id: instance_id.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of instances with a live lock entry
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for InstanceGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // Only the map's own reference left: nobody holds or waits on this lock.
        self.locks
            .locks
            .remove_if(&self.instance_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
