use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Single-flight guard: at most one sync per scope runs at a time.
#[derive(Debug, Clone, Default)]
pub struct SyncCoordinator {
    running: Arc<Mutex<HashSet<String>>>,
}

impl SyncCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn running(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set is always left consistent, so a poisoned lock is still usable.
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claims `scope`, or returns `None` when a sync for it is already running.
    /// The claim is released when the permit is dropped.
    pub fn try_begin(&self, scope: &str) -> Option<SyncPermit> {
        if !self.running().insert(scope.to_string()) {
            return None;
        }
        debug!(scope, "sync scope claimed");
        Some(SyncPermit {
            scope: scope.to_string(),
            coordinator: self.clone(),
        })
    }

    pub fn is_running(&self, scope: &str) -> bool {
        self.running().contains(scope)
    }
}

#[derive(Debug)]
pub struct SyncPermit {
    scope: String,
    coordinator: SyncCoordinator,
}

impl Drop for SyncPermit {
    fn drop(&mut self) {
        self.coordinator.running().remove(&self.scope);
        debug!(scope = %self.scope, "sync scope released");
    }
}
