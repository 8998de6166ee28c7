//! Per-workspace reader/writer locks
//!
//! Builds take a key's exclusive lock so that two builds of the same
//! submission never write the source or the artifacts at the same time. Runs
//! take the shared lock so that any number of runs proceed together but never
//! observe a half-finished build.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::trace;

use crate::workspace::SubmissionKey;

type LockTable = Arc<Mutex<HashMap<SubmissionKey, Arc<RwLock<()>>>>>;

/// Lock table keyed by submission
///
/// Entries exist only while at least one guard for the key is alive.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceLocks {
    table: LockTable,
}

#[derive(Debug)]
enum Held {
    Exclusive { _guard: OwnedRwLockWriteGuard<()> },
    Shared { _guard: OwnedRwLockReadGuard<()> },
}

/// Guard over one workspace, released on drop
#[derive(Debug)]
pub struct WorkspaceGuard {
    key: SubmissionKey,
    table: LockTable,
    held: Option<Held>,
}

impl WorkspaceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a workspace
    pub async fn exclusive(&self, key: &SubmissionKey) -> WorkspaceGuard {
        let lock = self.entry(key);
        let held = Held::Exclusive {
            _guard: lock.write_owned().await,
        };
        trace!(%key, "acquired exclusive workspace lock");
        self.guard(key, held)
    }

    /// Wait for shared access to a workspace
    pub async fn shared(&self, key: &SubmissionKey) -> WorkspaceGuard {
        let lock = self.entry(key);
        let held = Held::Shared {
            _guard: lock.read_owned().await,
        };
        trace!(%key, "acquired shared workspace lock");
        self.guard(key, held)
    }

    /// Number of keys with a live lock entry
    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, key: &SubmissionKey) -> Arc<RwLock<()>> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.entry(key.clone()).or_default().clone()
    }

    fn guard(&self, key: &SubmissionKey, held: Held) -> WorkspaceGuard {
        WorkspaceGuard {
            key: key.clone(),
            table: self.table.clone(),
            held: Some(held),
        }
    }
}

impl WorkspaceGuard {
    pub fn key(&self) -> &SubmissionKey {
        &self.key
    }

    pub fn is_exclusive(&self) -> bool {
        matches!(self.held, Some(Held::Exclusive { .. }))
    }
}

impl Drop for WorkspaceGuard {
    fn drop(&mut self) {
        // Release the lock before checking whether anyone else still holds the entry
        self.held.take();

        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = table.get(&self.key)
            && Arc::strong_count(lock) == 1
        {
            table.remove(&self.key);
            trace!(key = %self.key, "pruned workspace lock");
        }
    }
}
