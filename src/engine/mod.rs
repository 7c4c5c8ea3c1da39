pub mod progress;
pub mod quiz;
pub mod stats;
pub mod streaks;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::LimitsConfig;
use crate::store::{Store, StoreError};

/// Domain layer over the store: progress recording, quiz session lifecycle,
/// streak aggregation and stats reads. One instance is shared across request
/// handlers.
///
/// Mutating operations serialize per user: the per-user mutex is held across
/// each read-modify-write so concurrent attempts on the same progress record
/// (or the same aggregate counters) cannot interleave. Atomicity of the
/// writes themselves comes from multi-tree sled transactions in the store
/// layer; the lock only orders the read phase against other writers.
pub struct Engine {
    store: Arc<Store>,
    limits: LimitsConfig,
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Engine {
    pub fn new(limits: LimitsConfig, store: Arc<Store>) -> Self {
        Self {
            store,
            limits,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    pub(crate) fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .user_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Full account-deletion cascade: progress records, due-index entries,
    /// quiz sessions with their answers, streak rows, then the user row.
    pub fn delete_user_data(&self, user_id: &str) -> Result<(), StoreError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        self.store.require_user(user_id)?;
        let progress = self.store.delete_user_progress(user_id)?;
        let sessions = self.store.delete_user_sessions(user_id)?;
        let streaks = self.store.delete_user_streaks(user_id)?;
        self.store
            .users
            .remove(crate::store::keys::user_key(user_id)?.as_bytes())?;

        tracing::info!(
            user_id,
            progress,
            sessions,
            streaks,
            "Deleted user learning data"
        );
        Ok(())
    }
}
