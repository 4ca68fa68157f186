//! In-memory group store.
//!
//! Keeps encoded snapshots rather than live values so every load goes
//! through the same CBOR path as the durable store.

use super::{GroupStore, StoreError, StoreResult};
use crate::group::{GroupId, GroupState};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone, Default)]
pub struct MemoryGroupStore {
    records: Arc<Mutex<HashMap<GroupId, (u64, Vec<u8>)>>>,
    fail_next_save: Arc<AtomicBool>,
}

impl MemoryGroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `save` fail with a database error (for test setup).
    pub fn fail_next_save(&self) {
        self.fail_next_save.store(true, Ordering::SeqCst);
    }

    /// Stored version of a group.
    pub async fn version(&self, group: GroupId) -> Option<u64> {
        self.records.lock().await.get(&group).map(|(v, _)| *v)
    }
}

#[async_trait]
impl GroupStore for MemoryGroupStore {
    async fn load(&self, group: GroupId) -> StoreResult<Option<GroupState>> {
        let records = self.records.lock().await;
        match records.get(&group) {
            Some((_, bytes)) => Ok(Some(GroupState::from_bytes(bytes)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, state: &GroupState) -> StoreResult<()> {
        if self.fail_next_save.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Database("injected failure".to_string()));
        }

        let bytes = state.to_bytes()?;
        let mut records = self.records.lock().await;
        if let Some((stored, _)) = records.get(&state.id()) {
            if *stored >= state.version {
                return Err(StoreError::VersionConflict {
                    group: state.id(),
                    attempted: state.version,
                });
            }
        }
        records.insert(state.id(), (state.version, bytes));
        Ok(())
    }

    async fn list_ids(&self) -> StoreResult<Vec<GroupId>> {
        let mut ids: Vec<GroupId> = self.records.lock().await.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}
