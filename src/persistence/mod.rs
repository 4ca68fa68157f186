//! Durable storage for group state.
//!
//! One record per group, keyed by group id. Each record is the CBOR snapshot
//! of a [`GroupState`] plus its version. Saves are conditional: a snapshot
//! is only written when its version is newer than the stored one, so a
//! stale writer can never overwrite a newer state.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryGroupStore;
pub use sqlite::SqliteGroupStore;

use crate::group::{GroupId, GroupState};
use crate::serialization::SerializationError;
use async_trait::async_trait;

/// Storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Snapshot encoding error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Version conflict for group {group}: stored version is not older than {attempted}")]
    VersionConflict { group: GroupId, attempted: u64 },

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Storage backend for group snapshots.
#[async_trait]
pub trait GroupStore: Send + Sync {
    /// Load the latest snapshot of a group, if any.
    async fn load(&self, group: GroupId) -> StoreResult<Option<GroupState>>;

    /// Persist `state`. Fails with `VersionConflict` unless `state.version`
    /// is greater than the stored version.
    async fn save(&self, state: &GroupState) -> StoreResult<()>;

    /// Ids of every stored group.
    async fn list_ids(&self) -> StoreResult<Vec<GroupId>>;

    /// Every stored group.
    async fn load_all(&self) -> StoreResult<Vec<GroupState>> {
        let mut states = Vec::new();
        for id in self.list_ids().await? {
            if let Some(state) = self.load(id).await? {
                states.push(state);
            }
        }
        Ok(states)
    }
}
