//! SQLite group store.
//!
//! ```sql
//! group_state(group_id TEXT PRIMARY KEY, version INTEGER, state BLOB, updated_at INTEGER)
//! ```
//!
//! The upsert only replaces a row whose stored version is older than the
//! incoming one; zero affected rows means a newer snapshot is already
//! stored.

use super::{GroupStore, StoreError, StoreResult};
use crate::clock::{Clock, SystemClock};
use crate::group::{GroupId, GroupState};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS group_state (
    group_id TEXT PRIMARY KEY NOT NULL,
    version INTEGER NOT NULL,
    state BLOB NOT NULL,
    updated_at INTEGER NOT NULL
)";

const UPSERT: &str = "INSERT INTO group_state (group_id, version, state, updated_at)
VALUES (?1, ?2, ?3, ?4)
ON CONFLICT(group_id) DO UPDATE SET
    version = excluded.version,
    state = excluded.state,
    updated_at = excluded.updated_at
WHERE group_state.version < excluded.version";

#[derive(Debug, FromRow)]
struct SnapshotRow {
    version: i64,
    state: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct SqliteGroupStore {
    pool: SqlitePool,
}

impl SqliteGroupStore {
    /// Open (creating if needed) the database at `url`, e.g.
    /// `sqlite:///var/lib/chama/chama.db`.
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// Open the database file at `path`.
    pub async fn open(path: &Path, max_connections: u32) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// Private in-memory database. A single connection keeps every query on
    /// the same database.
    pub async fn in_memory() -> StoreResult<Self> {
        Self::connect("sqlite::memory:", 1).await
    }

    async fn with_pool(pool: SqlitePool) -> StoreResult<Self> {
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl GroupStore for SqliteGroupStore {
    async fn load(&self, group: GroupId) -> StoreResult<Option<GroupState>> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            "SELECT version, state FROM group_state WHERE group_id = ?1",
        )
        .bind(group.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let state = GroupState::from_bytes(&row.state)?;
                if i64::try_from(state.version).ok() != Some(row.version) {
                    return Err(StoreError::Corrupt(format!(
                        "group {} row version {} does not match snapshot version {}",
                        group, row.version, state.version
                    )));
                }
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, state: &GroupState) -> StoreResult<()> {
        let version = i64::try_from(state.version)
            .map_err(|_| StoreError::Corrupt(format!("version {} out of range", state.version)))?;
        let updated_at = i64::try_from(SystemClock.now_secs()).unwrap_or(i64::MAX);
        let bytes = state.to_bytes()?;

        let result = sqlx::query(UPSERT)
            .bind(state.id().to_string())
            .bind(version)
            .bind(bytes)
            .bind(updated_at)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::VersionConflict {
                group: state.id(),
                attempted: state.version,
            });
        }
        debug!(group = %state.id(), version = state.version, "snapshot stored");
        Ok(())
    }

    async fn list_ids(&self) -> StoreResult<Vec<GroupId>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT group_id FROM group_state ORDER BY group_id")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|(id,)| {
                GroupId::from_str(&id)
                    .map_err(|e| StoreError::Corrupt(format!("bad group id {:?}: {}", id, e)))
            })
            .collect()
    }
}
