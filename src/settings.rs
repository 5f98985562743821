//! Singleton system-settings access.
//!
//! The completion flag is the one read in the system that is exempt from
//! the isolation guard: it must be answerable before any tenant exists.
//! "No row" and "relation missing" both read as not-completed rather than
//! an error — a fresh project has neither the row nor, possibly, the table.

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::store::{decode, tables, Query, SharedStore, StoreError};
use crate::types::SystemSettings;

/// Primary key of the singleton settings row.
pub const SETTINGS_ID: i64 = 1;

/// Whether provisioning has ever completed on this system.
pub async fn setup_complete(store: &SharedStore) -> Result<bool, StoreError> {
    match store
        .select_single(
            tables::SYSTEM_SETTINGS,
            Query::new().eq("id", SETTINGS_ID),
        )
        .await
    {
        Ok(row) => {
            let settings: SystemSettings = decode(row)?;
            Ok(settings.setup_complete)
        }
        Err(e) if e.is_missing() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Mark setup complete, recording timestamp and actor.
///
/// Update first; if the row is absent (or the update call itself fails),
/// fall back to an upsert by primary key. Only both failing is an error.
pub async fn mark_setup_complete(store: &SharedStore, actor: Uuid) -> Result<(), StoreError> {
    let patch = json!({
        "setup_complete": true,
        "setup_completed_at": Utc::now(),
        "setup_completed_by": actor,
    });

    match store
        .update(
            tables::SYSTEM_SETTINGS,
            Query::new().eq("id", SETTINGS_ID),
            patch.clone(),
        )
        .await
    {
        Ok(rows) if !rows.is_empty() => return Ok(()),
        Ok(_) => {}
        Err(e) => {
            log::warn!("settings update failed, falling back to upsert: {e}");
        }
    }

    let mut row = patch;
    row["id"] = json!(SETTINGS_ID);
    store.upsert(tables::SYSTEM_SETTINGS, row).await.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{MemoryStore, StoreOp};
    use std::sync::Arc;

    fn shared() -> SharedStore {
        Arc::new(MemoryStore::new())
    }

    #[tokio::test]
    async fn test_no_row_reads_as_incomplete() {
        let store = shared();
        assert!(!setup_complete(&store).await.unwrap());
    }

    #[tokio::test]
    async fn test_mark_creates_row_when_absent() {
        let store = shared();
        let actor = Uuid::new_v4();
        mark_setup_complete(&store, actor).await.unwrap();
        assert!(setup_complete(&store).await.unwrap());
    }

    #[tokio::test]
    async fn test_mark_updates_existing_row() {
        let memory = Arc::new(MemoryStore::new());
        memory.seed(
            tables::SYSTEM_SETTINGS,
            vec![json!({"id": 1, "setup_complete": false})],
        );
        let store: SharedStore = memory.clone();
        mark_setup_complete(&store, Uuid::new_v4()).await.unwrap();
        assert!(setup_complete(&store).await.unwrap());
        // Still a singleton
        assert_eq!(memory.rows(tables::SYSTEM_SETTINGS).len(), 1);
    }

    #[tokio::test]
    async fn test_update_failure_falls_back_to_upsert() {
        let memory = Arc::new(MemoryStore::new());
        memory.fail_next(tables::SYSTEM_SETTINGS, StoreOp::Update, "injected");
        let store: SharedStore = memory.clone();
        mark_setup_complete(&store, Uuid::new_v4()).await.unwrap();
        assert!(setup_complete(&store).await.unwrap());
    }

    #[tokio::test]
    async fn test_both_paths_failing_is_an_error() {
        let memory = Arc::new(MemoryStore::new());
        memory.fail_next(tables::SYSTEM_SETTINGS, StoreOp::Update, "injected");
        memory.fail_next(tables::SYSTEM_SETTINGS, StoreOp::Upsert, "injected");
        let store: SharedStore = memory.clone();
        assert!(mark_setup_complete(&store, Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn test_transient_read_error_propagates() {
        let memory = Arc::new(MemoryStore::new());
        memory.fail_next(tables::SYSTEM_SETTINGS, StoreOp::Select, "injected");
        let store: SharedStore = memory.clone();
        assert!(setup_complete(&store).await.is_err());
    }
}
