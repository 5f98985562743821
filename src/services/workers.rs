//! Worker registry — tenant-scoped CRUD.
//!
//! Workers are archived instead of deleted so historical attendance keeps
//! resolving a name and rate.

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::error::CoreError;
use crate::guard;
use crate::scope::ScopeResolver;
use crate::store::{decode, decode_rows, tables, SharedStore};
use crate::types::Worker;

#[derive(Debug, Clone)]
pub struct NewWorker {
    pub name: String,
    pub trade: Option<String>,
    pub daily_rate: f64,
}

/// Active workers for the current tenant, name-ordered. Empty when no
/// tenant is selected.
pub async fn list_workers(
    store: &SharedStore,
    resolver: &ScopeResolver,
) -> Result<Vec<Worker>, CoreError> {
    let Some(scope) = guard::read_tenant_scope(resolver) else {
        return Ok(Vec::new());
    };
    let rows = store
        .select(
            tables::WORKERS,
            guard::tenant_query(scope)
                .eq("archived", false)
                .order_by("name", false),
        )
        .await?;
    Ok(decode_rows(rows)?)
}

pub async fn create_worker(
    store: &SharedStore,
    resolver: &ScopeResolver,
    input: NewWorker,
) -> Result<Worker, CoreError> {
    let scope = guard::tenant_scope(resolver)?;

    let name = input.name.trim();
    if name.is_empty() {
        return Err(CoreError::Validation("Worker name is required".to_string()));
    }
    if input.daily_rate < 0.0 {
        return Err(CoreError::Validation(
            "Daily rate cannot be negative".to_string(),
        ));
    }

    let mut row = json!({
        "name": name,
        "trade": input.trade,
        "daily_rate": input.daily_rate,
        "archived": false,
        "created_at": Utc::now(),
    });
    guard::stamp_tenant(&mut row, scope);
    Ok(decode(store.insert(tables::WORKERS, row).await?)?)
}

pub async fn update_worker_rate(
    store: &SharedStore,
    resolver: &ScopeResolver,
    worker_id: Uuid,
    daily_rate: f64,
) -> Result<Worker, CoreError> {
    let scope = guard::tenant_scope(resolver)?;
    if daily_rate < 0.0 {
        return Err(CoreError::Validation(
            "Daily rate cannot be negative".to_string(),
        ));
    }
    let mut updated = store
        .update(
            tables::WORKERS,
            guard::tenant_query(scope).eq("id", worker_id),
            json!({ "daily_rate": daily_rate }),
        )
        .await?;
    match updated.pop() {
        Some(row) => Ok(decode(row)?),
        None => Err(CoreError::Validation(format!(
            "Worker not found: {worker_id}"
        ))),
    }
}

pub async fn archive_worker(
    store: &SharedStore,
    resolver: &ScopeResolver,
    worker_id: Uuid,
) -> Result<(), CoreError> {
    let scope = guard::tenant_scope(resolver)?;
    let updated = store
        .update(
            tables::WORKERS,
            guard::tenant_query(scope).eq("id", worker_id),
            json!({ "archived": true }),
        )
        .await?;
    if updated.is_empty() {
        return Err(CoreError::Validation(format!(
            "Worker not found: {worker_id}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use std::sync::Arc;

    fn fixture() -> (Arc<MemoryStore>, SharedStore, ScopeResolver) {
        let memory = Arc::new(MemoryStore::new());
        let store: SharedStore = memory.clone();
        (memory, store, ScopeResolver::new())
    }

    fn worker(name: &str, rate: f64) -> NewWorker {
        NewWorker {
            name: name.to_string(),
            trade: None,
            daily_rate: rate,
        }
    }

    #[tokio::test]
    async fn test_read_without_tenant_is_empty() {
        let (_, store, resolver) = fixture();
        assert!(list_workers(&store, &resolver).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_without_tenant_is_rejected() {
        let (memory, store, resolver) = fixture();
        let err = create_worker(&store, &resolver, worker("Ali", 300.0))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NO_TENANT_ID");
        assert!(memory.rows(tables::WORKERS).is_empty());
    }

    #[tokio::test]
    async fn test_rows_are_stamped_with_resolved_tenant() {
        let (memory, store, resolver) = fixture();
        let tenant = Uuid::new_v4();
        resolver.set_tenant(tenant);
        let created = create_worker(&store, &resolver, worker("Ali", 300.0))
            .await
            .unwrap();
        assert_eq!(created.tenant_id, tenant);
        assert_eq!(
            memory.rows(tables::WORKERS)[0]["tenant_id"],
            tenant.to_string()
        );
    }

    #[tokio::test]
    async fn test_reads_are_tenant_isolated() {
        let (_, store, resolver) = fixture();
        let tenant_a = Uuid::new_v4();
        let tenant_b = Uuid::new_v4();

        resolver.set_tenant(tenant_a);
        create_worker(&store, &resolver, worker("Ali", 300.0))
            .await
            .unwrap();

        resolver.set_tenant(tenant_b);
        create_worker(&store, &resolver, worker("Omar", 250.0))
            .await
            .unwrap();

        let listed = list_workers(&store, &resolver).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Omar");
    }

    #[tokio::test]
    async fn test_archived_workers_drop_out_of_listing() {
        let (_, store, resolver) = fixture();
        resolver.set_tenant(Uuid::new_v4());
        let created = create_worker(&store, &resolver, worker("Ali", 300.0))
            .await
            .unwrap();
        archive_worker(&store, &resolver, created.id).await.unwrap();
        assert!(list_workers(&store, &resolver).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cross_tenant_update_misses() {
        let (_, store, resolver) = fixture();
        resolver.set_tenant(Uuid::new_v4());
        let created = create_worker(&store, &resolver, worker("Ali", 300.0))
            .await
            .unwrap();

        // Another tenant cannot touch the row even with the right id.
        resolver.set_tenant(Uuid::new_v4());
        let err = update_worker_rate(&store, &resolver, created.id, 500.0)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_negative_rate_rejected() {
        let (_, store, resolver) = fixture();
        resolver.set_tenant(Uuid::new_v4());
        let err = create_worker(&store, &resolver, worker("Ali", -1.0))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }
}
