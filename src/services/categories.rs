//! Expense categories — tenant-scoped, name-unique.

use chrono::Utc;
use serde_json::json;

use crate::error::CoreError;
use crate::guard;
use crate::scope::{ScopeResolver, TenantScope};
use crate::store::{decode, decode_rows, tables, SharedStore};
use crate::types::{CategoryKind, ExpenseCategory};

/// Category name the attendance cascade falls back to when no labor
/// category is configured.
pub const DEFAULT_LABOR_CATEGORY: &str = "Labor";

pub async fn list_categories(
    store: &SharedStore,
    resolver: &ScopeResolver,
) -> Result<Vec<ExpenseCategory>, CoreError> {
    let Some(scope) = guard::read_tenant_scope(resolver) else {
        return Ok(Vec::new());
    };
    let rows = store
        .select(
            tables::EXPENSE_CATEGORIES,
            guard::tenant_query(scope).order_by("name", false),
        )
        .await?;
    Ok(decode_rows(rows)?)
}

pub async fn create_category(
    store: &SharedStore,
    resolver: &ScopeResolver,
    name: &str,
    kind: CategoryKind,
) -> Result<ExpenseCategory, CoreError> {
    let scope = guard::tenant_scope(resolver)?;

    let name = name.trim();
    if name.is_empty() {
        return Err(CoreError::Validation(
            "Category name is required".to_string(),
        ));
    }

    // Per-tenant unique name, checked case-insensitively before the insert.
    let existing = store
        .select(tables::EXPENSE_CATEGORIES, guard::tenant_query(scope))
        .await?;
    let duplicate = existing.iter().any(|row| {
        row["name"]
            .as_str()
            .is_some_and(|n| n.eq_ignore_ascii_case(name))
    });
    if duplicate {
        return Err(CoreError::CategoryExists(format!(
            "A category named '{name}' already exists"
        )));
    }

    let mut row = json!({
        "name": name,
        "kind": kind,
        "created_at": Utc::now(),
    });
    guard::stamp_tenant(&mut row, scope);
    Ok(decode(store.insert(tables::EXPENSE_CATEGORIES, row).await?)?)
}

/// Resolve the labor category name once per attendance batch. Falls back to
/// the constant default when none is configured or the lookup fails — the
/// cascade must not die on a missing convenience row.
pub async fn resolve_labor_category(store: &SharedStore, scope: TenantScope) -> String {
    let result = store
        .select(
            tables::EXPENSE_CATEGORIES,
            guard::tenant_query(scope)
                .eq("kind", CategoryKind::Labor)
                .limit(1),
        )
        .await;
    match result {
        Ok(rows) => rows
            .first()
            .and_then(|row| row["name"].as_str())
            .unwrap_or(DEFAULT_LABOR_CATEGORY)
            .to_string(),
        Err(e) => {
            log::warn!("labor category lookup failed, using default: {e}");
            DEFAULT_LABOR_CATEGORY.to_string()
        }
    }
}
