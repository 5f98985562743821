//! Quotation drafts and templates — tenant-scoped.
//!
//! Document layout and rendering live in the UI layer; this service only
//! owns the guarded persistence of drafts (with a status lifecycle) and
//! name-unique templates.

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::error::CoreError;
use crate::guard;
use crate::scope::ScopeResolver;
use crate::store::{decode, decode_rows, tables, SharedStore};
use crate::types::{QuotationDraft, QuotationStatus, QuotationTemplate};

#[derive(Debug, Clone)]
pub struct NewDraft {
    pub title: String,
    pub client_name: Option<String>,
    pub total: f64,
}

pub async fn list_drafts(
    store: &SharedStore,
    resolver: &ScopeResolver,
) -> Result<Vec<QuotationDraft>, CoreError> {
    let Some(scope) = guard::read_tenant_scope(resolver) else {
        return Ok(Vec::new());
    };
    let rows = store
        .select(
            tables::QUOTATION_DRAFTS,
            guard::tenant_query(scope).order_by("updated_at", true),
        )
        .await?;
    Ok(decode_rows(rows)?)
}

pub async fn create_draft(
    store: &SharedStore,
    resolver: &ScopeResolver,
    input: NewDraft,
) -> Result<QuotationDraft, CoreError> {
    let scope = guard::tenant_scope(resolver)?;
    if input.title.trim().is_empty() {
        return Err(CoreError::Validation("Draft title is required".to_string()));
    }
    let now = Utc::now();
    let mut row = json!({
        "title": input.title.trim(),
        "client_name": input.client_name,
        "total": input.total,
        "status": QuotationStatus::Draft,
        "created_at": now,
        "updated_at": now,
    });
    guard::stamp_tenant(&mut row, scope);
    Ok(decode(store.insert(tables::QUOTATION_DRAFTS, row).await?)?)
}

pub async fn set_draft_status(
    store: &SharedStore,
    resolver: &ScopeResolver,
    draft_id: Uuid,
    status: QuotationStatus,
) -> Result<QuotationDraft, CoreError> {
    let scope = guard::tenant_scope(resolver)?;
    let mut updated = store
        .update(
            tables::QUOTATION_DRAFTS,
            guard::tenant_query(scope).eq("id", draft_id),
            json!({ "status": status, "updated_at": Utc::now() }),
        )
        .await?;
    match updated.pop() {
        Some(row) => Ok(decode(row)?),
        None => Err(CoreError::Validation(format!("Draft not found: {draft_id}"))),
    }
}

pub async fn delete_draft(
    store: &SharedStore,
    resolver: &ScopeResolver,
    draft_id: Uuid,
) -> Result<(), CoreError> {
    let scope = guard::tenant_scope(resolver)?;
    let deleted = store
        .delete(
            tables::QUOTATION_DRAFTS,
            guard::tenant_query(scope).eq("id", draft_id),
        )
        .await?;
    if deleted == 0 {
        return Err(CoreError::Validation(format!("Draft not found: {draft_id}")));
    }
    Ok(())
}

pub async fn list_templates(
    store: &SharedStore,
    resolver: &ScopeResolver,
) -> Result<Vec<QuotationTemplate>, CoreError> {
    let Some(scope) = guard::read_tenant_scope(resolver) else {
        return Ok(Vec::new());
    };
    let rows = store
        .select(
            tables::QUOTATION_TEMPLATES,
            guard::tenant_query(scope).order_by("name", false),
        )
        .await?;
    Ok(decode_rows(rows)?)
}

pub async fn create_template(
    store: &SharedStore,
    resolver: &ScopeResolver,
    name: &str,
    body: serde_json::Value,
) -> Result<QuotationTemplate, CoreError> {
    let scope = guard::tenant_scope(resolver)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(CoreError::Validation(
            "Template name is required".to_string(),
        ));
    }

    let existing = store
        .select(tables::QUOTATION_TEMPLATES, guard::tenant_query(scope))
        .await?;
    let duplicate = existing.iter().any(|row| {
        row["name"]
            .as_str()
            .is_some_and(|n| n.eq_ignore_ascii_case(name))
    });
    if duplicate {
        return Err(CoreError::Duplicate(format!(
            "A template named '{name}' already exists"
        )));
    }

    let mut row = json!({
        "name": name,
        "body": body,
        "created_at": Utc::now(),
    });
    guard::stamp_tenant(&mut row, scope);
    Ok(decode(store.insert(tables::QUOTATION_TEMPLATES, row).await?)?)
}

pub async fn delete_template(
    store: &SharedStore,
    resolver: &ScopeResolver,
    template_id: Uuid,
) -> Result<(), CoreError> {
    let scope = guard::tenant_scope(resolver)?;
    let deleted = store
        .delete(
            tables::QUOTATION_TEMPLATES,
            guard::tenant_query(scope).eq("id", template_id),
        )
        .await?;
    if deleted == 0 {
        return Err(CoreError::Validation(format!(
            "Template not found: {template_id}"
        )));
    }
    Ok(())
}
