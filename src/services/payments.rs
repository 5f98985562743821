//! Payments — tenant-scoped obligations and settlements.

use chrono::{NaiveDate, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::error::CoreError;
use crate::guard;
use crate::scope::ScopeResolver;
use crate::store::{decode, decode_rows, tables, SharedStore};
use crate::types::{Payment, PaymentStatus};

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub category: String,
    pub amount: f64,
    pub contract_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub paid_date: Option<NaiveDate>,
    pub status: PaymentStatus,
    pub notes: Option<String>,
}

/// Payments for the current tenant, newest first, optionally filtered by
/// status. Empty when no tenant is selected.
pub async fn list_payments(
    store: &SharedStore,
    resolver: &ScopeResolver,
    status: Option<PaymentStatus>,
) -> Result<Vec<Payment>, CoreError> {
    let Some(scope) = guard::read_tenant_scope(resolver) else {
        return Ok(Vec::new());
    };
    let mut query = guard::tenant_query(scope).order_by("created_at", true);
    if let Some(status) = status {
        query = query.eq("status", status);
    }
    let rows = store.select(tables::PAYMENTS, query).await?;
    Ok(decode_rows(rows)?)
}

pub async fn create_payment(
    store: &SharedStore,
    resolver: &ScopeResolver,
    input: NewPayment,
) -> Result<Payment, CoreError> {
    let scope = guard::tenant_scope(resolver)?;

    if input.category.trim().is_empty() {
        return Err(CoreError::Validation(
            "Payment category is required".to_string(),
        ));
    }
    if input.amount <= 0.0 {
        return Err(CoreError::Validation(
            "Payment amount must be greater than zero".to_string(),
        ));
    }

    let mut row = json!({
        "category": input.category.trim(),
        "amount": input.amount,
        "contract_id": input.contract_id,
        "project_id": input.project_id,
        "due_date": input.due_date,
        "paid_date": input.paid_date,
        "status": input.status,
        "notes": input.notes,
        "created_at": Utc::now(),
    });
    guard::stamp_tenant(&mut row, scope);
    Ok(decode(store.insert(tables::PAYMENTS, row).await?)?)
}

/// Settle a payment: status `paid`, paid today.
pub async fn mark_paid(
    store: &SharedStore,
    resolver: &ScopeResolver,
    payment_id: Uuid,
    paid_date: NaiveDate,
) -> Result<Payment, CoreError> {
    let scope = guard::tenant_scope(resolver)?;
    let mut updated = store
        .update(
            tables::PAYMENTS,
            guard::tenant_query(scope).eq("id", payment_id),
            json!({ "status": PaymentStatus::Paid, "paid_date": paid_date }),
        )
        .await?;
    match updated.pop() {
        Some(row) => Ok(decode(row)?),
        None => Err(CoreError::Validation(format!(
            "Payment not found: {payment_id}"
        ))),
    }
}
