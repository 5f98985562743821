//! Domain records and shared input/result structs.
//!
//! Row structs serialize with their store column names (snake_case); they
//! are the wire shape of the relational service. UI-facing result structs
//! use camelCase field names.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity boundary for one customer organization's data. Created exactly
/// once per provisioning run; never deleted by this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub industry: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An operating location under a tenant. Exactly one branch per tenant has
/// `is_main = true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub currency: String,
    pub is_main: bool,
    pub created_at: DateTime<Utc>,
}

/// A cash ledger scoped to exactly one branch. Every branch gets one at
/// provisioning time; absence indicates a partially-failed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Treasury {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub branch_id: Uuid,
    pub name: String,
    pub currency: String,
    pub initial_balance: f64,
    pub current_balance: f64,
    pub created_at: DateTime<Utc>,
}

/// Business role of an authenticated principal. `SuperAdmin` is the
/// provisioning role; it alone is subject to the setup-completion gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Manager,
    Accountant,
    Employee,
}

/// The authenticated principal's business identity. `id` equals the auth
/// provider's principal id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
    #[serde(default)]
    pub branch_id: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

/// A registered worker. Archived instead of deleted so attendance history
/// keeps resolving.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub trade: Option<String>,
    pub daily_rate: f64,
    #[serde(default)]
    pub archived: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    Labor,
    Materials,
    Equipment,
    General,
}

/// An expense category. Name is unique per tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseCategory {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub kind: CategoryKind,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Overdue,
    Cancelled,
}

/// A financial obligation or settlement. Payments derived from attendance
/// carry no hard foreign key to the attendance rows — the link is notes
/// text only, so payment failures can never roll attendance back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub tenant_id: Uuid,
    #[serde(default)]
    pub contract_id: Option<Uuid>,
    #[serde(default)]
    pub project_id: Option<Uuid>,
    pub category: String,
    pub amount: f64,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub paid_date: Option<NaiveDate>,
    pub status: PaymentStatus,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One worker's presence on one date for one project. `rate` is the rate at
/// the time of recording, not a live reference into the worker registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub branch_id: Uuid,
    pub worker_id: Uuid,
    pub project_id: Uuid,
    pub date: NaiveDate,
    pub rate: f64,
    pub hours: f64,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotationStatus {
    Draft,
    Sent,
    Accepted,
    Rejected,
}

/// A quotation being drafted for a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotationDraft {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub client_name: Option<String>,
    pub total: f64,
    pub status: QuotationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A reusable quotation layout. Name is unique per tenant; the body is an
/// opaque document the UI layer owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotationTemplate {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub body: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// The singleton system-settings row (id = 1). The completion flag is the
/// only thing distinguishing a provisioned system from a fresh one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSettings {
    pub id: i64,
    #[serde(default)]
    pub setup_complete: bool,
    #[serde(default)]
    pub setup_completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub setup_completed_by: Option<Uuid>,
}
