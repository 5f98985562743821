//! Remote relational data service abstraction.
//!
//! The backing service exposes table-scoped insert/select/update/upsert/
//! delete with equality/ordering/limit predicates and a single-row fetch
//! that errors when zero or multiple rows match. Two implementations:
//! - `rest`: PostgREST-style HTTP client with bounded retry
//! - `memory`: in-process double with injectable failures, used by tests
//!   and local development seeding

pub mod memory;
pub mod rest;

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub use memory::MemoryStore;
pub use rest::{RestStore, RestStoreConfig};

/// Table names used by the core.
pub mod tables {
    pub const TENANTS: &str = "tenants";
    pub const BRANCHES: &str = "branches";
    pub const TREASURIES: &str = "treasuries";
    pub const PROFILES: &str = "profiles";
    pub const WORKERS: &str = "workers";
    pub const EXPENSE_CATEGORIES: &str = "expense_categories";
    pub const PAYMENTS: &str = "payments";
    pub const ATTENDANCE: &str = "attendance";
    pub const QUOTATION_DRAFTS: &str = "quotation_drafts";
    pub const QUOTATION_TEMPLATES: &str = "quotation_templates";
    pub const SYSTEM_SETTINGS: &str = "system_settings";
}

// ============================================================================
// Error type
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no rows matched")]
    NoRows,

    #[error("more than one row matched a single-row fetch")]
    MultipleRows,

    #[error("relation does not exist: {0}")]
    RelationMissing(String),

    #[error("unique constraint violated: {0}")]
    Conflict(String),

    #[error("store API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// "No row" and "relation missing" both mean the data simply is not
    /// there; callers map them to an empty/false result, not a crash.
    pub fn is_missing(&self) -> bool {
        matches!(self, StoreError::NoRows | StoreError::RelationMissing(_))
    }

    /// Returns true if a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Http(_) => true,
            StoreError::Api { status, .. } => {
                *status >= 500 || *status == 429 || *status == 408
            }
            _ => false,
        }
    }
}

// ============================================================================
// Query
// ============================================================================

/// Equality/ordering/limit predicate set for a table operation.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filters: Vec<(String, Value)>,
    pub order: Option<(String, bool)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality filter. Non-serializable values degrade to null,
    /// which matches nothing.
    pub fn eq(mut self, column: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.filters.push((column.to_string(), value));
        self
    }

    pub fn order_by(mut self, column: &str, descending: bool) -> Self {
        self.order = Some((column.to_string(), descending));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

// ============================================================================
// Trait
// ============================================================================

/// Table-scoped access to the remote relational service. Per-statement
/// atomicity only; there are no client-visible multi-statement transactions.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Insert one row; returns the stored representation (with id).
    async fn insert(&self, table: &str, row: Value) -> Result<Value, StoreError>;

    /// Insert a batch as one statement — all rows land or none do.
    async fn insert_many(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, StoreError>;

    async fn select(&self, table: &str, query: Query) -> Result<Vec<Value>, StoreError>;

    /// Fetch exactly one row; `NoRows`/`MultipleRows` otherwise.
    async fn select_single(&self, table: &str, query: Query) -> Result<Value, StoreError>;

    /// Patch all rows matching the query; returns the updated rows. An
    /// empty result means nothing matched.
    async fn update(&self, table: &str, query: Query, patch: Value)
        -> Result<Vec<Value>, StoreError>;

    /// Insert-or-merge by primary key.
    async fn upsert(&self, table: &str, row: Value) -> Result<Value, StoreError>;

    async fn delete(&self, table: &str, query: Query) -> Result<u64, StoreError>;
}

pub type SharedStore = Arc<dyn DataStore>;

/// Decode a stored row into a typed record.
pub fn decode<T: DeserializeOwned>(row: Value) -> Result<T, StoreError> {
    Ok(serde_json::from_value(row)?)
}

/// Decode a result set into typed records.
pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, StoreError> {
    rows.into_iter()
        .map(|row| Ok(serde_json::from_value(row)?))
        .collect()
}
