//! In-memory `DataStore` used by tests and local development seeding.
//!
//! Semantics mirror the hosted service: per-call atomicity, single-row
//! fetch errors on zero/multiple matches, empty update result when nothing
//! matched. Failures can be injected per table/operation, optionally gated
//! on a payload predicate, so partial-batch behavior is testable.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use super::{DataStore, Query, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Insert,
    InsertMany,
    Select,
    Update,
    Upsert,
    Delete,
}

type Predicate = Box<dyn Fn(&Value) -> bool + Send + Sync>;

struct InjectedFailure {
    table: String,
    op: StoreOp,
    predicate: Option<Predicate>,
    status: u16,
    message: String,
    conflict: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    failures: Mutex<Vec<InjectedFailure>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed rows directly, bypassing failure injection. Rows without an
    /// `id` get one assigned.
    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        let mut tables = self.tables.lock();
        let stored = tables.entry(table.to_string()).or_default();
        for mut row in rows {
            ensure_id(&mut row);
            stored.push(row);
        }
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables.lock().get(table).cloned().unwrap_or_default()
    }

    /// Fail the next matching call with a 500 (transient) error.
    pub fn fail_next(&self, table: &str, op: StoreOp, message: &str) {
        self.push_failure(table, op, None, 500, message, false);
    }

    /// Fail the next matching call with a unique-constraint conflict, the
    /// way the store reports a violated uniqueness constraint.
    pub fn fail_next_unique_violation(&self, table: &str, op: StoreOp, message: &str) {
        self.push_failure(table, op, None, 409, message, true);
    }

    /// Fail the next matching call whose payload satisfies the predicate.
    /// Select/update/delete calls are matched unconditionally.
    pub fn fail_matching(
        &self,
        table: &str,
        op: StoreOp,
        predicate: impl Fn(&Value) -> bool + Send + Sync + 'static,
        message: &str,
    ) {
        self.push_failure(table, op, Some(Box::new(predicate)), 500, message, false);
    }

    /// Fail the next matching call with an explicit status, for exercising
    /// the transient/permanent distinction.
    pub fn fail_next_with_status(&self, table: &str, op: StoreOp, status: u16, message: &str) {
        self.push_failure(table, op, None, status, message, false);
    }

    fn push_failure(
        &self,
        table: &str,
        op: StoreOp,
        predicate: Option<Predicate>,
        status: u16,
        message: &str,
        conflict: bool,
    ) {
        self.failures.lock().push(InjectedFailure {
            table: table.to_string(),
            op,
            predicate,
            status,
            message: message.to_string(),
            conflict,
        });
    }

    /// Consume the first injected failure matching this call, if any.
    fn take_failure(&self, table: &str, op: StoreOp, payload: Option<&Value>) -> Option<StoreError> {
        let mut failures = self.failures.lock();
        let index = failures.iter().position(|f| {
            if f.table != table || f.op != op {
                return false;
            }
            match (&f.predicate, payload) {
                (Some(pred), Some(value)) => pred(value),
                (Some(_), None) => false,
                (None, _) => true,
            }
        })?;
        let failure = failures.remove(index);
        if failure.conflict {
            Some(StoreError::Conflict(failure.message))
        } else {
            Some(StoreError::Api {
                status: failure.status,
                message: failure.message,
            })
        }
    }
}

fn ensure_id(row: &mut Value) {
    let missing = row.get("id").map(Value::is_null).unwrap_or(true);
    if missing {
        row["id"] = Value::String(Uuid::new_v4().to_string());
    }
}

fn matches(row: &Value, query: &Query) -> bool {
    query
        .filters
        .iter()
        .all(|(column, value)| row.get(column).unwrap_or(&Value::Null) == value)
}

fn compare(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => match (a.as_str(), b.as_str()) {
            (Some(x), Some(y)) => x.cmp(y),
            _ => a.to_string().cmp(&b.to_string()),
        },
    }
}

fn apply_order_and_limit(mut rows: Vec<Value>, query: &Query) -> Vec<Value> {
    if let Some((column, descending)) = &query.order {
        rows.sort_by(|a, b| {
            let ordering = compare(
                a.get(column).unwrap_or(&Value::Null),
                b.get(column).unwrap_or(&Value::Null),
            );
            if *descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
    }
    if let Some(limit) = query.limit {
        rows.truncate(limit);
    }
    rows
}

fn merge_patch(row: &mut Value, patch: &Value) {
    if let (Some(target), Some(source)) = (row.as_object_mut(), patch.as_object()) {
        for (key, value) in source {
            target.insert(key.clone(), value.clone());
        }
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn insert(&self, table: &str, mut row: Value) -> Result<Value, StoreError> {
        if let Some(err) = self.take_failure(table, StoreOp::Insert, Some(&row)) {
            return Err(err);
        }
        ensure_id(&mut row);
        self.tables
            .lock()
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    async fn insert_many(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, StoreError> {
        // One statement: a failure matching any row drops the whole batch.
        for row in &rows {
            if let Some(err) = self.take_failure(table, StoreOp::InsertMany, Some(row)) {
                return Err(err);
            }
        }
        let mut stored_rows = Vec::with_capacity(rows.len());
        let mut tables = self.tables.lock();
        let stored = tables.entry(table.to_string()).or_default();
        for mut row in rows {
            ensure_id(&mut row);
            stored.push(row.clone());
            stored_rows.push(row);
        }
        Ok(stored_rows)
    }

    async fn select(&self, table: &str, query: Query) -> Result<Vec<Value>, StoreError> {
        if let Some(err) = self.take_failure(table, StoreOp::Select, None) {
            return Err(err);
        }
        let rows: Vec<Value> = self
            .tables
            .lock()
            .get(table)
            .map(|rows| rows.iter().filter(|r| matches(r, &query)).cloned().collect())
            .unwrap_or_default();
        Ok(apply_order_and_limit(rows, &query))
    }

    async fn select_single(&self, table: &str, query: Query) -> Result<Value, StoreError> {
        let mut rows = self.select(table, query).await?;
        match rows.len() {
            0 => Err(StoreError::NoRows),
            1 => Ok(rows.remove(0)),
            _ => Err(StoreError::MultipleRows),
        }
    }

    async fn update(
        &self,
        table: &str,
        query: Query,
        patch: Value,
    ) -> Result<Vec<Value>, StoreError> {
        if let Some(err) = self.take_failure(table, StoreOp::Update, Some(&patch)) {
            return Err(err);
        }
        let mut tables = self.tables.lock();
        let mut updated = Vec::new();
        if let Some(rows) = tables.get_mut(table) {
            for row in rows.iter_mut().filter(|r| matches(r, &query)) {
                merge_patch(row, &patch);
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn upsert(&self, table: &str, mut row: Value) -> Result<Value, StoreError> {
        if let Some(err) = self.take_failure(table, StoreOp::Upsert, Some(&row)) {
            return Err(err);
        }
        ensure_id(&mut row);
        let mut tables = self.tables.lock();
        let stored = tables.entry(table.to_string()).or_default();
        let key = row["id"].clone();
        if let Some(existing) = stored.iter_mut().find(|r| r["id"] == key) {
            merge_patch(existing, &row);
            Ok(existing.clone())
        } else {
            stored.push(row.clone());
            Ok(row)
        }
    }

    async fn delete(&self, table: &str, query: Query) -> Result<u64, StoreError> {
        if let Some(err) = self.take_failure(table, StoreOp::Delete, None) {
            return Err(err);
        }
        let mut tables = self.tables.lock();
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|r| !matches(r, &query));
        Ok((before - rows.len()) as u64)
    }
}
