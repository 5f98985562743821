//! Attendance — the cascading batch creator.
//!
//! Attendance is the auditable fact of presence and must never be lost to a
//! payment-subsystem failure, so the cascade runs in two phases:
//!
//! 1. The attendance batch is inserted as one statement (all rows land or
//!    none do).
//! 2. Only after that succeeds, one payment per record with a positive cost
//!    is created concurrently, all-settled: each payment succeeds or fails
//!    on its own, failures are counted and logged, and nothing undoes the
//!    attendance insert.
//!
//! One batch per (project, date): a second submission for the same pair is
//! rejected up front, and a store-level uniqueness conflict during the
//! insert maps to the same error. The pre-check is a fast path, not mutual
//! exclusion — two concurrent submissions from different sessions can race
//! it, and the constraint is the backstop.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::error::CoreError;
use crate::guard;
use crate::scope::ScopeResolver;
use crate::services::categories;
use crate::store::{decode, decode_rows, tables, SharedStore, StoreError};
use crate::types::{AttendanceRecord, PaymentStatus, Worker};

#[derive(Debug, Clone)]
pub struct WorkerEntry {
    pub worker_id: Uuid,
    /// Overrides the worker's stored daily rate when set.
    pub rate: Option<f64>,
    /// Defaults to 1.0 (one full day) when not set.
    pub hours: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct AttendanceInput {
    pub project_id: Uuid,
    pub date: NaiveDate,
    pub workers: Vec<WorkerEntry>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceBatchResult {
    pub records_created: usize,
    pub payments_created: usize,
    pub payments_failed: usize,
}

/// Attendance records for one project, optionally narrowed to one date.
/// Empty when tenant or branch is unresolved.
pub async fn list_attendance(
    store: &SharedStore,
    resolver: &ScopeResolver,
    project_id: Uuid,
    date: Option<NaiveDate>,
) -> Result<Vec<AttendanceRecord>, CoreError> {
    let Some(scope) = guard::read_branch_scope(resolver) else {
        return Ok(Vec::new());
    };
    let mut query = guard::branch_query(scope)
        .eq("project_id", project_id)
        .order_by("date", true);
    if let Some(date) = date {
        query = query.eq("date", date);
    }
    let rows = store.select(tables::ATTENDANCE, query).await?;
    Ok(decode_rows(rows)?)
}

pub async fn create_attendance_batch(
    store: &SharedStore,
    resolver: &ScopeResolver,
    input: AttendanceInput,
) -> Result<AttendanceBatchResult, CoreError> {
    let scope = guard::branch_scope(resolver)?;

    if input.workers.is_empty() {
        return Err(CoreError::Validation(
            "At least one worker is required".to_string(),
        ));
    }

    // Duplicate guard: at most one batch per (project, date).
    let existing = store
        .select(
            tables::ATTENDANCE,
            guard::branch_query(scope)
                .eq("project_id", input.project_id)
                .eq("date", input.date)
                .limit(1),
        )
        .await?;
    if !existing.is_empty() {
        return Err(CoreError::Duplicate(format!(
            "Attendance for this project on {} is already recorded",
            input.date
        )));
    }

    // One category lookup for the whole batch, not one per worker.
    let labor_category = categories::resolve_labor_category(store, scope.tenant()).await;

    let mut attendance_rows: Vec<Value> = Vec::with_capacity(input.workers.len());
    let mut payment_rows: Vec<Value> = Vec::new();
    for entry in &input.workers {
        // A removed worker must not block the rest of the batch.
        let worker = match store
            .select_single(
                tables::WORKERS,
                guard::tenant_query(scope.tenant()).eq("id", entry.worker_id),
            )
            .await
            .and_then(decode::<Worker>)
        {
            Ok(worker) => worker,
            Err(e) if e.is_missing() => {
                log::warn!("attendance: worker {} not found, skipping", entry.worker_id);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let rate = entry.rate.unwrap_or(worker.daily_rate);
        let hours = entry.hours.unwrap_or(1.0);
        let cost = rate * hours;

        let mut row = json!({
            "worker_id": worker.id,
            "project_id": input.project_id,
            "date": input.date,
            "rate": rate,
            "hours": hours,
            "notes": input.notes,
            "created_at": Utc::now(),
        });
        guard::stamp_branch(&mut row, scope);
        attendance_rows.push(row);

        // Labor is settled same-day by convention; the payment references
        // the attendance only through its notes text.
        if cost > 0.0 {
            let mut payment = json!({
                "contract_id": Value::Null,
                "project_id": input.project_id,
                "category": labor_category,
                "amount": cost,
                "due_date": input.date,
                "paid_date": input.date,
                "status": PaymentStatus::Paid,
                "notes": format!(
                    "Labor: {} on {} ({hours}h x {rate})",
                    worker.name, input.date
                ),
                "created_at": Utc::now(),
            });
            guard::stamp_tenant(&mut payment, scope.tenant());
            payment_rows.push(payment);
        }
    }

    if attendance_rows.is_empty() {
        return Err(CoreError::Validation(
            "No valid workers in the batch".to_string(),
        ));
    }

    // Phase 1: the batch, all-or-nothing at the store.
    let created = store
        .insert_many(tables::ATTENDANCE, attendance_rows)
        .await
        .map_err(|e| match e {
            StoreError::Conflict(message) => CoreError::Duplicate(message),
            other => CoreError::Store(other),
        })?;

    // Phase 2: payment fan-out, all-settled. No payment failure aborts
    // another or touches the attendance rows.
    let mut tasks = JoinSet::new();
    for payment in payment_rows {
        let store = Arc::clone(store);
        tasks.spawn(async move { store.insert(tables::PAYMENTS, payment).await });
    }

    let mut payments_created = 0usize;
    let mut payments_failed = 0usize;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(_)) => payments_created += 1,
            Ok(Err(e)) => {
                payments_failed += 1;
                log::warn!("attendance: payment creation failed: {e}");
            }
            Err(e) => {
                payments_failed += 1;
                log::warn!("attendance: payment task panicked: {e}");
            }
        }
    }

    Ok(AttendanceBatchResult {
        records_created: created.len(),
        payments_created,
        payments_failed,
    })
}

/// Whether a batch already exists for this (project, date) pair — the
/// fast-path check UIs call before submitting.
pub async fn batch_exists(
    store: &SharedStore,
    resolver: &ScopeResolver,
    project_id: Uuid,
    date: NaiveDate,
) -> Result<bool, CoreError> {
    let Some(scope) = guard::read_branch_scope(resolver) else {
        return Ok(false);
    };
    let rows = store
        .select(
            tables::ATTENDANCE,
            guard::branch_query(scope)
                .eq("project_id", project_id)
                .eq("date", date)
                .limit(1),
        )
        .await?;
    Ok(!rows.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::workers::{self, NewWorker};
    use crate::store::memory::{MemoryStore, StoreOp};

    struct Fixture {
        memory: Arc<MemoryStore>,
        store: SharedStore,
        resolver: ScopeResolver,
    }

    fn fixture() -> Fixture {
        let _ = env_logger::builder().is_test(true).try_init();
        let memory = Arc::new(MemoryStore::new());
        let resolver = ScopeResolver::new();
        resolver.set_tenant(Uuid::new_v4());
        resolver.set_branch(Uuid::new_v4());
        Fixture {
            store: memory.clone(),
            memory,
            resolver,
        }
    }

    async fn add_worker(f: &Fixture, name: &str, rate: f64) -> Worker {
        workers::create_worker(
            &f.store,
            &f.resolver,
            NewWorker {
                name: name.to_string(),
                trade: None,
                daily_rate: rate,
            },
        )
        .await
        .unwrap()
    }

    fn batch(project_id: Uuid, worker_ids: &[Uuid]) -> AttendanceInput {
        AttendanceInput {
            project_id,
            date: NaiveDate::from_ymd_opt(2026, 8, 20).unwrap(),
            workers: worker_ids
                .iter()
                .map(|&worker_id| WorkerEntry {
                    worker_id,
                    rate: None,
                    hours: None,
                })
                .collect(),
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_batch_creates_attendance_and_payments() {
        let f = fixture();
        let a = add_worker(&f, "Ali", 300.0).await;
        let b = add_worker(&f, "Omar", 250.0).await;
        let project = Uuid::new_v4();

        let result =
            create_attendance_batch(&f.store, &f.resolver, batch(project, &[a.id, b.id]))
                .await
                .unwrap();

        assert_eq!(result.records_created, 2);
        assert_eq!(result.payments_created, 2);
        assert_eq!(result.payments_failed, 0);

        let payments = f.memory.rows(tables::PAYMENTS);
        assert_eq!(payments.len(), 2);
        // Payments are settled same-day and carry only a notes-text link.
        assert!(payments.iter().all(|p| p["status"] == "paid"));
        assert!(payments.iter().all(|p| p["paid_date"] == "2026-08-20"));
        assert!(payments.iter().any(|p| p["notes"]
            .as_str()
            .is_some_and(|n| n.contains("Ali"))));
    }

    #[tokio::test]
    async fn test_payment_failure_does_not_touch_attendance() {
        let f = fixture();
        let a = add_worker(&f, "Ali", 300.0).await;
        let b = add_worker(&f, "Bob", 200.0).await;
        let c = add_worker(&f, "Omar", 250.0).await;
        let project = Uuid::new_v4();

        // Worker #2's payment fails; the other two land.
        f.memory.fail_matching(
            tables::PAYMENTS,
            StoreOp::Insert,
            |row| {
                row["notes"]
                    .as_str()
                    .is_some_and(|n| n.contains("Bob"))
            },
            "injected",
        );

        let result =
            create_attendance_batch(&f.store, &f.resolver, batch(project, &[a.id, b.id, c.id]))
                .await
                .unwrap();

        assert_eq!(result.records_created, 3);
        assert_eq!(result.payments_created, 2);
        assert_eq!(result.payments_failed, 1);
        assert_eq!(f.memory.rows(tables::ATTENDANCE).len(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_batch_rejected_without_writes() {
        let f = fixture();
        let a = add_worker(&f, "Ali", 300.0).await;
        let project = Uuid::new_v4();

        create_attendance_batch(&f.store, &f.resolver, batch(project, &[a.id]))
            .await
            .unwrap();
        let before = f.memory.rows(tables::ATTENDANCE).len();

        let err = create_attendance_batch(&f.store, &f.resolver, batch(project, &[a.id]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_RECORD");
        assert_eq!(f.memory.rows(tables::ATTENDANCE).len(), before);
    }

    #[tokio::test]
    async fn test_store_conflict_maps_to_duplicate() {
        // The pre-check can race; a uniqueness conflict from the store
        // surfaces as the same duplicate error.
        let f = fixture();
        let a = add_worker(&f, "Ali", 300.0).await;
        f.memory.fail_next_unique_violation(
            tables::ATTENDANCE,
            StoreOp::InsertMany,
            "duplicate key value violates unique constraint",
        );
        let err = create_attendance_batch(&f.store, &f.resolver, batch(Uuid::new_v4(), &[a.id]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_RECORD");
    }

    #[tokio::test]
    async fn test_missing_worker_skipped() {
        let f = fixture();
        let a = add_worker(&f, "Ali", 300.0).await;
        let ghost = Uuid::new_v4();
        let result =
            create_attendance_batch(&f.store, &f.resolver, batch(Uuid::new_v4(), &[a.id, ghost]))
                .await
                .unwrap();
        assert_eq!(result.records_created, 1);
    }

    #[tokio::test]
    async fn test_zero_cost_worker_gets_no_payment() {
        let f = fixture();
        let unpaid = add_worker(&f, "Trainee", 0.0).await;
        let result =
            create_attendance_batch(&f.store, &f.resolver, batch(Uuid::new_v4(), &[unpaid.id]))
                .await
                .unwrap();
        assert_eq!(result.records_created, 1);
        assert_eq!(result.payments_created, 0);
        assert!(f.memory.rows(tables::PAYMENTS).is_empty());
    }

    #[tokio::test]
    async fn test_rate_and_hours_overrides() {
        let f = fixture();
        let a = add_worker(&f, "Ali", 300.0).await;
        let mut input = batch(Uuid::new_v4(), &[a.id]);
        input.workers[0].rate = Some(400.0);
        input.workers[0].hours = Some(0.5);

        create_attendance_batch(&f.store, &f.resolver, input)
            .await
            .unwrap();

        let rows = f.memory.rows(tables::ATTENDANCE);
        assert_eq!(rows[0]["rate"], 400.0);
        assert_eq!(rows[0]["hours"], 0.5);
        let payments = f.memory.rows(tables::PAYMENTS);
        assert_eq!(payments[0]["amount"], 200.0);
    }

    #[tokio::test]
    async fn test_no_branch_fails_closed() {
        let f = fixture();
        let a = add_worker(&f, "Ali", 300.0).await;
        let project = Uuid::new_v4();
        f.resolver.clear();
        f.resolver.set_tenant(Uuid::new_v4());

        assert!(list_attendance(&f.store, &f.resolver, project, None)
            .await
            .unwrap()
            .is_empty());
        let err = create_attendance_batch(&f.store, &f.resolver, batch(project, &[a.id]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NO_BRANCH_ID");
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let f = fixture();
        let err = create_attendance_batch(&f.store, &f.resolver, batch(Uuid::new_v4(), &[]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_batch_exists_fast_path() {
        let f = fixture();
        let a = add_worker(&f, "Ali", 300.0).await;
        let project = Uuid::new_v4();
        let date = NaiveDate::from_ymd_opt(2026, 8, 20).unwrap();

        assert!(!batch_exists(&f.store, &f.resolver, project, date)
            .await
            .unwrap());
        create_attendance_batch(&f.store, &f.resolver, batch(project, &[a.id]))
            .await
            .unwrap();
        assert!(batch_exists(&f.store, &f.resolver, project, date)
            .await
            .unwrap());
    }
}
