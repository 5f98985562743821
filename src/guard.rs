//! Isolation Guard — the single fail-closed gate every feature operation
//! passes through.
//!
//! Writes call `tenant_scope`/`branch_scope` and propagate the coded error;
//! reads call `read_tenant_scope`/`read_branch_scope` and return an empty
//! collection when scope is unresolved — never an unscoped query, even if
//! the store's own row-level protections are absent or misconfigured.
//!
//! The guard also owns stamping: tenant/branch columns on persisted rows
//! come from the resolved scope, never from caller-supplied input, so a
//! caller cannot write into another tenant by smuggling an id in its
//! payload.

use serde_json::Value;

use crate::error::CoreError;
use crate::scope::{BranchScope, ScopeResolver, TenantScope};
use crate::store::Query;

/// Resolve tenant scope for a write; fails closed with `NO_TENANT_ID`.
pub fn tenant_scope(resolver: &ScopeResolver) -> Result<TenantScope, CoreError> {
    resolver
        .tenant()
        .map(|tenant_id| TenantScope { tenant_id })
        .ok_or(CoreError::MissingTenantScope)
}

/// Resolve tenant+branch scope for a write on a branch-local entity.
/// Missing tenant wins over missing branch: the caller has not even picked
/// a company yet.
pub fn branch_scope(resolver: &ScopeResolver) -> Result<BranchScope, CoreError> {
    let tenant_id = resolver.tenant().ok_or(CoreError::MissingTenantScope)?;
    let branch_id = resolver.branch().ok_or(CoreError::MissingBranchScope)?;
    Ok(BranchScope {
        tenant_id,
        branch_id,
    })
}

/// Resolve tenant scope for a read; `None` means "return an empty result".
pub fn read_tenant_scope(resolver: &ScopeResolver) -> Option<TenantScope> {
    tenant_scope(resolver).ok()
}

/// Resolve tenant+branch scope for a read; `None` means "return an empty
/// result".
pub fn read_branch_scope(resolver: &ScopeResolver) -> Option<BranchScope> {
    branch_scope(resolver).ok()
}

/// A query pre-filtered by tenant — the mandatory predicate on every
/// tenant-scoped read.
pub fn tenant_query(scope: TenantScope) -> Query {
    Query::new().eq("tenant_id", scope.tenant_id)
}

/// A query pre-filtered by tenant and branch.
pub fn branch_query(scope: BranchScope) -> Query {
    Query::new()
        .eq("tenant_id", scope.tenant_id)
        .eq("branch_id", scope.branch_id)
}

/// Stamp the tenant column onto a row about to be persisted, overwriting
/// anything the caller put there.
pub fn stamp_tenant(row: &mut Value, scope: TenantScope) {
    row["tenant_id"] = Value::String(scope.tenant_id.to_string());
}

/// Stamp tenant and branch columns onto a row about to be persisted.
pub fn stamp_branch(row: &mut Value, scope: BranchScope) {
    row["tenant_id"] = Value::String(scope.tenant_id.to_string());
    row["branch_id"] = Value::String(scope.branch_id.to_string());
}
