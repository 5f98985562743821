//! Scope Resolver — the process-wide selected tenant and branch.
//!
//! Pure in-memory state: seeded at login/provisioning completion, cleared on
//! logout or tenant switch, read by every guarded operation. No validation
//! happens here — that is the guard's job (`crate::guard`). Guarded calls
//! never reach back into the resolver mid-flight; they resolve an immutable
//! snapshot (`TenantScope` / `BranchScope`) once at entry and thread it
//! through.

use parking_lot::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct ScopeResolver {
    tenant: RwLock<Option<Uuid>>,
    branch: RwLock<Option<Uuid>>,
}

impl ScopeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tenant(&self) -> Option<Uuid> {
        *self.tenant.read()
    }

    pub fn branch(&self) -> Option<Uuid> {
        *self.branch.read()
    }

    pub fn set_tenant(&self, id: Uuid) {
        *self.tenant.write() = Some(id);
    }

    pub fn set_branch(&self, id: Uuid) {
        *self.branch.write() = Some(id);
    }

    /// Clear both selections (logout / tenant switch). A cleared resolver
    /// degrades every guarded operation to a safe no-op.
    pub fn clear(&self) {
        *self.tenant.write() = None;
        *self.branch.write() = None;
    }
}

/// Resolved tenant scope for a single guarded call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantScope {
    pub tenant_id: Uuid,
}

/// Resolved tenant+branch scope for branch-local entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchScope {
    pub tenant_id: Uuid,
    pub branch_id: Uuid,
}

impl BranchScope {
    pub fn tenant(&self) -> TenantScope {
        TenantScope {
            tenant_id: self.tenant_id,
        }
    }
}
