//! Error types for guarded operations
//!
//! Errors are classified along two axes:
//! - Scope errors: missing tenant/branch selection — always fail closed,
//!   never reach the store.
//! - Validation errors: rejected before any remote call.
//! - Store/auth errors: surfaced with the remote message passed through.
//!
//! Every public operation returns `Result<T, CoreError>` rather than
//! panicking; `code()` gives the calling UI a stable machine-readable tag to
//! branch on.

use thiserror::Error;

use crate::auth::AuthError;
use crate::store::StoreError;

/// Error type returned by every guarded feature operation.
#[derive(Debug, Error)]
pub enum CoreError {
    // Scope errors — the guard rejects before the store is touched
    #[error("No company selected. Select a company first.")]
    MissingTenantScope,

    #[error("No branch selected. Select a branch first.")]
    MissingBranchScope,

    // Validation errors — rejected before any remote call
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Duplicate(String),

    #[error("{0}")]
    CategoryExists(String),

    // Remote errors — message passed through from the collaborator
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl CoreError {
    /// Stable machine-readable error code for UI branching.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::MissingTenantScope => "NO_TENANT_ID",
            CoreError::MissingBranchScope => "NO_BRANCH_ID",
            CoreError::Validation(_) => "VALIDATION_ERROR",
            CoreError::Duplicate(_) => "DUPLICATE_RECORD",
            CoreError::CategoryExists(_) => "CATEGORY_EXISTS",
            CoreError::Store(_) => "STORE_ERROR",
            CoreError::Auth(_) => "AUTH_ERROR",
        }
    }

    /// Returns true if the operation was stopped by the isolation guard
    /// before anything was sent to the store.
    pub fn is_scope_error(&self) -> bool {
        matches!(
            self,
            CoreError::MissingTenantScope | CoreError::MissingBranchScope
        )
    }

    /// Returns true if the error was raised locally (no remote call issued).
    pub fn is_local(&self) -> bool {
        !matches!(self, CoreError::Store(_) | CoreError::Auth(_))
    }
}
