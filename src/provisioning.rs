//! Provisioning Orchestrator — the one-time onboarding workflow.
//!
//! A linear state machine over independent remote calls with no cross-call
//! atomicity:
//!
//! ```text
//! AuthResolve -> TenantCreate -> MainBranchCreate -> AdditionalBranchesCreate
//!     -> TreasuriesCreate -> ProfileLink -> SettingsFinalize -> Done
//! ```
//!
//! Each step is classified fatal or tolerated. Fatal failures abort the run
//! with a coded error; tolerated failures are logged, accumulated as
//! warnings, and never change the overall outcome. AuthResolve self-heals a
//! previous partial run: sign-up hitting "already registered" falls back to
//! sign-in with the same credentials.
//!
//! Re-entry is safe by construction: a principal whose profile already
//! carries a tenant linkage short-circuits to success with the existing
//! tenant instead of creating a second one. When that linkage check cannot
//! be answered at all, the run aborts rather than risk minting a duplicate
//! tenant for a principal whose state is unknown.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::{AuthError, AuthProvider, AuthUser};
use crate::scope::ScopeResolver;
use crate::settings;
use crate::store::{decode, tables, Query, SharedStore};
use crate::types::{Branch, Profile, Role, Tenant, Treasury};

// ============================================================================
// Input
// ============================================================================

#[derive(Debug, Clone)]
pub struct AdminCredentials {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

#[derive(Debug, Clone)]
pub struct BranchPlan {
    pub name: String,
    pub currency: String,
    pub is_main: bool,
}

#[derive(Debug, Clone)]
pub struct ProvisioningInput {
    pub company_name: String,
    pub industry: Option<String>,
    /// Exactly one entry must have `is_main = true`. The UI enforces this
    /// before submission; the orchestrator re-validates before persisting.
    pub branches: Vec<BranchPlan>,
    /// Required when no principal is already authenticated.
    pub admin: Option<AdminCredentials>,
}

// ============================================================================
// Steps, warnings, errors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ProvisioningStep {
    AuthResolve,
    TenantCreate,
    MainBranchCreate,
    AdditionalBranchesCreate,
    TreasuriesCreate,
    ProfileLink,
    SettingsFinalize,
    Done,
}

impl fmt::Display for ProvisioningStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProvisioningStep::AuthResolve => "auth-resolve",
            ProvisioningStep::TenantCreate => "tenant-create",
            ProvisioningStep::MainBranchCreate => "main-branch-create",
            ProvisioningStep::AdditionalBranchesCreate => "additional-branches-create",
            ProvisioningStep::TreasuriesCreate => "treasuries-create",
            ProvisioningStep::ProfileLink => "profile-link",
            ProvisioningStep::SettingsFinalize => "settings-finalize",
            ProvisioningStep::Done => "done",
        };
        f.write_str(name)
    }
}

/// A tolerated per-step failure. Present in the outcome, absent from the
/// success flag.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningWarning {
    pub step: ProvisioningStep,
    pub detail: String,
}

/// Fatal provisioning failures. Each maps to the stable code the calling
/// UI branches on.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("Admin credentials are required for first-time setup")]
    MissingAdminCredentials,

    #[error("{0}")]
    Validation(String),

    #[error("Sign-up failed: {0}")]
    SignupFailed(String),

    #[error("Sign-in failed: {0}")]
    SigninFailed(String),

    #[error("Could not verify existing setup: {0}")]
    LinkageCheckFailed(String),

    #[error("Failed to create company: {0}")]
    CreateTenantFailed(String),

    #[error("Failed to create main branch: {0}")]
    CreateMainBranchFailed(String),

    #[error("Failed to mark setup complete: {0}")]
    MarkSetupCompleteFailed(String),
}

impl ProvisioningError {
    pub fn code(&self) -> &'static str {
        match self {
            ProvisioningError::MissingAdminCredentials => "MISSING_ADMIN_CREDENTIALS",
            ProvisioningError::Validation(_) => "VALIDATION_ERROR",
            ProvisioningError::SignupFailed(_) => "SIGNUP_FAILED",
            ProvisioningError::SigninFailed(_) => "SIGNIN_FAILED",
            ProvisioningError::LinkageCheckFailed(_) => "LINKAGE_CHECK_FAILED",
            ProvisioningError::CreateTenantFailed(_) => "CREATE_TENANT_FAILED",
            ProvisioningError::CreateMainBranchFailed(_) => "CREATE_MAIN_BRANCH_FAILED",
            ProvisioningError::MarkSetupCompleteFailed(_) => "MARK_SETUP_COMPLETE_FAILED",
        }
    }
}

/// Result of a successful run. The caller can verify the profile linkage
/// before trusting the session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningOutcome {
    pub tenant_id: Uuid,
    pub main_branch_id: Uuid,
    pub profile: Profile,
    pub branch_ids: Vec<Uuid>,
    pub treasuries_created: usize,
    pub warnings: Vec<ProvisioningWarning>,
    /// True when the principal was already linked and the run
    /// short-circuited instead of creating a new tenant.
    pub resumed: bool,
}

// ============================================================================
// Orchestrator
// ============================================================================

pub async fn run_provisioning(
    store: &SharedStore,
    auth: &Arc<dyn AuthProvider>,
    resolver: &ScopeResolver,
    input: ProvisioningInput,
) -> Result<ProvisioningOutcome, ProvisioningError> {
    validate_plan(&input)?;
    let mut warnings: Vec<ProvisioningWarning> = Vec::new();

    // -- AuthResolve ---------------------------------------------------------
    let user = resolve_principal(auth, &input).await?;
    let full_name = resolve_full_name(&input, &user);

    // Re-entry: an already-linked principal keeps its tenant.
    if let Some(outcome) = resume_existing_linkage(store, resolver, &user).await? {
        return Ok(outcome);
    }

    // -- TenantCreate --------------------------------------------------------
    let tenant_row = json!({
        "name": input.company_name,
        "industry": input.industry,
        "created_at": Utc::now(),
    });
    let tenant: Tenant = store
        .insert(tables::TENANTS, tenant_row)
        .await
        .and_then(decode)
        .map_err(|e| ProvisioningError::CreateTenantFailed(e.to_string()))?;
    log::info!("provisioning: created tenant {}", tenant.id);

    // -- MainBranchCreate ----------------------------------------------------
    // validate_plan guarantees exactly one main entry.
    let main_plan = input
        .branches
        .iter()
        .find(|b| b.is_main)
        .ok_or_else(|| ProvisioningError::Validation("no main branch in plan".to_string()))?;
    let main_branch: Branch = store
        .insert(tables::BRANCHES, branch_row(tenant.id, main_plan))
        .await
        .and_then(decode)
        .map_err(|e| ProvisioningError::CreateMainBranchFailed(e.to_string()))?;

    // -- AdditionalBranchesCreate -------------------------------------------
    // Sequential on purpose: one remote call at a time keeps per-branch
    // error attribution simple. A failed branch is absent from the result
    // set, not a failed run.
    let mut branches = vec![main_branch.clone()];
    for plan in input.branches.iter().filter(|b| !b.is_main) {
        match store
            .insert(tables::BRANCHES, branch_row(tenant.id, plan))
            .await
            .and_then(decode::<Branch>)
        {
            Ok(branch) => branches.push(branch),
            Err(e) => {
                log::warn!("provisioning: branch '{}' failed: {e}", plan.name);
                warnings.push(ProvisioningWarning {
                    step: ProvisioningStep::AdditionalBranchesCreate,
                    detail: format!("branch '{}': {e}", plan.name),
                });
            }
        }
    }

    // -- TreasuriesCreate ----------------------------------------------------
    // One per branch that actually exists. A failure here is a latent
    // data-integrity gap the system does not self-repair.
    let mut treasuries_created = 0usize;
    for branch in &branches {
        let row = json!({
            "tenant_id": tenant.id,
            "branch_id": branch.id,
            "name": format!("{} Treasury", branch.name),
            "currency": branch.currency,
            "initial_balance": 0.0,
            "current_balance": 0.0,
            "created_at": Utc::now(),
        });
        match store
            .insert(tables::TREASURIES, row)
            .await
            .and_then(decode::<Treasury>)
        {
            Ok(treasury) => {
                log::debug!(
                    "provisioning: treasury {} for branch '{}'",
                    treasury.id,
                    branch.name
                );
                treasuries_created += 1;
            }
            Err(e) => {
                log::warn!(
                    "provisioning: treasury for branch '{}' failed: {e}",
                    branch.name
                );
                warnings.push(ProvisioningWarning {
                    step: ProvisioningStep::TreasuriesCreate,
                    detail: format!("treasury for branch '{}': {e}", branch.name),
                });
            }
        }
    }

    // -- ProfileLink ---------------------------------------------------------
    // Tolerated: the auth provider metadata written below is a secondary
    // source of the same linkage.
    let profile = Profile {
        id: user.id,
        email: user.email.clone(),
        full_name,
        role: Role::SuperAdmin,
        tenant_id: Some(tenant.id),
        branch_id: Some(main_branch.id),
        updated_at: Utc::now(),
    };
    let profile_row =
        serde_json::to_value(&profile).unwrap_or_else(|_| json!({ "id": profile.id }));
    if let Err(e) = store.upsert(tables::PROFILES, profile_row).await {
        log::warn!("provisioning: profile link failed: {e}");
        warnings.push(ProvisioningWarning {
            step: ProvisioningStep::ProfileLink,
            detail: e.to_string(),
        });
    }
    if let Err(e) = auth
        .update_user_metadata(json!({
            "tenant_id": tenant.id,
            "branch_id": main_branch.id,
            "role": Role::SuperAdmin,
        }))
        .await
    {
        log::warn!("provisioning: metadata linkage failed: {e}");
        warnings.push(ProvisioningWarning {
            step: ProvisioningStep::ProfileLink,
            detail: format!("auth metadata: {e}"),
        });
    }

    // -- SettingsFinalize ----------------------------------------------------
    // An unmarked system is indistinguishable from a never-provisioned one,
    // so both the update and the upsert fallback failing is fatal.
    settings::mark_setup_complete(store, user.id)
        .await
        .map_err(|e| ProvisioningError::MarkSetupCompleteFailed(e.to_string()))?;

    // -- Done ----------------------------------------------------------------
    resolver.set_tenant(tenant.id);
    resolver.set_branch(main_branch.id);
    log::info!(
        "provisioning: done — tenant {}, {} branches, {} treasuries, {} warnings",
        tenant.id,
        branches.len(),
        treasuries_created,
        warnings.len()
    );

    Ok(ProvisioningOutcome {
        tenant_id: tenant.id,
        main_branch_id: main_branch.id,
        profile,
        branch_ids: branches.iter().map(|b| b.id).collect(),
        treasuries_created,
        warnings,
        resumed: false,
    })
}

// ============================================================================
// Steps
// ============================================================================

fn validate_plan(input: &ProvisioningInput) -> Result<(), ProvisioningError> {
    if input.company_name.trim().is_empty() {
        return Err(ProvisioningError::Validation(
            "Company name is required".to_string(),
        ));
    }
    if input.branches.is_empty() {
        return Err(ProvisioningError::Validation(
            "At least one branch is required".to_string(),
        ));
    }
    let main_count = input.branches.iter().filter(|b| b.is_main).count();
    if main_count != 1 {
        return Err(ProvisioningError::Validation(format!(
            "Exactly one main branch is required, got {main_count}"
        )));
    }
    Ok(())
}

/// AuthResolve: reuse an authenticated principal, or register one from the
/// supplied admin credentials. Sign-up hitting an already-registered email
/// falls back to sign-in — this self-heals a partial previous run.
async fn resolve_principal(
    auth: &Arc<dyn AuthProvider>,
    input: &ProvisioningInput,
) -> Result<AuthUser, ProvisioningError> {
    if let Some(user) = auth
        .current_user()
        .await
        .map_err(|e| ProvisioningError::SigninFailed(e.to_string()))?
    {
        return Ok(user);
    }

    let creds = input
        .admin
        .as_ref()
        .ok_or(ProvisioningError::MissingAdminCredentials)?;

    match auth
        .sign_up(&creds.email, &creds.password, &creds.full_name)
        .await
    {
        Ok(user) => Ok(user),
        Err(AuthError::AlreadyRegistered) => {
            log::info!("provisioning: principal exists, signing in instead");
            auth.sign_in(&creds.email, &creds.password)
                .await
                .map_err(|e| ProvisioningError::SigninFailed(e.to_string()))
        }
        Err(e) => Err(ProvisioningError::SignupFailed(e.to_string())),
    }
}

fn resolve_full_name(input: &ProvisioningInput, user: &AuthUser) -> String {
    input
        .admin
        .as_ref()
        .map(|c| c.full_name.clone())
        .or_else(|| {
            user.metadata["full_name"]
                .as_str()
                .map(str::to_string)
        })
        .unwrap_or_else(|| user.email.clone())
}

/// If this principal's profile already carries a tenant, seed the resolver
/// from the existing linkage and report success without creating anything.
/// Only a missing profile means "first run": any other failure leaves the
/// linkage state unknown, and proceeding could mint a second tenant, so the
/// run aborts instead.
async fn resume_existing_linkage(
    store: &SharedStore,
    resolver: &ScopeResolver,
    user: &AuthUser,
) -> Result<Option<ProvisioningOutcome>, ProvisioningError> {
    let row = match store
        .select_single(tables::PROFILES, Query::new().eq("id", user.id))
        .await
    {
        Ok(row) => row,
        Err(e) if e.is_missing() => return Ok(None),
        Err(e) => return Err(ProvisioningError::LinkageCheckFailed(e.to_string())),
    };
    let profile: Profile =
        decode(row).map_err(|e| ProvisioningError::LinkageCheckFailed(e.to_string()))?;
    let Some(tenant_id) = profile.tenant_id else {
        return Ok(None);
    };

    // Prefer the tenant's actual main branch; the profile's branch column
    // is a fallback for runs where that lookup fails.
    let main_branch_id = match store
        .select_single(
            tables::BRANCHES,
            Query::new().eq("tenant_id", tenant_id).eq("is_main", true),
        )
        .await
        .and_then(decode::<Branch>)
    {
        Ok(branch) => branch.id,
        Err(_) => profile.branch_id.ok_or_else(|| {
            ProvisioningError::LinkageCheckFailed(format!(
                "principal is linked to tenant {tenant_id} but no main branch is resolvable"
            ))
        })?,
    };

    log::info!("provisioning: principal already linked to tenant {tenant_id}, resuming");
    resolver.set_tenant(tenant_id);
    resolver.set_branch(main_branch_id);
    Ok(Some(ProvisioningOutcome {
        tenant_id,
        main_branch_id,
        profile,
        branch_ids: Vec::new(),
        treasuries_created: 0,
        warnings: Vec::new(),
        resumed: true,
    }))
}

fn branch_row(tenant_id: Uuid, plan: &BranchPlan) -> serde_json::Value {
    json!({
        "tenant_id": tenant_id,
        "name": plan.name,
        "currency": plan.currency,
        "is_main": plan.is_main,
        "created_at": Utc::now(),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryAuth;
    use crate::store::memory::{MemoryStore, StoreOp};
    use crate::store::StoreError;

    fn plan(additional: &[&str]) -> Vec<BranchPlan> {
        let mut branches = vec![BranchPlan {
            name: "Head Office".to_string(),
            currency: "USD".to_string(),
            is_main: true,
        }];
        for name in additional {
            branches.push(BranchPlan {
                name: name.to_string(),
                currency: "USD".to_string(),
                is_main: false,
            });
        }
        branches
    }

    fn input(branches: Vec<BranchPlan>) -> ProvisioningInput {
        ProvisioningInput {
            company_name: "Acme Contracting".to_string(),
            industry: Some("construction".to_string()),
            branches,
            admin: Some(AdminCredentials {
                email: "admin@acme.test".to_string(),
                password: "s3cret-pass".to_string(),
                full_name: "Acme Admin".to_string(),
            }),
        }
    }

    struct Fixture {
        memory: Arc<MemoryStore>,
        store: SharedStore,
        auth_impl: Arc<MemoryAuth>,
        auth: Arc<dyn AuthProvider>,
        resolver: ScopeResolver,
    }

    fn fixture(auth_impl: MemoryAuth) -> Fixture {
        let _ = env_logger::builder().is_test(true).try_init();
        let memory = Arc::new(MemoryStore::new());
        let auth_impl = Arc::new(auth_impl);
        Fixture {
            store: memory.clone(),
            memory,
            auth: auth_impl.clone(),
            auth_impl,
            resolver: ScopeResolver::new(),
        }
    }

    #[tokio::test]
    async fn test_happy_path_creates_full_hierarchy() {
        let f = fixture(MemoryAuth::new());
        let outcome =
            run_provisioning(&f.store, &f.auth, &f.resolver, input(plan(&["East", "West"])))
                .await
                .unwrap();

        assert!(!outcome.resumed);
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.branch_ids.len(), 3);
        assert_eq!(outcome.treasuries_created, 3);

        assert_eq!(f.memory.rows(tables::TENANTS).len(), 1);
        let branches = f.memory.rows(tables::BRANCHES);
        assert_eq!(branches.len(), 3);
        let main_count = branches
            .iter()
            .filter(|b| b["is_main"] == serde_json::json!(true))
            .count();
        assert_eq!(main_count, 1);
        let treasuries: Vec<Treasury> =
            crate::store::decode_rows(f.memory.rows(tables::TREASURIES)).unwrap();
        assert_eq!(treasuries.len(), 3);
        assert!(treasuries
            .iter()
            .all(|t| t.tenant_id == outcome.tenant_id && t.current_balance == 0.0));

        // Profile linked to tenant + main branch
        let profiles = f.memory.rows(tables::PROFILES);
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0]["role"], "super_admin");
        assert_eq!(profiles[0]["tenant_id"], outcome.tenant_id.to_string());
        assert_eq!(profiles[0]["branch_id"], outcome.main_branch_id.to_string());

        // Resolver seeded, settings finalized
        assert_eq!(f.resolver.tenant(), Some(outcome.tenant_id));
        assert_eq!(f.resolver.branch(), Some(outcome.main_branch_id));
        assert!(settings::setup_complete(&f.store).await.unwrap());
    }

    #[tokio::test]
    async fn test_branch_failure_is_tolerated_and_skips_its_treasury() {
        let f = fixture(MemoryAuth::new());
        f.memory.fail_matching(
            tables::BRANCHES,
            StoreOp::Insert,
            |row| row["name"] == serde_json::json!("East"),
            "injected",
        );

        let outcome =
            run_provisioning(&f.store, &f.auth, &f.resolver, input(plan(&["East", "West"])))
                .await
                .unwrap();

        assert_eq!(outcome.branch_ids.len(), 2);
        assert_eq!(outcome.treasuries_created, 2);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(
            outcome.warnings[0].step,
            ProvisioningStep::AdditionalBranchesCreate
        );
        assert_eq!(f.memory.rows(tables::TREASURIES).len(), 2);
    }

    #[tokio::test]
    async fn test_main_branch_failure_is_fatal() {
        let f = fixture(MemoryAuth::new());
        f.memory.fail_matching(
            tables::BRANCHES,
            StoreOp::Insert,
            |row| row["is_main"] == serde_json::json!(true),
            "injected",
        );
        let err = run_provisioning(&f.store, &f.auth, &f.resolver, input(plan(&[])))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CREATE_MAIN_BRANCH_FAILED");
        // The tenant row is orphaned — the workflow is not transactional.
        assert_eq!(f.memory.rows(tables::TENANTS).len(), 1);
    }

    #[tokio::test]
    async fn test_tenant_failure_is_fatal() {
        let f = fixture(MemoryAuth::new());
        f.memory
            .fail_next(tables::TENANTS, StoreOp::Insert, "injected");
        let err = run_provisioning(&f.store, &f.auth, &f.resolver, input(plan(&[])))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CREATE_TENANT_FAILED");
        assert!(f.resolver.tenant().is_none());
    }

    #[tokio::test]
    async fn test_missing_credentials_is_fatal() {
        let f = fixture(MemoryAuth::new());
        let mut no_creds = input(plan(&[]));
        no_creds.admin = None;
        let err = run_provisioning(&f.store, &f.auth, &f.resolver, no_creds)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "MISSING_ADMIN_CREDENTIALS");
    }

    #[tokio::test]
    async fn test_branch_plan_revalidated() {
        let f = fixture(MemoryAuth::new());
        let mut two_mains = input(plan(&[]));
        two_mains.branches.push(BranchPlan {
            name: "Second HQ".to_string(),
            currency: "USD".to_string(),
            is_main: true,
        });
        let err = run_provisioning(&f.store, &f.auth, &f.resolver, two_mains)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(f.memory.rows(tables::TENANTS).is_empty());
    }

    #[tokio::test]
    async fn test_already_registered_falls_back_to_sign_in() {
        let f = fixture(MemoryAuth::new().with_registered("admin@acme.test", "s3cret-pass"));
        let outcome = run_provisioning(&f.store, &f.auth, &f.resolver, input(plan(&[])))
            .await
            .unwrap();
        assert!(!outcome.resumed);
        assert_eq!(f.memory.rows(tables::TENANTS).len(), 1);
    }

    #[tokio::test]
    async fn test_wrong_password_after_fallback_is_fatal() {
        let f = fixture(MemoryAuth::new().with_registered("admin@acme.test", "different"));
        let err = run_provisioning(&f.store, &f.auth, &f.resolver, input(plan(&[])))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SIGNIN_FAILED");
    }

    #[tokio::test]
    async fn test_rerun_with_linked_profile_does_not_duplicate_tenant() {
        let f = fixture(MemoryAuth::new());
        let first = run_provisioning(&f.store, &f.auth, &f.resolver, input(plan(&["East"])))
            .await
            .unwrap();

        f.resolver.clear();
        let second = run_provisioning(&f.store, &f.auth, &f.resolver, input(plan(&["East"])))
            .await
            .unwrap();

        assert!(second.resumed);
        assert_eq!(second.tenant_id, first.tenant_id);
        assert_eq!(second.main_branch_id, first.main_branch_id);
        assert_eq!(f.memory.rows(tables::TENANTS).len(), 1);
        assert_eq!(f.resolver.tenant(), Some(first.tenant_id));
    }

    #[tokio::test]
    async fn test_unverifiable_linkage_aborts_before_tenant_create() {
        let f = fixture(MemoryAuth::new());
        run_provisioning(&f.store, &f.auth, &f.resolver, input(plan(&[])))
            .await
            .unwrap();

        // A transient failure on the linkage check must not read as "no
        // profile" — that path would mint a second tenant.
        f.resolver.clear();
        f.memory
            .fail_next(tables::PROFILES, StoreOp::Select, "injected");
        let err = run_provisioning(&f.store, &f.auth, &f.resolver, input(plan(&[])))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "LINKAGE_CHECK_FAILED");
        assert_eq!(f.memory.rows(tables::TENANTS).len(), 1);

        // Once the store recovers, re-entry resumes the existing tenant.
        let outcome = run_provisioning(&f.store, &f.auth, &f.resolver, input(plan(&[])))
            .await
            .unwrap();
        assert!(outcome.resumed);
        assert_eq!(f.memory.rows(tables::TENANTS).len(), 1);
    }

    #[tokio::test]
    async fn test_profile_link_failure_is_tolerated() {
        let f = fixture(MemoryAuth::new());
        f.memory
            .fail_next(tables::PROFILES, StoreOp::Upsert, "injected");
        let outcome = run_provisioning(&f.store, &f.auth, &f.resolver, input(plan(&[])))
            .await
            .unwrap();
        assert!(outcome
            .warnings
            .iter()
            .any(|w| w.step == ProvisioningStep::ProfileLink));
        // The run still finalized settings.
        assert!(settings::setup_complete(&f.store).await.unwrap());
    }

    #[tokio::test]
    async fn test_metadata_failure_is_tolerated() {
        let f = fixture(MemoryAuth::new());
        f.auth_impl.fail_metadata_updates();
        let outcome = run_provisioning(&f.store, &f.auth, &f.resolver, input(plan(&[])))
            .await
            .unwrap();
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].step, ProvisioningStep::ProfileLink);
    }

    #[tokio::test]
    async fn test_settings_finalize_failure_is_fatal() {
        let f = fixture(MemoryAuth::new());
        f.memory
            .fail_next(tables::SYSTEM_SETTINGS, StoreOp::Update, "injected");
        f.memory
            .fail_next(tables::SYSTEM_SETTINGS, StoreOp::Upsert, "injected");
        let err = run_provisioning(&f.store, &f.auth, &f.resolver, input(plan(&[])))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "MARK_SETUP_COMPLETE_FAILED");
    }

    #[tokio::test]
    async fn test_reused_session_needs_no_credentials() {
        let auth = MemoryAuth::new();
        auth.sign_up("admin@acme.test", "s3cret-pass", "Acme Admin")
            .await
            .unwrap();
        let f = fixture(auth);
        let mut no_creds = input(plan(&[]));
        no_creds.admin = None;
        let outcome = run_provisioning(&f.store, &f.auth, &f.resolver, no_creds)
            .await
            .unwrap();
        assert_eq!(outcome.profile.full_name, "Acme Admin");
    }

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(
            ProvisioningError::SignupFailed(StoreError::NoRows.to_string()).code(),
            "SIGNUP_FAILED"
        );
        assert_eq!(
            ProvisioningError::MarkSetupCompleteFailed("x".into()).code(),
            "MARK_SETUP_COMPLETE_FAILED"
        );
    }
}
