//! Setup-Completion Gate — the routing guard in front of every navigation.
//!
//! Role is checked before scope: any principal whose role is not the
//! provisioning role renders unconditionally, regardless of completion
//! status. Only the provisioning role pays for the completion query, with
//! bounded retry that distinguishes "no row" (not completed, no further
//! retry) from transient store errors (retried with linearly increasing
//! delay). While role or completion cannot be resolved, the caller renders
//! a blocking placeholder, not content.

use std::sync::Arc;
use std::time::Duration;

use crate::auth::AuthProvider;
use crate::settings;
use crate::store::{decode, tables, Query, SharedStore};
use crate::types::{Profile, Role};

/// What the router should do with the requested navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Render the requested content.
    Render,
    /// Setup is incomplete — send the principal to the provisioning entry
    /// point.
    RedirectToSetup,
    /// Setup is complete but the principal is on the provisioning entry
    /// point — send them into the app.
    RedirectToApp,
    /// Role or completion status could not be resolved; show a blocking
    /// placeholder.
    Pending,
}

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(300),
        }
    }
}

/// Evaluate a navigation with the default retry budget.
pub async fn evaluate(
    store: &SharedStore,
    auth: &Arc<dyn AuthProvider>,
    on_setup_route: bool,
) -> GateDecision {
    evaluate_with(store, auth, on_setup_route, &GateConfig::default()).await
}

pub async fn evaluate_with(
    store: &SharedStore,
    auth: &Arc<dyn AuthProvider>,
    on_setup_route: bool,
    config: &GateConfig,
) -> GateDecision {
    // Role first — the non-provisioning bypass takes precedence over every
    // other check.
    match resolve_role(store, auth).await {
        RoleResolution::NonProvisioning => return GateDecision::Render,
        RoleResolution::Unresolved => return GateDecision::Pending,
        RoleResolution::Provisioning => {}
    }

    let Some(completed) = completion_with_retry(store, config).await else {
        return GateDecision::Pending;
    };

    match (completed, on_setup_route) {
        (false, false) => GateDecision::RedirectToSetup,
        (false, true) => GateDecision::Render,
        (true, true) => GateDecision::RedirectToApp,
        (true, false) => GateDecision::Render,
    }
}

enum RoleResolution {
    Provisioning,
    NonProvisioning,
    Unresolved,
}

/// Resolve the current principal's role from its profile. No principal, or
/// a principal without a profile row yet, walks the provisioning path —
/// that is exactly the first-run population.
async fn resolve_role(store: &SharedStore, auth: &Arc<dyn AuthProvider>) -> RoleResolution {
    let user = match auth.current_user().await {
        Ok(Some(user)) => user,
        Ok(None) => return RoleResolution::Provisioning,
        Err(e) => {
            log::warn!("gate: could not resolve principal: {e}");
            return RoleResolution::Unresolved;
        }
    };

    match store
        .select_single(tables::PROFILES, Query::new().eq("id", user.id))
        .await
        .and_then(decode::<Profile>)
    {
        Ok(profile) if profile.role == Role::SuperAdmin => RoleResolution::Provisioning,
        Ok(_) => RoleResolution::NonProvisioning,
        Err(e) if e.is_missing() => RoleResolution::Provisioning,
        Err(e) => {
            log::warn!("gate: could not resolve role: {e}");
            RoleResolution::Unresolved
        }
    }
}

/// Query completion status with bounded retry. "No row" is already mapped
/// to `false` inside the settings read and never retried; only transient
/// store errors burn extra attempts.
async fn completion_with_retry(store: &SharedStore, config: &GateConfig) -> Option<bool> {
    let attempts = config.attempts.max(1);
    for attempt in 1..=attempts {
        match settings::setup_complete(store).await {
            Ok(completed) => return Some(completed),
            Err(e) if e.is_transient() && attempt < attempts => {
                let delay = config.base_delay * attempt;
                log::warn!(
                    "gate: completion check {attempt}/{attempts} failed: {e} (sleep {delay:?})"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                log::warn!("gate: completion check failed: {e}");
                return None;
            }
        }
    }
    None
}
