//! Multi-tenant business-management core.
//!
//! The crate owns the three pieces of this system that carry real risk:
//!
//! - **Provisioning** (`provisioning`): the one-time onboarding workflow that
//!   bootstraps an authenticated principal, a tenant, its branches, one
//!   treasury per branch, the admin profile, and the setup-complete flag —
//!   a sequence of remote writes with no cross-call atomicity.
//! - **Scope isolation** (`scope` + `guard`): every read and write is scoped
//!   to a resolved tenant (and branch, where the entity is branch-local) and
//!   fails closed when that scope is missing.
//! - **The attendance cascade** (`services::attendance`): attendance batches
//!   insert atomically; the derived labor payments are best-effort fan-out
//!   that never rolls the batch back.
//!
//! Everything reaches the backing store through the `store::DataStore` trait
//! and the auth provider through `auth::AuthProvider`, so the whole core runs
//! against the in-memory doubles in tests.

pub mod auth;
pub mod error;
pub mod gate;
pub mod guard;
pub mod provisioning;
pub mod scope;
pub mod services;
pub mod settings;
pub mod store;
pub mod types;

pub use error::CoreError;
pub use scope::ScopeResolver;
pub use store::{DataStore, SharedStore};
