//! Feature services.
//!
//! Each service is a set of free functions over the shared store handle and
//! the scope resolver. Every function resolves its scope once at entry
//! through `crate::guard` and threads the snapshot through: reads return an
//! empty collection when scope is unresolved, writes reject with a coded
//! error, and persisted rows carry tenant/branch columns stamped by the
//! guard — never taken from caller input.

pub mod attendance;
pub mod categories;
pub mod payments;
pub mod quotations;
pub mod workers;
