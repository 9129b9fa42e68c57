//! `changeflow-auth`: identity leaf and authorization policy.
//!
//! This crate is intentionally decoupled from storage and transport: callers
//! hand it an already-authenticated [`Actor`] and record the outcome themselves.

pub mod actor;
pub mod policy;
pub mod roles;

pub use actor::{Actor, Caller};
pub use policy::{
    Action, CapabilityRow, Decision, Denial, DenialKind, Resource, auditor_visible_statuses,
    capability_matrix, decide,
};
pub use roles::Role;
