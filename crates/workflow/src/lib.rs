//! `changeflow-workflow`: the change-request services.
//!
//! - [`RequestLifecycle`]: the request state machine
//! - [`IdentityDirectory`]: provisioning, administration and login records
//! - [`Analytics`] and [`AuditReports`]: admin read models
//! - [`Outcome`]: the envelope the boundary layer serializes
//!
//! Every service takes the acting [`Caller`](changeflow_auth::Caller)
//! explicitly and writes one audit record per call through an
//! [`AuditSink`](changeflow_audit::AuditSink).

pub mod analytics;
pub mod directory;
pub mod engine;
mod guard;
pub mod identity;
pub mod lifecycle;
pub mod outcome;
pub mod reports;
pub mod request;

pub use analytics::{Analytics, Summary};
pub use directory::{EMPLOYEE_NUMBER_BASE, IdentityDirectory};
pub use engine::{Engine, MemoryIdentities, MemoryRequests, MemoryTrail};
pub use identity::{Identity, IdentityPatch, NewIdentity};
pub use lifecycle::{RequestLifecycle, RequestQuery};
pub use outcome::Outcome;
pub use reports::AuditReports;
pub use request::{ChangeType, Request, RequestDraft, RequestPatch, RiskLevel, Verdict};
