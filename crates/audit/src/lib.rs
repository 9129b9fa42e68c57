//! `changeflow-audit`: the append-only audit trail.
//!
//! Every operation in the system leaves exactly one [`AuditRecord`] behind.
//! Records are written through an [`AuditSink`], which never fails the caller,
//! and are stored behind [`AppendOnly`], which refuses updates and deletes.

pub mod record;
pub mod store;
pub mod trail;

pub use record::{AuditAction, AuditRecord, NewAuditRecord};
pub use store::AppendOnly;
pub use trail::{AuditExport, AuditQuery, AuditRow, AuditSink, AuditTrail};
