//! Policy checks and audit emission shared by every service.

use serde_json::{Value as JsonValue, json};

use changeflow_audit::{AuditAction, AuditSink, NewAuditRecord};
use changeflow_auth::{Action, Caller, Resource, decide};
use changeflow_core::{DomainResult, ErrorKind, IdentityId, RequestId};

/// Run the policy and turn a denial into a domain error.
pub(crate) fn authorize(caller: &Caller, action: Action, resource: Option<&Resource>) -> DomainResult<()> {
    decide(caller.actor(), action, resource)
        .into_result()
        .map_err(|denial| {
            tracing::warn!(
                actor_id = %caller.id(),
                role = %caller.role(),
                action = ?denial.action,
                denial_kind = ?denial.kind,
                current_status = ?denial.current_status,
                "policy denied action"
            );
            denial.into_error()
        })
}

/// One operation call, about to be written to the audit trail.
///
/// Every call ends in exactly one record: the success tag, `ACCESS_DENIED`
/// for a `Forbidden` error, or `OPERATION_REJECTED` for any other error.
pub(crate) struct Attempt<'a> {
    caller: &'a Caller,
    name: &'static str,
    success: AuditAction,
    subject: Option<RequestId>,
    target: Option<IdentityId>,
}

impl<'a> Attempt<'a> {
    pub(crate) fn new(caller: &'a Caller, name: &'static str, success: AuditAction) -> Self {
        Self {
            caller,
            name,
            success,
            subject: None,
            target: None,
        }
    }

    pub(crate) fn subject(mut self, request: RequestId) -> Self {
        self.subject = Some(request);
        self
    }

    pub(crate) fn target(mut self, identity: IdentityId) -> Self {
        self.target = Some(identity);
        self
    }

    pub(crate) fn record<A, T>(
        self,
        sink: &A,
        result: &DomainResult<T>,
        detail: impl FnOnce(&T) -> Option<JsonValue>,
    ) where
        A: AuditSink + ?Sized,
    {
        let (action, detail) = match result {
            Ok(value) => (self.success, detail(value)),
            Err(err) => {
                let action = if err.kind() == ErrorKind::Forbidden {
                    AuditAction::AccessDenied
                } else {
                    AuditAction::OperationRejected
                };
                let detail = json!({
                    "attempted": self.name,
                    "error_kind": err.kind().as_str(),
                    "message": err.message(),
                });
                (action, Some(detail))
            }
        };

        let mut entry = NewAuditRecord::new(self.caller.id(), action, self.caller.origin())
            .maybe_subject(self.subject)
            .maybe_target(self.target);
        if let Some(detail) = detail {
            entry = entry.detail(detail);
        }
        // Best effort: the sink logs and swallows its own failures.
        let _ = sink.record(entry);
    }
}
