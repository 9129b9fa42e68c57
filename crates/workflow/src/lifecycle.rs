//! Request lifecycle service.
//!
//! Owns every write to a request's status, verdict and rejection reason.
//! Each operation follows the same shape:
//!
//! 1. load the request
//! 2. ask the policy, using the caller's role and the request's current status
//! 3. apply the change to a copy
//! 4. save it conditionally on the version that was loaded
//! 5. emit exactly one audit record, whatever the outcome
//!
//! If the conditional save loses a race, the whole check is re-run against the
//! fresh state, so of two concurrent approvals only one can succeed; the other
//! sees the new status and fails with `InvalidTransition`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use changeflow_audit::{AuditAction, AuditSink};
use changeflow_auth::{Action, Caller, Role, auditor_visible_statuses};
use changeflow_core::{
    AggregateRoot, DomainError, DomainResult, ExpectedVersion, IdentityId, RequestId, RequestStatus,
};
use changeflow_infra::{Collection, EngineConfig, FieldValue, Filter, Page, Pagination, StoreError};

use crate::guard::{Attempt, authorize};
use crate::request::{ChangeType, Request, RequestDraft, RequestPatch, RiskLevel, rejection_reason};

/// How many times a lost compare-and-set is re-evaluated before giving up.
pub(crate) const MAX_SAVE_ATTEMPTS: usize = 3;

/// Listing filters. Every field narrows the result; none widen what the
/// caller's role may see.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestQuery {
    #[serde(default)]
    pub statuses: Vec<RequestStatus>,
    pub risk_level: Option<RiskLevel>,
    pub change_type: Option<ChangeType>,
    pub created_by: Option<IdentityId>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    /// Case-insensitive substring of title or description.
    pub search: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// The request state machine, guarded by the authorization policy.
#[derive(Debug)]
pub struct RequestLifecycle<R, A> {
    requests: R,
    audit: A,
    config: EngineConfig,
}

impl<R, A> RequestLifecycle<R, A>
where
    R: Collection<Request>,
    A: AuditSink,
{
    pub fn new(requests: R, audit: A, config: EngineConfig) -> Self {
        Self {
            requests,
            audit,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn submit(&self, caller: &Caller, draft: RequestDraft) -> DomainResult<Request> {
        let result = self.submit_inner(caller, draft);
        let attempt = Attempt::new(caller, "submit", AuditAction::RequestCreated);
        let attempt = match &result {
            Ok(request) => attempt.subject(request.id_typed()),
            Err(_) => attempt,
        };
        attempt.record(&self.audit, &result, |request| {
            Some(json!({
                "title": request.title(),
                "change_type": request.change_type(),
                "risk_level": request.risk_level(),
            }))
        });
        result
    }

    fn submit_inner(&self, caller: &Caller, draft: RequestDraft) -> DomainResult<Request> {
        authorize(caller, Action::CreateRequest, None)?;
        let request = Request::submit(caller.id(), draft, &self.config, Utc::now())?;
        let stored = self.requests.insert(request)?;
        tracing::info!(
            request_id = %stored.id_typed(),
            actor_id = %caller.id(),
            to = %stored.status(),
            "request submitted"
        );
        Ok(stored)
    }

    /// Fetch one request. Allowed reads are not audited; denied ones are.
    pub fn get(&self, caller: &Caller, id: RequestId) -> DomainResult<Request> {
        let request = self.load(id)?;
        let result = authorize(caller, Action::ReadRequest, Some(&request.resource())).map(|()| request);
        if result.is_err() {
            Attempt::new(caller, "get", AuditAction::AccessDenied)
                .subject(id)
                .record(&self.audit, &result, |_| None);
        }
        result
    }

    /// Requests visible to the caller, newest first.
    pub fn list(&self, caller: &Caller, query: &RequestQuery) -> DomainResult<Page<Request>> {
        let allowed = authorize(caller, Action::ReadRequest, None);
        if allowed.is_err() {
            Attempt::new(caller, "list", AuditAction::AccessDenied).record(&self.audit, &allowed, |_| None);
        }
        allowed?;

        let mut filter = match caller.role() {
            Role::Employee => Filter::new().eq("created_by", FieldValue::id(caller.id())),
            Role::Auditor => Filter::new().one_of("status", status_values(auditor_visible_statuses())),
            Role::Manager | Role::Admin => Filter::new(),
        };
        if !query.statuses.is_empty() {
            filter = filter.one_of("status", status_values(&query.statuses));
        }
        if let Some(risk) = query.risk_level {
            filter = filter.eq("risk_level", risk.as_str());
        }
        if let Some(change_type) = query.change_type {
            filter = filter.eq("change_type", change_type.as_str());
        }
        if let Some(creator) = query.created_by {
            filter = filter.eq("created_by", FieldValue::id(creator));
        }
        filter = filter.between("created_at", query.created_from, query.created_to);
        if let Some(term) = query.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            filter = filter.matches_any(&["title", "description"], &regex::escape(term))?;
        }

        let pagination = Pagination::bounded(
            query.limit,
            query.offset,
            self.config.default_page_size,
            self.config.max_page_size,
        );
        Ok(self.requests.find(&filter, pagination)?)
    }

    /// Change content fields. Status and verdict are never touched.
    pub fn update(&self, caller: &Caller, id: RequestId, patch: RequestPatch) -> DomainResult<Request> {
        let fields: Vec<&str> = [
            patch.title.as_ref().map(|_| "title"),
            patch.description.as_ref().map(|_| "description"),
            patch.change_type.map(|_| "change_type"),
            patch.risk_level.map(|_| "risk_level"),
        ]
        .into_iter()
        .flatten()
        .collect();

        let result = self.mutate(caller, id, Action::UpdateRequest, |request, now| {
            request.apply_patch(patch.clone(), &self.config, now)
        });
        Attempt::new(caller, "update", AuditAction::RequestUpdated)
            .subject(id)
            .record(&self.audit, &result, |_| Some(json!({ "fields": fields })));
        result
    }

    /// Pending → Approved. Manager only.
    pub fn approve(&self, caller: &Caller, id: RequestId) -> DomainResult<Request> {
        let result = self.mutate(caller, id, Action::ApproveRequest, |request, now| {
            request.approve(caller.id(), now)
        });
        Attempt::new(caller, "approve", AuditAction::RequestApproved)
            .subject(id)
            .record(&self.audit, &result, transition_detail(RequestStatus::Pending));
        result
    }

    /// Pending → Rejected with a reason. Manager only.
    ///
    /// The reason is checked before anything else, so a short reason is a
    /// `ValidationError` whatever the caller or the request's state.
    pub fn reject(&self, caller: &Caller, id: RequestId, reason: &str) -> DomainResult<Request> {
        let result = rejection_reason(reason, &self.config).and_then(|reason| {
            self.mutate(caller, id, Action::RejectRequest, |request, now| {
                request.reject(caller.id(), reason.clone(), now)
            })
        });
        Attempt::new(caller, "reject", AuditAction::RequestRejected)
            .subject(id)
            .record(&self.audit, &result, |request| {
                Some(json!({
                    "from": RequestStatus::Pending,
                    "to": request.status(),
                    "reason": request.rejection_reason(),
                }))
            });
        result
    }

    /// Approved → Sent to Audit.
    pub fn send_to_audit(&self, caller: &Caller, id: RequestId) -> DomainResult<Request> {
        self.move_to(
            caller,
            id,
            Action::SendToAudit,
            RequestStatus::SentToAudit,
            ("send_to_audit", AuditAction::RequestSentToAudit),
        )
    }

    /// Approved → In Progress.
    pub fn start(&self, caller: &Caller, id: RequestId) -> DomainResult<Request> {
        self.move_to(
            caller,
            id,
            Action::StartRequest,
            RequestStatus::InProgress,
            ("start", AuditAction::RequestStarted),
        )
    }

    /// Approved or In Progress → Completed.
    pub fn complete(&self, caller: &Caller, id: RequestId) -> DomainResult<Request> {
        self.move_to(
            caller,
            id,
            Action::CompleteRequest,
            RequestStatus::Completed,
            ("complete", AuditAction::RequestCompleted),
        )
    }

    /// Sent to Audit → Solved.
    pub fn resolve(&self, caller: &Caller, id: RequestId) -> DomainResult<Request> {
        self.move_to(
            caller,
            id,
            Action::ResolveRequest,
            RequestStatus::Solved,
            ("resolve", AuditAction::RequestSolved),
        )
    }

    /// Any active status → Cancelled.
    pub fn cancel(&self, caller: &Caller, id: RequestId) -> DomainResult<Request> {
        self.move_to(
            caller,
            id,
            Action::CancelRequest,
            RequestStatus::Cancelled,
            ("cancel", AuditAction::RequestCancelled),
        )
    }

    /// Remove a request. Creators may delete their own pending requests;
    /// admins may delete any.
    pub fn delete(&self, caller: &Caller, id: RequestId) -> DomainResult<()> {
        let result = self.delete_inner(caller, id);
        Attempt::new(caller, "delete", AuditAction::RequestDeleted)
            .subject(id)
            .record(&self.audit, &result, |status| Some(json!({ "status": status })));
        result.map(|_| ())
    }

    fn delete_inner(&self, caller: &Caller, id: RequestId) -> DomainResult<RequestStatus> {
        for _ in 0..MAX_SAVE_ATTEMPTS {
            let current = self.load(id)?;
            authorize(caller, Action::DeleteRequest, Some(&current.resource()))?;
            match self
                .requests
                .delete_by_id(&id, ExpectedVersion::Exact(current.version()))
            {
                Ok(()) => {
                    tracing::info!(
                        request_id = %id,
                        actor_id = %caller.id(),
                        from = %current.status(),
                        "request deleted"
                    );
                    return Ok(current.status());
                }
                Err(StoreError::Conflict { .. }) => {
                    tracing::debug!(request_id = %id, "delete lost a race, re-checking");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(contended(id))
    }

    fn move_to(
        &self,
        caller: &Caller,
        id: RequestId,
        action: Action,
        to: RequestStatus,
        (name, tag): (&'static str, AuditAction),
    ) -> DomainResult<Request> {
        let mut from = None;
        let result = self.mutate(caller, id, action, |request, now| {
            from = Some(request.status());
            request.transition(to, now)
        });
        Attempt::new(caller, name, tag)
            .subject(id)
            .record(&self.audit, &result, |request| {
                Some(json!({ "from": from, "to": request.status() }))
            });
        result
    }

    /// Load, authorize, apply and conditionally save, re-checking on conflict.
    fn mutate<F>(&self, caller: &Caller, id: RequestId, action: Action, mut apply: F) -> DomainResult<Request>
    where
        F: FnMut(&mut Request, DateTime<Utc>) -> DomainResult<()>,
    {
        for _ in 0..MAX_SAVE_ATTEMPTS {
            let current = self.load(id)?;
            authorize(caller, action, Some(&current.resource()))?;

            let mut next = current.clone();
            apply(&mut next, Utc::now())?;

            match self.requests.save(next, ExpectedVersion::Exact(current.version())) {
                Ok(saved) => {
                    tracing::info!(
                        request_id = %id,
                        actor_id = %caller.id(),
                        from = %current.status(),
                        to = %saved.status(),
                        "request changed"
                    );
                    return Ok(saved);
                }
                Err(StoreError::Conflict { expected, actual }) => {
                    tracing::debug!(
                        request_id = %id,
                        ?expected,
                        actual,
                        "conditional save lost a race, re-checking"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(contended(id))
    }

    fn load(&self, id: RequestId) -> DomainResult<Request> {
        self.requests
            .find_by_id(&id)?
            .ok_or_else(|| DomainError::not_found(format!("request {id}")))
    }
}

fn transition_detail(from: RequestStatus) -> impl FnOnce(&Request) -> Option<serde_json::Value> {
    move |request| Some(json!({ "from": from, "to": request.status() }))
}

fn status_values(statuses: &[RequestStatus]) -> Vec<FieldValue> {
    statuses.iter().map(|s| FieldValue::text(s.as_str())).collect()
}

fn contended(id: RequestId) -> DomainError {
    DomainError::storage_unavailable(format!(
        "request {id} kept changing; gave up after {MAX_SAVE_ATTEMPTS} attempts"
    ))
}
