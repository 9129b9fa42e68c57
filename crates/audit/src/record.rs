//! Audit record domain model.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use changeflow_core::{AggregateRoot, AuditRecordId, DomainError, IdentityId, RequestId};
use changeflow_infra::{Document, FieldValue};

/// What an audit record is about. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    RequestCreated,
    RequestUpdated,
    RequestApproved,
    RequestRejected,
    RequestSentToAudit,
    RequestStarted,
    RequestCompleted,
    RequestCancelled,
    RequestSolved,
    RequestDeleted,
    IdentityCreated,
    IdentityUpdated,
    IdentityDeactivated,
    IdentityDeleted,
    LoginSucceeded,
    LoginFailed,
    AccessDenied,
    OperationRejected,
    AnalyticsViewed,
    AuditExported,
}

impl AuditAction {
    pub const ALL: [AuditAction; 20] = [
        AuditAction::RequestCreated,
        AuditAction::RequestUpdated,
        AuditAction::RequestApproved,
        AuditAction::RequestRejected,
        AuditAction::RequestSentToAudit,
        AuditAction::RequestStarted,
        AuditAction::RequestCompleted,
        AuditAction::RequestCancelled,
        AuditAction::RequestSolved,
        AuditAction::RequestDeleted,
        AuditAction::IdentityCreated,
        AuditAction::IdentityUpdated,
        AuditAction::IdentityDeactivated,
        AuditAction::IdentityDeleted,
        AuditAction::LoginSucceeded,
        AuditAction::LoginFailed,
        AuditAction::AccessDenied,
        AuditAction::OperationRejected,
        AuditAction::AnalyticsViewed,
        AuditAction::AuditExported,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::RequestCreated => "REQUEST_CREATED",
            AuditAction::RequestUpdated => "REQUEST_UPDATED",
            AuditAction::RequestApproved => "REQUEST_APPROVED",
            AuditAction::RequestRejected => "REQUEST_REJECTED",
            AuditAction::RequestSentToAudit => "REQUEST_SENT_TO_AUDIT",
            AuditAction::RequestStarted => "REQUEST_STARTED",
            AuditAction::RequestCompleted => "REQUEST_COMPLETED",
            AuditAction::RequestCancelled => "REQUEST_CANCELLED",
            AuditAction::RequestSolved => "REQUEST_SOLVED",
            AuditAction::RequestDeleted => "REQUEST_DELETED",
            AuditAction::IdentityCreated => "IDENTITY_CREATED",
            AuditAction::IdentityUpdated => "IDENTITY_UPDATED",
            AuditAction::IdentityDeactivated => "IDENTITY_DEACTIVATED",
            AuditAction::IdentityDeleted => "IDENTITY_DELETED",
            AuditAction::LoginSucceeded => "LOGIN_SUCCEEDED",
            AuditAction::LoginFailed => "LOGIN_FAILED",
            AuditAction::AccessDenied => "ACCESS_DENIED",
            AuditAction::OperationRejected => "OPERATION_REJECTED",
            AuditAction::AnalyticsViewed => "ANALYTICS_VIEWED",
            AuditAction::AuditExported => "AUDIT_EXPORTED",
        }
    }

    /// Denial-shaped tags record an attempt that did not take effect.
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            AuditAction::AccessDenied | AuditAction::OperationRejected | AuditAction::LoginFailed
        )
    }
}

impl core::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        AuditAction::ALL
            .into_iter()
            .find(|a| a.as_str() == wanted)
            .ok_or_else(|| DomainError::validation(format!("unknown audit action '{s}'")))
    }
}

/// An audit record that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditRecord {
    actor: IdentityId,
    action: AuditAction,
    origin: String,
    subject_request: Option<RequestId>,
    target_identity: Option<IdentityId>,
    detail: Option<JsonValue>,
}

impl NewAuditRecord {
    pub fn new(actor: IdentityId, action: AuditAction, origin: impl Into<String>) -> Self {
        Self {
            actor,
            action,
            origin: origin.into(),
            subject_request: None,
            target_identity: None,
            detail: None,
        }
    }

    pub fn subject(mut self, request: RequestId) -> Self {
        self.subject_request = Some(request);
        self
    }

    pub fn maybe_subject(mut self, request: Option<RequestId>) -> Self {
        self.subject_request = request;
        self
    }

    pub fn target(mut self, identity: IdentityId) -> Self {
        self.target_identity = Some(identity);
        self
    }

    pub fn maybe_target(mut self, identity: Option<IdentityId>) -> Self {
        self.target_identity = identity;
        self
    }

    pub fn detail(mut self, detail: JsonValue) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn action(&self) -> AuditAction {
        self.action
    }

    /// Stamp id and time. Only the trail seals records.
    pub(crate) fn seal(self, id: AuditRecordId, timestamp: DateTime<Utc>) -> AuditRecord {
        AuditRecord {
            id,
            actor: self.actor,
            action: self.action,
            subject_request: self.subject_request,
            target_identity: self.target_identity,
            origin: self.origin,
            detail: self.detail,
            timestamp,
            version: 0,
        }
    }
}

/// An immutable fact about something that happened.
///
/// Fields are private and there are no setters. Records are only built by
/// sealing a [`NewAuditRecord`] and are not deserializable, so a record with
/// an existing id cannot be forged from outside. The collection marks itself
/// append-only, and storage adapters refuse to update or delete it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    id: AuditRecordId,
    actor: IdentityId,
    action: AuditAction,
    subject_request: Option<RequestId>,
    target_identity: Option<IdentityId>,
    origin: String,
    detail: Option<JsonValue>,
    timestamp: DateTime<Utc>,
    #[serde(skip)]
    version: u64,
}

impl AuditRecord {
    pub fn record_id(&self) -> AuditRecordId {
        self.id
    }

    pub fn actor(&self) -> IdentityId {
        self.actor
    }

    pub fn action(&self) -> AuditAction {
        self.action
    }

    pub fn subject_request(&self) -> Option<RequestId> {
        self.subject_request
    }

    pub fn target_identity(&self) -> Option<IdentityId> {
        self.target_identity
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn detail(&self) -> Option<&JsonValue> {
        self.detail.as_ref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl AggregateRoot for AuditRecord {
    type Id = AuditRecordId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Document for AuditRecord {
    const COLLECTION: &'static str = "audit_record";
    const APPEND_ONLY: bool = true;

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "actor" => Some(FieldValue::id(self.actor)),
            "action" => Some(FieldValue::text(self.action.as_str())),
            "subject_request" => Some(self.subject_request.map(FieldValue::id).into()),
            "target_identity" => Some(self.target_identity.map(FieldValue::id).into()),
            "origin" => Some(FieldValue::text(self.origin.clone())),
            "timestamp" => Some(FieldValue::Time(self.timestamp)),
            _ => None,
        }
    }

    fn sort_key(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
