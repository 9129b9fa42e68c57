//! The audit trail: append, query and export.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use changeflow_core::{AuditRecordId, DomainError, DomainResult, ExpectedVersion, IdentityId, RequestId};
use changeflow_infra::{Collection, FieldValue, Filter, Page, Pagination};

use crate::record::{AuditAction, AuditRecord, NewAuditRecord};
use crate::store::AppendOnly;

/// Where operations send their audit records.
///
/// Recording is best-effort: an implementation must never fail the operation
/// that produced the record. Failures are logged and swallowed, and the
/// return value only says whether the record made it.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: NewAuditRecord) -> Option<AuditRecordId>;
}

impl<S> AuditSink for Arc<S>
where
    S: AuditSink + ?Sized,
{
    fn record(&self, entry: NewAuditRecord) -> Option<AuditRecordId> {
        (**self).record(entry)
    }
}

/// Filter for reading the trail back. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditQuery {
    pub actor: Option<IdentityId>,
    pub action: Option<AuditAction>,
    pub subject_request: Option<RequestId>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pagination: Pagination,
}

impl AuditQuery {
    pub fn by_actor(actor: IdentityId) -> Self {
        Self {
            actor: Some(actor),
            ..Self::default()
        }
    }

    pub fn by_request(request: RequestId) -> Self {
        Self {
            subject_request: Some(request),
            ..Self::default()
        }
    }

    pub fn with_action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    fn filter(&self) -> Filter {
        let mut filter = Filter::new().between("timestamp", self.from, self.to);
        if let Some(actor) = self.actor {
            filter = filter.eq("actor", FieldValue::id(actor));
        }
        if let Some(action) = self.action {
            filter = filter.eq("action", action.as_str());
        }
        if let Some(request) = self.subject_request {
            filter = filter.eq("subject_request", FieldValue::id(request));
        }
        filter
    }
}

/// One flattened export row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRow {
    pub id: AuditRecordId,
    pub timestamp: DateTime<Utc>,
    pub actor_id: IdentityId,
    pub action: AuditAction,
    pub subject_request: Option<RequestId>,
    pub target_identity: Option<IdentityId>,
    pub origin: String,
    /// Detail payload serialized to a JSON string, empty when absent.
    pub detail: String,
}

impl From<&AuditRecord> for AuditRow {
    fn from(record: &AuditRecord) -> Self {
        Self {
            id: record.record_id(),
            timestamp: record.timestamp(),
            actor_id: record.actor(),
            action: record.action(),
            subject_request: record.subject_request(),
            target_identity: record.target_identity(),
            origin: record.origin().to_string(),
            detail: record.detail().map(|d| d.to_string()).unwrap_or_default(),
        }
    }
}

/// A bounded export. `truncated` is set when more rows matched than were returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditExport {
    pub rows: Vec<AuditRow>,
    pub total_matching: u64,
    pub truncated: bool,
}

/// Append-only audit trail over a record collection.
#[derive(Debug)]
pub struct AuditTrail<C> {
    store: AppendOnly<C>,
}

impl<C> AuditTrail<C>
where
    C: Collection<AuditRecord>,
{
    pub fn new(collection: C) -> Self {
        Self {
            store: AppendOnly::new(collection),
        }
    }

    /// The append-only view of the underlying collection.
    pub fn store(&self) -> &AppendOnly<C> {
        &self.store
    }

    /// Append a record, surfacing storage failures.
    pub fn try_append(&self, entry: NewAuditRecord) -> DomainResult<AuditRecord> {
        let record = entry.seal(AuditRecordId::new(), Utc::now());
        Ok(self.store.insert(record)?)
    }

    pub fn get(&self, id: AuditRecordId) -> DomainResult<AuditRecord> {
        self.store
            .find_by_id(&id)?
            .ok_or_else(|| DomainError::not_found(format!("audit record {id}")))
    }

    /// Matching records, newest first.
    pub fn query(&self, query: &AuditQuery) -> DomainResult<Page<AuditRecord>> {
        Ok(self.store.find(&query.filter(), query.pagination)?)
    }

    pub fn count(&self, query: &AuditQuery) -> DomainResult<u64> {
        Ok(self.store.count_by_filter(&query.filter())?)
    }

    /// Export up to `limit` matching rows, newest first. The query's own
    /// pagination is ignored.
    pub fn export(&self, query: &AuditQuery, limit: u32) -> DomainResult<AuditExport> {
        let page = self.store.find(&query.filter(), Pagination::first(limit))?;
        let rows: Vec<AuditRow> = page.items.iter().map(AuditRow::from).collect();
        Ok(AuditExport {
            truncated: page.total > rows.len() as u64,
            total_matching: page.total,
            rows,
        })
    }

    /// Always fails: records are immutable.
    pub fn update(&self, record: AuditRecord) -> DomainResult<AuditRecord> {
        Ok(self.store.save(record, ExpectedVersion::Any)?)
    }

    /// Always fails: records are immutable.
    pub fn delete(&self, id: AuditRecordId) -> DomainResult<()> {
        Ok(self.store.delete_by_id(&id, ExpectedVersion::Any)?)
    }
}

impl<C> AuditSink for AuditTrail<C>
where
    C: Collection<AuditRecord>,
{
    fn record(&self, entry: NewAuditRecord) -> Option<AuditRecordId> {
        let action = entry.action();
        match self.try_append(entry) {
            Ok(record) => {
                tracing::debug!(
                    target: "changeflow::audit",
                    record_id = %record.record_id(),
                    action = %action,
                    "audit record appended"
                );
                Some(record.record_id())
            }
            Err(err) => {
                tracing::error!(
                    target: "changeflow::audit",
                    action = %action,
                    error = %err,
                    "failed to append audit record"
                );
                None
            }
        }
    }
}
