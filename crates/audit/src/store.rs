//! Append-only storage adapter for audit records.

use std::collections::BTreeMap;

use changeflow_core::{AuditRecordId, ExpectedVersion};
use changeflow_infra::{Collection, Filter, Page, Pagination, StoreError};

use crate::record::AuditRecord;

/// Wraps a record collection and refuses every update or delete.
///
/// Reads and inserts pass through. Adapters already refuse to mutate
/// append-only documents; this wrapper refuses before any adapter is reached
/// and logs the attempt on the audit target.
#[derive(Debug, Default)]
pub struct AppendOnly<C> {
    inner: C,
}

impl<C> AppendOnly<C>
where
    C: Collection<AuditRecord>,
{
    pub fn new(inner: C) -> Self {
        Self { inner }
    }

    fn refuse(op: &str, id: &AuditRecordId) -> StoreError {
        tracing::error!(
            target: "changeflow::audit",
            record_id = %id,
            op,
            "attempted to mutate an audit record"
        );
        StoreError::Immutable(format!("audit record {id} cannot be {op}"))
    }
}

impl<C> Collection<AuditRecord> for AppendOnly<C>
where
    C: Collection<AuditRecord>,
{
    fn find_by_id(&self, id: &AuditRecordId) -> Result<Option<AuditRecord>, StoreError> {
        self.inner.find_by_id(id)
    }

    fn insert(&self, doc: AuditRecord) -> Result<AuditRecord, StoreError> {
        self.inner.insert(doc)
    }

    fn save(&self, doc: AuditRecord, _expected: ExpectedVersion) -> Result<AuditRecord, StoreError> {
        Err(Self::refuse("updated", &doc.record_id()))
    }

    fn delete_by_id(&self, id: &AuditRecordId, _expected: ExpectedVersion) -> Result<(), StoreError> {
        Err(Self::refuse("deleted", id))
    }

    fn find(&self, filter: &Filter, pagination: Pagination) -> Result<Page<AuditRecord>, StoreError> {
        self.inner.find(filter, pagination)
    }

    fn count_by_filter(&self, filter: &Filter) -> Result<u64, StoreError> {
        self.inner.count_by_filter(filter)
    }

    fn aggregate_by_field(
        &self,
        filter: &Filter,
        field: &str,
    ) -> Result<BTreeMap<String, u64>, StoreError> {
        self.inner.aggregate_by_field(filter, field)
    }
}
