use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use changeflow_core::{AggregateRoot, DomainError, ExpectedVersion};

use super::filter::Filter;
use super::query::{Page, Pagination};

/// A value extracted from a document field for filtering and grouping.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Id(Uuid),
    Time(DateTime<Utc>),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    pub fn id(value: impl Into<Uuid>) -> Self {
        FieldValue::Id(value.into())
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Time(t) => Some(*t),
            _ => None,
        }
    }
}

impl core::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FieldValue::Null => f.write_str("null"),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Int(i) => write!(f, "{i}"),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Id(id) => write!(f, "{id}"),
            FieldValue::Time(t) => f.write_str(&t.to_rfc3339()),
        }
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Time(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

/// A persistable entity.
///
/// Documents expose their indexed fields by name so that adapters can evaluate
/// [`Filter`]s without knowing the concrete type.
pub trait Document:
    AggregateRoot<Id: Ord + core::fmt::Display + Send + Sync> + Clone + Send + Sync + 'static
{
    /// Collection name (used in error messages and logs).
    const COLLECTION: &'static str;

    /// Append-only collections accept inserts and reads only. Adapters must
    /// answer `save` and `delete_by_id` with [`StoreError::Immutable`].
    const APPEND_ONLY: bool = false;

    /// Store-managed version stamp. Only adapters call this.
    fn set_version(&mut self, version: u64);

    /// Value of an indexed field, or `None` if the field is not indexed.
    fn field(&self, name: &str) -> Option<FieldValue>;

    /// Timestamp used for newest-first ordering.
    fn sort_key(&self) -> DateTime<Utc>;
}

/// Persistence adapter error.
///
/// These are **infrastructure errors** as opposed to domain errors. Lifecycle
/// code inspects `Conflict` to re-run its status check; everything else is
/// mapped through `From<StoreError> for DomainError`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    Duplicate(String),

    #[error("optimistic concurrency check failed (expected {expected:?}, found {actual})")]
    Conflict { expected: ExpectedVersion, actual: u64 },

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("immutable record: {0}")]
    Immutable(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),
}

impl From<StoreError> for DomainError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(what) => DomainError::not_found(what),
            StoreError::Duplicate(what) => DomainError::validation(format!("{what} already exists")),
            err @ StoreError::Conflict { .. } => DomainError::storage_unavailable(err.to_string()),
            StoreError::Unavailable(msg) => DomainError::storage_unavailable(msg),
            StoreError::Immutable(msg) => DomainError::immutable_record(msg),
            StoreError::InvalidFilter(msg) => DomainError::validation(msg),
        }
    }
}

/// Document collection: the persistence interface the core calls into.
///
/// ## Design Principles
///
/// - **No storage assumptions**: works with the in-memory adapter (tests/dev) and
///   any database-backed implementation
/// - **Optimistic locking**: `save` and `delete_by_id` take an [`ExpectedVersion`]
///   so a read-check-write sequence can be made conditional
/// - **Bounded waits**: every call must give up after the adapter's configured
///   timeout and return [`StoreError::Unavailable`] instead of hanging
///
/// ## Query Semantics
///
/// `find` returns matches newest first (by [`Document::sort_key`], ties broken by
/// id descending). `count_by_filter` and `aggregate_by_field` evaluate the same
/// filter without pagination.
pub trait Collection<T>: Send + Sync
where
    T: Document,
    T::Id: Ord + core::fmt::Display + Send + Sync,
{
    fn find_by_id(&self, id: &T::Id) -> Result<Option<T>, StoreError>;

    /// Insert a new document at version 1. Fails with `Duplicate` if the id exists.
    fn insert(&self, doc: T) -> Result<T, StoreError>;

    /// Replace an existing document if its stored version matches `expected`.
    ///
    /// Returns the stored document with its version advanced by one.
    fn save(&self, doc: T, expected: ExpectedVersion) -> Result<T, StoreError>;

    /// Remove a document if its stored version matches `expected`.
    fn delete_by_id(&self, id: &T::Id, expected: ExpectedVersion) -> Result<(), StoreError>;

    fn find(&self, filter: &Filter, pagination: Pagination) -> Result<Page<T>, StoreError>;

    fn count_by_filter(&self, filter: &Filter) -> Result<u64, StoreError>;

    /// Count matching documents grouped by the display form of `field`.
    fn aggregate_by_field(
        &self,
        filter: &Filter,
        field: &str,
    ) -> Result<BTreeMap<String, u64>, StoreError>;
}

impl<T, S> Collection<T> for Arc<S>
where
    T: Document,
    T::Id: Ord + core::fmt::Display + Send + Sync,
    S: Collection<T> + ?Sized,
{
    fn find_by_id(&self, id: &T::Id) -> Result<Option<T>, StoreError> {
        (**self).find_by_id(id)
    }

    fn insert(&self, doc: T) -> Result<T, StoreError> {
        (**self).insert(doc)
    }

    fn save(&self, doc: T, expected: ExpectedVersion) -> Result<T, StoreError> {
        (**self).save(doc, expected)
    }

    fn delete_by_id(&self, id: &T::Id, expected: ExpectedVersion) -> Result<(), StoreError> {
        (**self).delete_by_id(id, expected)
    }

    fn find(&self, filter: &Filter, pagination: Pagination) -> Result<Page<T>, StoreError> {
        (**self).find(filter, pagination)
    }

    fn count_by_filter(&self, filter: &Filter) -> Result<u64, StoreError> {
        (**self).count_by_filter(filter)
    }

    fn aggregate_by_field(
        &self,
        filter: &Filter,
        field: &str,
    ) -> Result<BTreeMap<String, u64>, StoreError> {
        (**self).aggregate_by_field(filter, field)
    }
}
