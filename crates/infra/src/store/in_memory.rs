use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use changeflow_core::ExpectedVersion;

use super::filter::Filter;
use super::query::{Page, Pagination};
use super::r#trait::{Collection, Document, StoreError};

/// Default bound on how long a call waits for the collection lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// In-memory document collection.
///
/// Intended for tests/dev. Not optimized for performance: queries scan.
/// Every call waits at most `timeout` for the lock and then fails with
/// [`StoreError::Unavailable`].
#[derive(Debug)]
pub struct InMemoryCollection<T: Document> {
    docs: RwLock<HashMap<T::Id, T>>,
    timeout: Duration,
}

impl<T: Document> Default for InMemoryCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Document> InMemoryCollection<T> {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<T::Id, T>>, StoreError> {
        self.docs.try_read_for(self.timeout).ok_or_else(|| {
            StoreError::Unavailable(format!(
                "timed out after {:?} waiting to read {}",
                self.timeout,
                T::COLLECTION
            ))
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<T::Id, T>>, StoreError> {
        self.docs.try_write_for(self.timeout).ok_or_else(|| {
            StoreError::Unavailable(format!(
                "timed out after {:?} waiting to write {}",
                self.timeout,
                T::COLLECTION
            ))
        })
    }

    fn describe(id: &T::Id) -> String {
        format!("{} {}", T::COLLECTION, id)
    }

    fn refuse_if_append_only(op: &str, id: &T::Id) -> Result<(), StoreError> {
        if !T::APPEND_ONLY {
            return Ok(());
        }
        tracing::error!(
            collection = T::COLLECTION,
            id = %id,
            op,
            "refused mutation of an append-only collection"
        );
        Err(StoreError::Immutable(format!("{} cannot be {op}", Self::describe(id))))
    }
}

impl<T: Document> Collection<T> for InMemoryCollection<T> {
    fn find_by_id(&self, id: &T::Id) -> Result<Option<T>, StoreError> {
        Ok(self.read()?.get(id).cloned())
    }

    fn insert(&self, mut doc: T) -> Result<T, StoreError> {
        let mut docs = self.write()?;
        let id = doc.id().clone();
        if docs.contains_key(&id) {
            return Err(StoreError::Duplicate(Self::describe(&id)));
        }
        doc.set_version(1);
        docs.insert(id, doc.clone());
        Ok(doc)
    }

    fn save(&self, mut doc: T, expected: ExpectedVersion) -> Result<T, StoreError> {
        Self::refuse_if_append_only("updated", doc.id())?;
        let mut docs = self.write()?;
        let id = doc.id().clone();
        let current = docs
            .get(&id)
            .map(|existing| existing.version())
            .ok_or_else(|| StoreError::NotFound(Self::describe(&id)))?;

        // Compare-and-set under the write lock.
        if !expected.matches(current) {
            return Err(StoreError::Conflict {
                expected,
                actual: current,
            });
        }

        doc.set_version(current + 1);
        docs.insert(id, doc.clone());
        Ok(doc)
    }

    fn delete_by_id(&self, id: &T::Id, expected: ExpectedVersion) -> Result<(), StoreError> {
        Self::refuse_if_append_only("deleted", id)?;
        let mut docs = self.write()?;
        let current = docs
            .get(id)
            .map(|existing| existing.version())
            .ok_or_else(|| StoreError::NotFound(Self::describe(id)))?;

        if !expected.matches(current) {
            return Err(StoreError::Conflict {
                expected,
                actual: current,
            });
        }

        docs.remove(id);
        Ok(())
    }

    fn find(&self, filter: &Filter, pagination: Pagination) -> Result<Page<T>, StoreError> {
        let docs = self.read()?;
        let mut matching: Vec<&T> = docs.values().filter(|d| filter.matches_doc(*d)).collect();
        sort_newest_first(&mut matching);

        let total = matching.len() as u64;
        let offset = pagination.offset as usize;
        let limit = pagination.limit as usize;
        let items: Vec<T> = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        let has_more = (offset + items.len()) < total as usize;

        Ok(Page {
            items,
            total,
            pagination,
            has_more,
        })
    }

    fn count_by_filter(&self, filter: &Filter) -> Result<u64, StoreError> {
        let docs = self.read()?;
        Ok(docs.values().filter(|d| filter.matches_doc(*d)).count() as u64)
    }

    fn aggregate_by_field(
        &self,
        filter: &Filter,
        field: &str,
    ) -> Result<BTreeMap<String, u64>, StoreError> {
        let docs = self.read()?;
        let mut groups: BTreeMap<String, u64> = BTreeMap::new();
        for doc in docs.values().filter(|d| filter.matches_doc(*d)) {
            let key = doc
                .field(field)
                .ok_or_else(|| {
                    StoreError::InvalidFilter(format!(
                        "{} has no indexed field '{field}'",
                        T::COLLECTION
                    ))
                })?
                .to_string();
            *groups.entry(key).or_default() += 1;
        }
        Ok(groups)
    }
}

/// Newest first; ties broken by id descending so the order is total.
fn sort_newest_first<T: Document>(docs: &mut [&T]) {
    docs.sort_by(|a, b| {
        b.sort_key()
            .cmp(&a.sort_key())
            .then_with(|| b.id().cmp(a.id()))
    });
}
