//! Persistence boundary.
//!
//! The core calls into a [`Collection`] per entity type; adapters decide how
//! documents are stored. Only the in-memory adapter lives here.

pub mod filter;
pub mod in_memory;
pub mod query;
pub mod r#trait;

pub use filter::{Filter, Predicate};
pub use in_memory::{DEFAULT_LOCK_TIMEOUT, InMemoryCollection};
pub use query::{Page, Pagination};
pub use r#trait::{Collection, Document, FieldValue, StoreError};
