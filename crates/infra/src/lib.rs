//! Infrastructure layer: persistence boundary and configuration.

pub mod config;
pub mod store;

pub use config::{EngineConfig, REJECTION_REASON_FLOOR};
pub use store::{
    Collection, Document, FieldValue, Filter, InMemoryCollection, Page, Pagination, Predicate,
    StoreError,
};
