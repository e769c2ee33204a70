// src/store/mod.rs
//! Insight persistence boundary. Every adapter enforces `(source, dedup key)`
//! uniqueness itself, so concurrent writers cannot double-insert.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::dedup::DedupKey;
use crate::error::StoreError;
use crate::insight::Insight;
use crate::query::InsightFilter;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait InsightStore: Send + Sync {
    /// Insert a new insight. An existing `(source, key)` yields `ConstraintViolation`.
    async fn insert(&self, insight: &Insight) -> Result<(), StoreError>;

    async fn contains(&self, source: &str, key: &DedupKey) -> Result<bool, StoreError>;

    /// Matching insights, newest first, paged by the filter.
    /// An empty vec means "no matches"; an unreachable store is an `Err`.
    async fn query(&self, filter: &InsightFilter) -> Result<Vec<Insight>, StoreError>;
}
