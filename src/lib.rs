// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod dedup;
pub mod error;
pub mod ingest;
pub mod insight;
pub mod metrics;
pub mod query;
pub mod registry;
pub mod relevance;
pub mod snippet;
pub mod store;
pub mod trends;

// ---- Re-exports for stable public API ----
pub use crate::config::{KeywordSet, SourceConfig, TrackerConfig};
pub use crate::error::{ConfigError, FetchError, StoreError};
pub use crate::ingest::types::{CycleReport, FeedFetcher, RawEntry, SourceOutcome};
pub use crate::ingest::Pipeline;
pub use crate::insight::Insight;
pub use crate::query::{present, InsightFilter, InsightView};
pub use crate::snippet::{build_snippet, SnippetResult};
pub use crate::store::InsightStore;
