// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::config::SourceConfig;
use crate::error::FetchError;

/// One feed entry after field mapping, before scoring. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub title: String,
    pub content: String, // may contain markup
    pub published: Option<DateTime<Utc>>,
    pub link: Option<String>,
    pub canonical_link: Option<String>,
    pub author: Option<String>,
    pub tags: BTreeSet<String>,
}

#[async_trait::async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, source: &SourceConfig) -> Result<Vec<RawEntry>, FetchError>;
}

/// What happened to a single source during a cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceOutcome {
    pub source: String,
    pub fetched: usize,
    pub relevant: usize,
    pub irrelevant: usize,
    pub stale: usize,
    pub duplicates: usize,
    pub inserted: usize,
    /// Set when the fetch failed; the source contributed nothing this cycle.
    pub error: Option<String>,
}

impl SourceOutcome {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    pub fn failed(source: impl Into<String>, error: &FetchError) -> Self {
        Self {
            source: source.into(),
            error: Some(error.to_string()),
            ..Self::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub outcomes: Vec<SourceOutcome>,
}

impl CycleReport {
    pub fn inserted(&self) -> usize {
        self.outcomes.iter().map(|o| o.inserted).sum()
    }

    pub fn failed_sources(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_ok())
            .map(|o| o.source.as_str())
            .collect()
    }

    pub fn outcome(&self, source: &str) -> Option<&SourceOutcome> {
        self.outcomes.iter().find(|o| o.source == source)
    }
}
