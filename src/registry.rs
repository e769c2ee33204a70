// src/registry.rs
use serde::Serialize;

use crate::config::{KeywordSet, SourceConfig};

/// Read-only view over the configured sources and the global keyword set.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    sources: Vec<SourceConfig>,
    global: KeywordSet,
}

/// Summary row for status/inspection output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceInfo {
    pub name: String,
    pub kind: &'static str,
    pub enabled: bool,
    pub endpoint: String,
    pub keyword_count: usize,
}

impl SourceRegistry {
    pub fn new(sources: Vec<SourceConfig>, global: KeywordSet) -> Self {
        Self { sources, global }
    }

    pub fn list_enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }

    pub fn all_sources(&self) -> &[SourceConfig] {
        &self.sources
    }

    pub fn get(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn global_keywords(&self) -> &KeywordSet {
        &self.global
    }

    /// Effective relevance keywords for a source: its own set plus the global set.
    pub fn keywords_for(&self, source: &SourceConfig) -> KeywordSet {
        source.keywords.union(&self.global)
    }

    pub fn source_info(&self) -> Vec<SourceInfo> {
        self.sources
            .iter()
            .map(|s| SourceInfo {
                name: s.name.clone(),
                kind: s.kind.as_str(),
                enabled: s.enabled,
                endpoint: s.endpoint.clone(),
                keyword_count: self.keywords_for(s).len(),
            })
            .collect()
    }
}
