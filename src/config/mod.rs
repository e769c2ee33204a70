// src/config/mod.rs
//! Static tracker configuration: sources, keyword sets, vocabularies and tunables.
//!
//! Loaded once at startup and passed around as an immutable value.
//! Supports TOML or JSON, selected by file extension.

use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::registry::SourceRegistry;

pub const ENV_CONFIG_PATH: &str = "INSIGHT_CONFIG_PATH";
pub const DEFAULT_TOML_PATH: &str = "config/sources.toml";
pub const DEFAULT_JSON_PATH: &str = "config/sources.json";

pub const ARXIV_ENDPOINT: &str = "http://export.arxiv.org/api/query";

/// Ordered, case-insensitive, de-duplicated set of keywords.
///
/// Items are stored lower-cased; insertion order is kept so logs and
/// `matched_keywords` stay stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Vec<String>")]
pub struct KeywordSet(Vec<String>);

impl KeywordSet {
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = KeywordSet::default();
        for it in items {
            out.push(it.as_ref());
        }
        out
    }

    fn push(&mut self, item: &str) {
        let k = item.trim().to_lowercase();
        if !k.is_empty() && !self.0.contains(&k) {
            self.0.push(k);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, keyword: &str) -> bool {
        let k = keyword.trim().to_lowercase();
        self.0.iter().any(|x| *x == k)
    }

    /// `self ∪ other`, keeping `self`'s order first.
    pub fn union(&self, other: &KeywordSet) -> KeywordSet {
        let mut out = self.clone();
        for k in other.iter() {
            out.push(k);
        }
        out
    }
}

impl TryFrom<Vec<String>> for KeywordSet {
    type Error = String;

    fn try_from(items: Vec<String>) -> Result<Self, Self::Error> {
        if items.iter().any(|k| k.trim().is_empty()) {
            return Err("keyword lists must not contain empty strings".to_string());
        }
        Ok(KeywordSet::new(items))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Rss,
    Arxiv,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Rss => "rss",
            SourceKind::Arxiv => "arxiv",
        }
    }
}

/// Which raw feed fields map onto the normalized entry shape.
/// Each list is tried in order; names compare case-insensitively
/// against the element's qualified name (e.g. `dc:creator`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    pub title: Vec<String>,
    pub content: Vec<String>,
    pub date: Vec<String>,
    pub link: Vec<String>,
    pub canonical_link: Vec<String>,
    pub author: Vec<String>,
    pub tags: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            title: strings(&["title"]),
            content: strings(&["content:encoded", "content", "description", "summary"]),
            date: strings(&["pubDate", "published", "updated", "dc:date"]),
            link: strings(&["link", "guid"]),
            canonical_link: strings(&["canonical", "feedburner:origLink"]),
            author: strings(&["author", "dc:creator"]),
            tags: strings(&["category", "dc:subject"]),
        }
    }
}

/// Query parameters for `kind = "arxiv"` sources.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ArxivQuery {
    pub categories: Vec<String>,
    pub search_terms: Vec<String>,
    pub max_results: u32,
    pub sort_by: String,
    pub sort_order: String,
}

impl Default for ArxivQuery {
    fn default() -> Self {
        Self {
            categories: strings(&["cs.AI", "cs.SE", "cs.LG", "stat.ML"]),
            search_terms: Vec::new(),
            max_results: 100,
            sort_by: "submittedDate".to_string(),
            sort_order: "descending".to_string(),
        }
    }
}

impl ArxivQuery {
    /// `search_query` value: categories OR-ed, AND-ed with title/abstract terms.
    pub fn search_query(&self) -> String {
        let cats = self
            .categories
            .iter()
            .map(|c| format!("cat:{c}"))
            .collect::<Vec<_>>()
            .join(" OR ");
        let terms = self
            .search_terms
            .iter()
            .map(|t| format!("ti:\"{t}\" OR abs:\"{t}\""))
            .collect::<Vec<_>>()
            .join(" OR ");
        match (cats.is_empty(), terms.is_empty()) {
            (false, false) => format!("({cats}) AND ({terms})"),
            (false, true) => cats,
            (true, false) => terms,
            (true, true) => "all:*".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub endpoint: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub kind: SourceKind,
    #[serde(default)]
    pub keywords: KeywordSet,
    #[serde(default)]
    pub mapping: FieldMapping,
    /// Append entry tags to the relevance text.
    #[serde(default)]
    pub match_tags: bool,
    #[serde(default)]
    pub arxiv: Option<ArxivQuery>,
}

impl SourceConfig {
    /// Minimal RSS source; handy for tests and manual ingestion.
    pub fn rss(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            enabled: true,
            kind: SourceKind::Rss,
            keywords: KeywordSet::default(),
            mapping: FieldMapping::default(),
            match_tags: false,
            arxiv: None,
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.keywords = KeywordSet::new(keywords);
        self
    }
}

fn default_true() -> bool {
    true
}

/// A curated product name plus the spellings it goes by.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ToolConfig {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl ToolConfig {
    pub fn new(name: &str, aliases: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            aliases: strings(aliases),
        }
    }

    /// Canonical name first, then aliases.
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TopicConfig {
    pub name: String,
    pub keywords: Vec<String>,
}

impl TopicConfig {
    pub fn new(name: &str, keywords: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            keywords: strings(keywords),
        }
    }
}

pub fn default_tools() -> Vec<ToolConfig> {
    vec![
        ToolConfig::new("Amp", &["ampcode", "sourcegraph amp"]),
        ToolConfig::new("Cursor", &["cursor ide", "cursor.sh"]),
        ToolConfig::new("Claude", &["claude code", "anthropic claude"]),
        ToolConfig::new("Copilot", &["github copilot", "copilot agent"]),
        ToolConfig::new("Cody", &["sourcegraph cody"]),
        ToolConfig::new("Codex", &["openai codex", "codex cli"]),
        ToolConfig::new("Windsurf", &["codeium windsurf"]),
        ToolConfig::new("Aider", &[]),
        ToolConfig::new("Devin", &["cognition devin"]),
        ToolConfig::new("Cline", &[]),
    ]
}

pub fn default_topics() -> Vec<TopicConfig> {
    vec![
        TopicConfig::new("AI", &["ai", "artificial intelligence", "machine learning", "llm"]),
        TopicConfig::new("Agents", &["agent", "agents", "agentic"]),
        TopicConfig::new("Security", &["security", "authentication", "authorization"]),
        TopicConfig::new("Testing", &["testing", "test suite", "unit tests"]),
        TopicConfig::new("DevOps", &["deployment", "ci/cd", "devops"]),
        TopicConfig::new("Open Source", &["open source", "open-source"]),
        TopicConfig::new("Performance", &["performance", "optimization", "latency"]),
        TopicConfig::new("IDE", &["ide", "editor", "vs code", "vscode"]),
    ]
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub timeout_secs: u64,
    pub concurrency: usize,
    pub user_agent: String,
    /// Entries older than this are skipped; undated entries are kept.
    pub max_age_hours: Option<u64>,
    pub interval_secs: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            concurrency: 4,
            user_agent: concat!("insight-tracker/", env!("CARGO_PKG_VERSION"), " (+rss ingestion)")
                .to_string(),
            max_age_hours: None,
            interval_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SnippetSettings {
    pub word_budget: usize,
}

impl Default for SnippetSettings {
    fn default() -> Self {
        Self { word_budget: 60 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub path: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/insights.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    #[serde(default)]
    pub global_keywords: KeywordSet,
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub fetch: FetchSettings,
    #[serde(default)]
    pub snippet: SnippetSettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default = "default_tools")]
    pub tools: Vec<ToolConfig>,
    #[serde(default = "default_topics")]
    pub topics: Vec<TopicConfig>,
}

impl TrackerConfig {
    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::Invalid("no sources configured".into()));
        }
        let mut names = HashSet::new();
        for s in &self.sources {
            let name = s.name.trim();
            if name.is_empty() {
                return Err(ConfigError::Invalid("source with empty name".into()));
            }
            if !names.insert(name.to_ascii_lowercase()) {
                return Err(ConfigError::Invalid(format!("duplicate source name `{name}`")));
            }
            if !(s.endpoint.starts_with("http://") || s.endpoint.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "source `{name}` endpoint must be an http(s) URL"
                )));
            }
        }
        if self.fetch.timeout_secs == 0 {
            return Err(ConfigError::Invalid("fetch.timeout_secs must be > 0".into()));
        }
        if self.fetch.concurrency == 0 {
            return Err(ConfigError::Invalid("fetch.concurrency must be > 0".into()));
        }
        if self.fetch.interval_secs == 0 {
            return Err(ConfigError::Invalid("fetch.interval_secs must be > 0".into()));
        }
        if self.snippet.word_budget < 5 {
            return Err(ConfigError::Invalid("snippet.word_budget must be >= 5".into()));
        }
        for t in &self.tools {
            if t.terms().any(|term| term.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!("tool `{}` has an empty alias", t.name)));
            }
        }
        for t in &self.topics {
            if t.name.trim().is_empty() || t.keywords.iter().any(|k| k.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!("topic `{}` is malformed", t.name)));
            }
        }
        Ok(())
    }

    pub fn registry(&self) -> SourceRegistry {
        SourceRegistry::new(self.sources.clone(), self.global_keywords.clone())
    }
}

/// Load config from an explicit path. Supports TOML or JSON formats.
pub fn load_config_from(path: &Path) -> Result<TrackerConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let cfg = parse_config(&content, ext.as_str())?;
    cfg.validate()?;
    tracing::info!(
        path = %path.display(),
        sources = cfg.sources.len(),
        global_keywords = cfg.global_keywords.len(),
        "config loaded"
    );
    Ok(cfg)
}

/// Load config using env var + fallbacks:
/// 1) $INSIGHT_CONFIG_PATH
/// 2) config/sources.toml
/// 3) config/sources.json
pub fn load_config_default() -> Result<TrackerConfig, ConfigError> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_config_from(&pb);
        } else {
            return Err(ConfigError::Invalid(format!(
                "{ENV_CONFIG_PATH} points to non-existent path {}",
                pb.display()
            )));
        }
    }
    let toml_p = PathBuf::from(DEFAULT_TOML_PATH);
    if toml_p.exists() {
        return load_config_from(&toml_p);
    }
    let json_p = PathBuf::from(DEFAULT_JSON_PATH);
    if json_p.exists() {
        return load_config_from(&json_p);
    }
    Err(ConfigError::Missing)
}

/// Parse (without validating) a config document.
pub fn parse_config(s: &str, hint_ext: &str) -> Result<TrackerConfig, ConfigError> {
    if hint_ext == "json" {
        serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    } else {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}
