// src/relevance.rs
//! Relevance primitives: substring keyword scoring (recall layer) and
//! word-boundary vocabulary detection for tools and topics (precision layer).
//!
//! The two layers differ on purpose. Keyword scoring decides admission and
//! accepts bare substring hits ("amp" inside "example"); tool and topic
//! detection only count whole-word mentions.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::info;

use crate::config::{KeywordSet, SourceConfig, ToolConfig, TopicConfig, TrackerConfig};
use crate::error::ConfigError;
use crate::ingest::normalize_text;
use crate::ingest::types::RawEntry;

pub const MAX_TOPICS: usize = 5;

// Dev logging gate: RELEVANCE_DEV_LOG=1 AND dev env (debug or APP_ENV in {local,development,dev})
pub(crate) fn dev_logging_enabled() -> bool {
    let on = std::env::var("RELEVANCE_DEV_LOG").ok().as_deref() == Some("1");
    if !on {
        return false;
    }
    if cfg!(debug_assertions) {
        return true;
    }
    matches!(
        std::env::var("APP_ENV")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str(),
        "local" | "development" | "dev"
    )
}

pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Minimal, anonymized dev logger for relevance decisions.
fn dev_log_relevance(source: &str, text: &str, ann: &Annotation) {
    if !dev_logging_enabled() {
        return;
    }
    let id = anon_hash(text);
    // Never log raw text. Only hashed id + short lists.
    info!(
        target: "relevance",
        %id,
        source,
        relevant = ann.score.relevant,
        matched = ?truncate_vec(&ann.score.matched_keywords, 5),
        tools = ?truncate_vec(&ann.mentioned_tools, 5),
        topics = ?truncate_vec(&ann.topics, 5)
    );
}

pub(crate) fn truncate_vec<'a, T, I>(v: I, max: usize) -> Vec<String>
where
    T: ToString + 'a,
    I: IntoIterator<Item = &'a T>,
{
    v.into_iter().take(max).map(|x| x.to_string()).collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScoreResult {
    pub relevant: bool,
    pub matched_keywords: BTreeSet<String>,
}

/// Text the keyword pass runs over: title, raw content, and tags when the
/// source opts in.
pub fn relevance_text(entry: &RawEntry, source: &SourceConfig) -> String {
    let mut text = format!("{}\n{}", entry.title, entry.content);
    if source.match_tags {
        for t in &entry.tags {
            text.push('\n');
            text.push_str(t);
        }
    }
    text
}

/// Case-insensitive substring scoring against `source.keywords ∪ global`.
pub fn score(entry: &RawEntry, source: &SourceConfig, global: &KeywordSet) -> ScoreResult {
    let haystack = relevance_text(entry, source).to_lowercase();
    let matched_keywords: BTreeSet<String> = source
        .keywords
        .union(global)
        .iter()
        .filter(|k| haystack.contains(*k))
        .map(str::to_string)
        .collect();
    ScoreResult {
        relevant: !matched_keywords.is_empty(),
        matched_keywords,
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Case-insensitive regex matching `term` only as a whole word.
/// Edges that are not word characters (e.g. `c++`) are matched literally.
pub fn boundary_regex(term: &str) -> Result<Regex, regex::Error> {
    let t = term.trim();
    let pre = if t.chars().next().is_some_and(is_word_char) {
        r"\b"
    } else {
        r"(?:^|\W)"
    };
    let post = if t.chars().last().is_some_and(is_word_char) {
        r"\b"
    } else {
        ""
    };
    Regex::new(&format!("(?i){pre}{}{post}", regex::escape(t)))
}

/// Named groups of whole-word patterns; a group matches if any pattern does.
#[derive(Debug, Clone)]
struct Vocabulary {
    groups: Vec<(String, Vec<Regex>)>,
}

impl Vocabulary {
    fn compile<'a, I, T>(groups: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (&'a str, T)>,
        T: IntoIterator<Item = &'a str>,
    {
        let mut out = Vec::new();
        for (name, terms) in groups {
            let mut pats = Vec::new();
            for term in terms {
                let re = boundary_regex(term).map_err(|e| {
                    ConfigError::Invalid(format!("bad vocabulary term `{term}` for `{name}`: {e}"))
                })?;
                pats.push(re);
            }
            out.push((name.to_string(), pats));
        }
        Ok(Self { groups: out })
    }

    fn matching<'a>(&'a self, text: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.groups
            .iter()
            .filter(move |(_, pats)| pats.iter().any(|re| re.is_match(text)))
            .map(|(name, _)| name.as_str())
    }
}

/// Detects curated tool names (canonical name or any alias).
#[derive(Debug, Clone)]
pub struct ToolDetector {
    vocab: Vocabulary,
}

impl ToolDetector {
    pub fn new(tools: &[ToolConfig]) -> Result<Self, ConfigError> {
        let vocab = Vocabulary::compile(tools.iter().map(|t| (t.name.as_str(), t.terms())))?;
        Ok(Self { vocab })
    }

    pub fn detect(&self, text: &str) -> BTreeSet<String> {
        self.vocab.matching(text).map(str::to_string).collect()
    }
}

/// Topic tags, first `MAX_TOPICS` in vocabulary order.
#[derive(Debug, Clone)]
pub struct TopicTagger {
    vocab: Vocabulary,
}

impl TopicTagger {
    pub fn new(topics: &[TopicConfig]) -> Result<Self, ConfigError> {
        let vocab = Vocabulary::compile(
            topics
                .iter()
                .map(|t| (t.name.as_str(), t.keywords.iter().map(String::as_str))),
        )?;
        Ok(Self { vocab })
    }

    pub fn detect(&self, text: &str) -> BTreeSet<String> {
        self.vocab
            .matching(text)
            .take(MAX_TOPICS)
            .map(str::to_string)
            .collect()
    }
}

/// Everything the scorer learns about one entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotation {
    pub score: ScoreResult,
    pub mentioned_tools: BTreeSet<String>,
    pub topics: BTreeSet<String>,
}

/// Compiled vocabularies; cheap to share behind an `Arc`.
#[derive(Debug, Clone)]
pub struct RelevanceEngine {
    tools: ToolDetector,
    topics: TopicTagger,
}

impl RelevanceEngine {
    pub fn new(tools: &[ToolConfig], topics: &[TopicConfig]) -> Result<Self, ConfigError> {
        Ok(Self {
            tools: ToolDetector::new(tools)?,
            topics: TopicTagger::new(topics)?,
        })
    }

    pub fn from_config(cfg: &TrackerConfig) -> Result<Self, ConfigError> {
        Self::new(&cfg.tools, &cfg.topics)
    }

    pub fn tools(&self) -> &ToolDetector {
        &self.tools
    }

    /// Keyword score plus tool/topic detection over title and cleaned content.
    pub fn annotate(
        &self,
        entry: &RawEntry,
        source: &SourceConfig,
        global: &KeywordSet,
    ) -> Annotation {
        let score = score(entry, source, global);
        let visible = format!(
            "{} {}",
            normalize_text(&entry.title),
            normalize_text(&entry.content)
        );
        let ann = Annotation {
            score,
            mentioned_tools: self.tools.detect(&visible),
            topics: self.topics.detect(&visible),
        };
        dev_log_relevance(&source.name, &visible, &ann);
        ann
    }
}
