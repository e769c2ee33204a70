// src/insight.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::config::SourceConfig;
use crate::dedup::{canonical_link, DedupKey};
use crate::ingest::normalize_text;
use crate::ingest::types::RawEntry;
use crate::relevance::Annotation;

pub const MAX_TITLE_CHARS: usize = 200;

/// A persisted, deduplicated, scored feed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insight {
    pub id: String,
    pub source: String,
    pub source_kind: String,
    pub title: String,
    pub summary: String,
    pub date: DateTime<Utc>,
    pub link: Option<String>,
    pub author: Option<String>,
    pub matched_keywords: BTreeSet<String>,
    pub mentioned_tools: BTreeSet<String>,
    pub topics: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Insight {
    /// Deterministic id: hex SHA-256 prefix of source + dedup key.
    pub fn make_id(source: &str, key: &DedupKey) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(key.storage_key().as_bytes());
        let digest = hasher.finalize();
        let mut out = String::with_capacity(32);
        for b in digest.iter().take(16) {
            use std::fmt::Write as _;
            let _ = write!(&mut out, "{:02x}", b);
        }
        out
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::from_parts(self.link.as_deref(), &self.title)
    }

    /// Build the stored record for a scored entry. `now` stands in for a missing date.
    pub fn from_entry(
        source: &SourceConfig,
        entry: &RawEntry,
        ann: Annotation,
        now: DateTime<Utc>,
    ) -> Self {
        let summary = normalize_text(&entry.content);
        let mut title = truncate_chars(&normalize_text(&entry.title), MAX_TITLE_CHARS);
        if title.is_empty() {
            title = headline(&summary, 80);
        }
        let link = canonical_link(entry);
        let key = DedupKey::from_parts(link.as_deref(), &title);
        Self {
            id: Self::make_id(&source.name, &key),
            source: source.name.clone(),
            source_kind: source.kind.as_str().to_string(),
            title,
            summary,
            date: entry.published.unwrap_or(now),
            link,
            author: entry.author.as_deref().map(normalize_text).filter(|a| !a.is_empty()),
            matched_keywords: ann.score.matched_keywords,
            mentioned_tools: ann.mentioned_tools,
            topics: ann.topics,
            created_at: now,
            updated_at: now,
        }
    }

    /// Bare record for tests and examples.
    pub fn sample(source: &str, title: &str) -> Self {
        let now = Utc::now();
        let key = DedupKey::from_parts(None, title);
        Self {
            id: Self::make_id(source, &key),
            source: source.to_string(),
            source_kind: "rss".to_string(),
            title: title.to_string(),
            summary: String::new(),
            date: now,
            link: None,
            author: None,
            matched_keywords: BTreeSet::new(),
            mentioned_tools: BTreeSet::new(),
            topics: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        s.chars().take(max).collect()
    } else {
        s.to_string()
    }
}

/// First sentence of `text`, shortened to `max` chars with a trailing "...".
pub fn headline(text: &str, max: usize) -> String {
    let text = text.trim();
    let end = text
        .char_indices()
        .find(|&(i, c)| {
            matches!(c, '.' | '!' | '?')
                && text[i + c.len_utf8()..].starts_with(char::is_whitespace)
        })
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(text.len());
    let first = &text[..end];
    if first.chars().count() > max {
        let mut out: String = first.chars().take(max.saturating_sub(3)).collect();
        out.push_str("...");
        out
    } else {
        first.to_string()
    }
}
