// src/query.rs
//! Read side: filter predicates over stored insights, and the view handed to renderers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SnippetSettings;
use crate::insight::Insight;
use crate::snippet::{build_snippet, render_html, SnippetResult};

pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 1000;
/// Recency windows are capped at a century.
const MAX_FROM_HOURS: u64 = 24 * 366 * 100;

/// All set filters are any-of within the set; all present filters are AND-ed.
/// `from_hours` is applied on top of `date_from`/`date_to`, never instead of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InsightFilter {
    /// Case-insensitive substring of title or summary.
    pub text: Option<String>,
    pub sources: Vec<String>,
    pub tools: Vec<String>,
    pub keywords: Vec<String>,
    pub topics: Vec<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub from_hours: Option<u64>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl InsightFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, q: impl Into<String>) -> Self {
        self.text = Some(q.into());
        self
    }

    pub fn sources<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn tools<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn keywords<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn topics<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    pub fn from_hours(mut self, hours: u64) -> Self {
        self.from_hours = Some(hours);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Requested limit, defaulted and clamped to `1..=MAX_LIMIT`.
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn text_query(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    /// Oldest admissible date: the later of `date_from` and `now - from_hours`.
    pub fn lower_bound(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let recency = self
            .from_hours
            .map(|h| now - Duration::hours(h.min(MAX_FROM_HOURS) as i64));
        match (self.date_from, recency) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    /// Predicate form of the filter (limit/offset excluded).
    pub fn matches(&self, insight: &Insight, now: DateTime<Utc>) -> bool {
        if let Some(q) = self.text_query() {
            let q = q.to_lowercase();
            if !insight.title.to_lowercase().contains(&q)
                && !insight.summary.to_lowercase().contains(&q)
            {
                return false;
            }
        }
        if !any_of(&self.sources, std::iter::once(&insight.source)) {
            return false;
        }
        if !any_of(&self.tools, insight.mentioned_tools.iter())
            || !any_of(&self.keywords, insight.matched_keywords.iter())
            || !any_of(&self.topics, insight.topics.iter())
        {
            return false;
        }
        if let Some(lb) = self.lower_bound(now) {
            if insight.date < lb {
                return false;
            }
        }
        if let Some(ub) = self.date_to {
            if insight.date > ub {
                return false;
            }
        }
        true
    }
}

fn any_of<'a>(wanted: &[String], have: impl Iterator<Item = &'a String>) -> bool {
    if wanted.is_empty() {
        return true;
    }
    let have: Vec<&String> = have.collect();
    wanted
        .iter()
        .any(|w| have.iter().any(|h| h.to_lowercase() == w.trim().to_lowercase()))
}

/// Newest first, ties broken by id, then offset/limit.
pub fn sort_and_page(mut rows: Vec<Insight>, filter: &InsightFilter) -> Vec<Insight> {
    rows.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));
    rows.into_iter()
        .skip(filter.offset)
        .take(filter.effective_limit())
        .collect()
}

/// An insight plus its snippet, ready for a renderer.
#[derive(Debug, Clone, Serialize)]
pub struct InsightView {
    #[serde(flatten)]
    pub insight: Insight,
    pub snippet: SnippetResult,
    /// Escaped text with `<mark>` wrappers; safe to inject as HTML.
    pub snippet_html: String,
}

pub fn present(
    insights: Vec<Insight>,
    query: Option<&str>,
    settings: &SnippetSettings,
) -> Vec<InsightView> {
    insights
        .into_iter()
        .map(|insight| {
            let snippet = build_snippet(&insight, query, settings);
            let snippet_html = render_html(&snippet);
            InsightView {
                insight,
                snippet,
                snippet_html,
            }
        })
        .collect()
}
