// src/trends.rs
//! Aggregates over insights for dashboards: per-day counts and recent-ingest status.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::insight::Insight;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrendPeriod {
    Week,
    Month,
    Quarter,
}

impl TrendPeriod {
    /// `7d`, `30d` or `90d`; anything else falls back to a week.
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "30d" => TrendPeriod::Month,
            "90d" => TrendPeriod::Quarter,
            _ => TrendPeriod::Week,
        }
    }

    pub fn days(self) -> i64 {
        match self {
            TrendPeriod::Week => 7,
            TrendPeriod::Month => 30,
            TrendPeriod::Quarter => 90,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub source: String,
    pub count: usize,
}

/// Count insights per (UTC day, source) within the period ending at `now`.
/// Sorted by day, then source.
pub fn trend_points(insights: &[Insight], period: TrendPeriod, now: DateTime<Utc>) -> Vec<TrendPoint> {
    let start = now - Duration::days(period.days());
    let mut buckets: BTreeMap<(NaiveDate, &str), usize> = BTreeMap::new();
    for i in insights.iter().filter(|i| i.date >= start && i.date <= now) {
        *buckets.entry((i.date.date_naive(), i.source.as_str())).or_default() += 1;
    }
    buckets
        .into_iter()
        .map(|((date, source), count)| TrendPoint {
            date,
            source: source.to_string(),
            count,
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub total_last_24h: usize,
    pub by_source: BTreeMap<String, usize>,
}

/// Insights created (ingested) in the last 24 hours.
pub fn status_summary(insights: &[Insight], now: DateTime<Utc>) -> StatusSummary {
    let since = now - Duration::hours(24);
    let mut out = StatusSummary::default();
    for i in insights.iter().filter(|i| i.created_at >= since) {
        out.total_last_24h += 1;
        *out.by_source.entry(i.source.clone()).or_default() += 1;
    }
    out
}

pub fn distinct_sources(insights: &[Insight]) -> BTreeSet<String> {
    insights.iter().map(|i| i.source.clone()).collect()
}

pub fn distinct_topics(insights: &[Insight]) -> BTreeSet<String> {
    insights.iter().flat_map(|i| i.topics.iter().cloned()).collect()
}
