// src/ingest/mod.rs
pub mod fetcher;
pub mod fixture;
pub mod manual;
pub mod parse;
pub mod scheduler;
pub mod types;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::{FetchSettings, SourceConfig, TrackerConfig};
use crate::dedup::UpsertGate;
use crate::error::{ConfigError, StoreError};
use crate::ingest::types::{CycleReport, FeedFetcher, RawEntry, SourceOutcome};
use crate::insight::Insight;
use crate::registry::SourceRegistry;
use crate::relevance::RelevanceEngine;
use crate::store::InsightStore;

pub const MAX_CONTENT_CHARS: usize = 20_000;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_cycles_total", "Scheduled ingest cycles started.");
        describe_counter!("ingest_entries_total", "Entries parsed from source feeds.");
        describe_counter!(
            "ingest_relevant_total",
            "Entries admitted by keyword relevance."
        );
        describe_counter!(
            "ingest_irrelevant_total",
            "Entries dropped for matching no keyword."
        );
        describe_counter!(
            "ingest_stale_total",
            "Entries dropped as older than the age cutoff."
        );
        describe_counter!(
            "ingest_duplicate_total",
            "Entries already stored for their source."
        );
        describe_counter!("ingest_inserted_total", "New insights persisted.");
        describe_counter!(
            "ingest_source_errors_total",
            "Source fetch/parse failures, by kind."
        );
        describe_histogram!("ingest_fetch_ms", "Source fetch time in milliseconds.");
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!(
            "ingest_last_cycle_ts",
            "Unix ts when the last ingest cycle finished."
        );
    });
}

/// Normalize text: decode entities, strip markup, collapse whitespace, trim.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Block tags become spaces so paragraphs don't glue together; inline tags vanish
    static RE_BLOCK: OnceCell<regex::Regex> = OnceCell::new();
    let re_block = RE_BLOCK.get_or_init(|| {
        regex::Regex::new(
            r"(?i)</?(?:p|div|br|li|ul|ol|h[1-6]|tr|td|th|table|blockquote|pre|section|article|figure|figcaption|hr)\b[^>]*>",
        )
        .unwrap()
    });
    out = re_block.replace_all(&out, " ").to_string();
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    // 5) Length cap
    if out.chars().count() > MAX_CONTENT_CHARS {
        out = out.chars().take(MAX_CONTENT_CHARS).collect();
    }

    out
}

/// Fetch → score → dedup → insert, wired to one registry, fetcher and store.
#[derive(Clone)]
pub struct Pipeline {
    registry: Arc<SourceRegistry>,
    engine: Arc<RelevanceEngine>,
    fetcher: Arc<dyn FeedFetcher>,
    store: Arc<dyn InsightStore>,
    settings: FetchSettings,
}

impl Pipeline {
    pub fn new(
        registry: SourceRegistry,
        engine: RelevanceEngine,
        fetcher: Arc<dyn FeedFetcher>,
        store: Arc<dyn InsightStore>,
        settings: FetchSettings,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            engine: Arc::new(engine),
            fetcher,
            store,
            settings,
        }
    }

    pub fn from_config(
        cfg: &TrackerConfig,
        fetcher: Arc<dyn FeedFetcher>,
        store: Arc<dyn InsightStore>,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(
            cfg.registry(),
            RelevanceEngine::from_config(cfg)?,
            fetcher,
            store,
            cfg.fetch.clone(),
        ))
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn InsightStore> {
        &self.store
    }

    /// Run one ingestion cycle over every enabled source.
    ///
    /// Fetch failures are isolated per source and show up in the report.
    /// A store outage stops all further writes and is returned as the error.
    pub async fn run_cycle(&self) -> Result<CycleReport, StoreError> {
        ensure_metrics_described();
        let now = Utc::now();
        let permits = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let abort = Arc::new(AtomicBool::new(false));

        let mut set = JoinSet::new();
        for source in self.registry.list_enabled_sources().cloned() {
            let this = self.clone();
            let permits = permits.clone();
            let abort = abort.clone();
            set.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                this.run_source(&source, now, &abort).await
            });
        }

        let mut report = CycleReport::default();
        let mut store_err: Option<StoreError> = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((outcome, err)) => {
                    report.outcomes.push(outcome);
                    if let Some(e) = err {
                        store_err.get_or_insert(e);
                    }
                }
                Err(e) => error!(target: "ingest", error = %e, "source task failed"),
            }
        }
        report.outcomes.sort_by(|a, b| a.source.cmp(&b.source));

        gauge!("ingest_last_cycle_ts").set(Utc::now().timestamp() as f64);
        info!(
            target: "ingest",
            sources = report.outcomes.len(),
            inserted = report.inserted(),
            failed = ?report.failed_sources(),
            "ingest cycle finished"
        );

        match store_err {
            Some(e) => {
                error!(target: "ingest", error = %e, "ingest cycle aborted by store failure");
                Err(e)
            }
            None => Ok(report),
        }
    }

    async fn run_source(
        &self,
        source: &SourceConfig,
        now: DateTime<Utc>,
        abort: &AtomicBool,
    ) -> (SourceOutcome, Option<StoreError>) {
        if abort.load(Ordering::SeqCst) {
            return (SourceOutcome::new(&source.name), None);
        }
        let t0 = std::time::Instant::now();
        let fetched = self.fetcher.fetch(source).await;
        histogram!("ingest_fetch_ms", "source" => source.name.clone())
            .record(t0.elapsed().as_secs_f64() * 1_000.0);

        match fetched {
            Ok(entries) => self.process_entries(source, entries, now, abort).await,
            Err(e) => {
                warn!(
                    target: "ingest",
                    source = %source.name,
                    kind = e.kind(),
                    error = %e,
                    "source fetch failed"
                );
                counter!("ingest_source_errors_total", "kind" => e.kind()).increment(1);
                (SourceOutcome::failed(&source.name, &e), None)
            }
        }
    }

    /// Score, dedup and persist entries of one source, in feed order.
    async fn process_entries(
        &self,
        source: &SourceConfig,
        entries: Vec<RawEntry>,
        now: DateTime<Utc>,
        abort: &AtomicBool,
    ) -> (SourceOutcome, Option<StoreError>) {
        let mut outcome = SourceOutcome::new(&source.name);
        outcome.fetched = entries.len();
        counter!("ingest_entries_total").increment(entries.len() as u64);

        let cutoff = self
            .settings
            .max_age_hours
            .and_then(|h| i64::try_from(h).ok())
            .and_then(chrono::Duration::try_hours)
            .and_then(|d| now.checked_sub_signed(d));
        let global = self.registry.global_keywords();
        let mut gate = UpsertGate::default();
        let mut failure = None;

        for entry in entries {
            if abort.load(Ordering::SeqCst) {
                break;
            }
            if let (Some(c), Some(p)) = (cutoff, entry.published) {
                if p < c {
                    outcome.stale += 1;
                    continue;
                }
            }
            let ann = self.engine.annotate(&entry, source, global);
            if !ann.score.relevant {
                outcome.irrelevant += 1;
                continue;
            }
            outcome.relevant += 1;

            let insight = Insight::from_entry(source, &entry, ann, now);
            let key = insight.dedup_key();
            let exists = match self.store.contains(&insight.source, &key).await {
                Ok(b) => b,
                Err(e) => {
                    abort.store(true, Ordering::SeqCst);
                    failure = Some(e);
                    break;
                }
            };
            if !gate.admit(&insight, |_, _| exists) {
                outcome.duplicates += 1;
                continue;
            }
            match self.store.insert(&insight).await {
                Ok(()) => {
                    outcome.inserted += 1;
                    debug!(target: "ingest", source = %source.name, key = %key, "insight stored");
                }
                Err(StoreError::ConstraintViolation { .. }) => {
                    // Lost a race with another source task; already stored.
                    outcome.duplicates += 1;
                }
                Err(e) => {
                    abort.store(true, Ordering::SeqCst);
                    failure = Some(e);
                    break;
                }
            }
        }

        counter!("ingest_relevant_total").increment(outcome.relevant as u64);
        counter!("ingest_irrelevant_total").increment(outcome.irrelevant as u64);
        counter!("ingest_stale_total").increment(outcome.stale as u64);
        counter!("ingest_duplicate_total").increment(outcome.duplicates as u64);
        counter!("ingest_inserted_total").increment(outcome.inserted as u64);
        debug!(
            target: "ingest",
            source = %source.name,
            fetched = outcome.fetched,
            relevant = outcome.relevant,
            inserted = outcome.inserted,
            duplicates = outcome.duplicates,
            "source processed"
        );
        (outcome, failure)
    }

    /// Push already-normalized entries for one source through score/dedup/insert.
    pub async fn ingest_entries(
        &self,
        source: &SourceConfig,
        entries: Vec<RawEntry>,
    ) -> Result<SourceOutcome, StoreError> {
        ensure_metrics_described();
        let abort = AtomicBool::new(false);
        match self.process_entries(source, entries, Utc::now(), &abort).await {
            (outcome, None) => Ok(outcome),
            (_, Some(e)) => Err(e),
        }
    }

    /// Ingest free text as if it were a feed entry of `source_name`.
    /// Unknown source names score against the global keywords only.
    pub async fn ingest_manual(
        &self,
        source_name: &str,
        raw_text: &str,
    ) -> Result<SourceOutcome, StoreError> {
        let source = self
            .registry
            .get(source_name)
            .cloned()
            .unwrap_or_else(|| SourceConfig::rss(source_name, "manual://"));
        let entry = manual::entry_from_text(raw_text);
        self.ingest_entries(&source, vec![entry]).await
    }
}
