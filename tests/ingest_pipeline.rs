// tests/ingest_pipeline.rs
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use insight_tracker::config::{parse_config, TrackerConfig};
use insight_tracker::dedup::DedupKey;
use insight_tracker::ingest::fixture::FixtureFetcher;
use insight_tracker::store::MemoryStore;
use insight_tracker::{Insight, InsightFilter, InsightStore, Pipeline, StoreError};

const CONFIG: &str = r#"
global_keywords = ["amp", "cursor", "claude"]

[[sources]]
name = "devtools"
endpoint = "https://devtools.test/rss"
keywords = ["agent"]

[[sources]]
name = "research"
endpoint = "https://research.test/atom"
keywords = ["agent"]

[[sources]]
name = "broken"
endpoint = "https://broken.test/rss"

[[sources]]
name = "off"
endpoint = "https://off.test/rss"
enabled = false
"#;

fn config() -> TrackerConfig {
    let cfg = parse_config(CONFIG, "toml").unwrap();
    cfg.validate().unwrap();
    cfg
}

fn fixture(name: &str) -> String {
    std::fs::read_to_string(format!("tests/fixtures/{name}")).expect("fixture")
}

fn fetcher() -> Arc<FixtureFetcher> {
    Arc::new(
        FixtureFetcher::new()
            .with_feed("devtools", fixture("devtools_rss.xml"))
            .with_feed("research", fixture("research_atom.xml"))
            .with_feed("off", fixture("devtools_rss.xml"))
            .with_status("broken", 500),
    )
}

#[tokio::test]
async fn cycle_scores_dedups_and_isolates_failures() {
    let fetcher = fetcher();
    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::from_config(&config(), fetcher.clone(), store.clone()).unwrap();

    let report = pipeline.run_cycle().await.unwrap();

    // Disabled sources are never fetched.
    let calls = fetcher.calls();
    assert!(!calls.contains(&"off".to_string()));
    assert_eq!(calls.len(), 3);

    let dev = report.outcome("devtools").unwrap();
    assert_eq!(dev.fetched, 4);
    assert_eq!(dev.relevant, 3);
    assert_eq!(dev.irrelevant, 1);
    assert_eq!(dev.duplicates, 1);
    assert_eq!(dev.inserted, 2);

    let research = report.outcome("research").unwrap();
    assert_eq!(research.inserted, 2);

    // One failing source does not affect the rest.
    let broken = report.outcome("broken").unwrap();
    assert!(!broken.is_ok());
    assert_eq!(report.failed_sources(), vec!["broken"]);

    assert_eq!(report.inserted(), 4);
    assert_eq!(store.len(), 4);
}

#[tokio::test]
async fn second_cycle_inserts_nothing() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::from_config(&config(), fetcher(), store.clone()).unwrap();

    let first = pipeline.run_cycle().await.unwrap();
    let second = pipeline.run_cycle().await.unwrap();

    assert_eq!(first.inserted(), 4);
    assert_eq!(second.inserted(), 0);
    assert_eq!(second.outcome("devtools").unwrap().duplicates, 3);
    assert_eq!(store.len(), 4);
}

#[tokio::test]
async fn stored_rows_carry_canonical_links_and_annotations() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::from_config(&config(), fetcher(), store.clone()).unwrap();
    pipeline.run_cycle().await.unwrap();

    let rows = store
        .query(&InsightFilter::new().sources(["research"]))
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);

    let eval = rows
        .iter()
        .find(|i| i.title.starts_with("Evaluating"))
        .unwrap();
    assert_eq!(
        eval.link.as_deref(),
        Some("https://research.test/evaluating-agents")
    );
    assert_eq!(eval.author.as_deref(), Some("R. Smith"));
    assert!(eval.summary.starts_with("We benchmark Claude Code"));
    assert!(!eval.summary.contains('<'));
    assert!(eval.matched_keywords.contains("agent"));
    assert!(eval.matched_keywords.contains("claude"));
    assert!(eval.mentioned_tools.contains("Claude"));
    assert!(eval.mentioned_tools.contains("Copilot"));
    assert!(eval.topics.contains("Security"));
    assert!(eval.topics.contains("Testing"));

    let ide = rows.iter().find(|i| i.title == "Agents in the IDE").unwrap();
    assert_eq!(
        ide.link.as_deref(),
        Some("https://research.test/ide-agents-canonical")
    );

    // Newest first.
    assert!(rows[0].date >= rows[1].date);
}

#[tokio::test]
async fn entries_older_than_cutoff_are_skipped() {
    let mut cfg = config();
    // Fixture dates are in 2024.
    cfg.fetch.max_age_hours = Some(24);
    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::from_config(&cfg, fetcher(), store.clone()).unwrap();

    let report = pipeline.run_cycle().await.unwrap();
    let dev = report.outcome("devtools").unwrap();
    assert_eq!(dev.fetched, 4);
    assert_eq!(dev.stale, 4);
    assert_eq!(dev.inserted, 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn store_outage_fails_the_cycle() {
    let store = Arc::new(MemoryStore::new());
    store.set_offline(true);
    let pipeline = Pipeline::from_config(&config(), fetcher(), store.clone()).unwrap();

    let err = pipeline.run_cycle().await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));

    store.set_offline(false);
    assert!(store.is_empty());
}

#[tokio::test]
async fn manual_text_goes_through_the_same_gate() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::from_config(&config(), fetcher(), store.clone()).unwrap();
    let text = "Trying Claude Code on a legacy repo. Notes at https://notes.test/claude.";

    let first = pipeline.ingest_manual("notes", text).await.unwrap();
    assert_eq!(first.inserted, 1);
    let again = pipeline.ingest_manual("notes", text).await.unwrap();
    assert_eq!(again.inserted, 0);
    assert_eq!(again.duplicates, 1);

    let rows = store.all();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].source, "notes");
    assert_eq!(rows[0].title, "Trying Claude Code on a legacy repo.");
    assert_eq!(rows[0].link.as_deref(), Some("https://notes.test/claude"));

    let skipped = pipeline
        .ingest_manual("notes", "Nothing about any tool here.")
        .await
        .unwrap();
    assert_eq!(skipped.irrelevant, 1);
    assert_eq!(store.len(), 1);
}

/// Accepts `budget` inserts, then goes offline for every call.
struct FlakyStore {
    inner: MemoryStore,
    budget: AtomicUsize,
    tripped: AtomicBool,
}

impl FlakyStore {
    fn new(budget: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            budget: AtomicUsize::new(budget),
            tripped: AtomicBool::new(false),
        }
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.tripped.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl InsightStore for FlakyStore {
    async fn insert(&self, insight: &Insight) -> Result<(), StoreError> {
        self.check()?;
        let took = self
            .budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !took {
            self.tripped.store(true, Ordering::SeqCst);
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        self.inner.insert(insight).await
    }

    async fn contains(&self, source: &str, key: &DedupKey) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.contains(source, key).await
    }

    async fn query(&self, filter: &InsightFilter) -> Result<Vec<Insight>, StoreError> {
        self.check()?;
        self.inner.query(filter).await
    }
}

/// Never reports an existing key, so every duplicate reaches `insert`.
struct RacyStore {
    inner: MemoryStore,
}

#[async_trait]
impl InsightStore for RacyStore {
    async fn insert(&self, insight: &Insight) -> Result<(), StoreError> {
        self.inner.insert(insight).await
    }

    async fn contains(&self, _source: &str, _key: &DedupKey) -> Result<bool, StoreError> {
        Ok(false)
    }

    async fn query(&self, filter: &InsightFilter) -> Result<Vec<Insight>, StoreError> {
        self.inner.query(filter).await
    }
}

#[tokio::test]
async fn store_failing_mid_cycle_aborts_and_keeps_committed_rows() {
    let store = Arc::new(FlakyStore::new(1));
    let pipeline = Pipeline::from_config(&config(), fetcher(), store.clone()).unwrap();

    let err = pipeline.run_cycle().await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));

    assert!(store.tripped.load(Ordering::SeqCst));
    assert_eq!(store.inner.len(), 1);
}

#[tokio::test]
async fn insert_constraint_violation_counts_as_duplicate() {
    let store = Arc::new(RacyStore {
        inner: MemoryStore::new(),
    });
    let pipeline = Pipeline::from_config(&config(), fetcher(), store.clone()).unwrap();

    let first = pipeline.run_cycle().await.unwrap();
    assert_eq!(first.inserted(), 4);

    let second = pipeline.run_cycle().await.unwrap();
    let dev = second.outcome("devtools").unwrap();
    assert!(dev.is_ok());
    assert_eq!(dev.duplicates, 3);
    assert_eq!(dev.inserted, 0);
    assert_eq!(second.outcome("research").unwrap().duplicates, 2);
    assert_eq!(second.inserted(), 0);
    assert_eq!(store.inner.len(), 4);
}
