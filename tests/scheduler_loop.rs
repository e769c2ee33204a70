// tests/scheduler_loop.rs
use std::sync::Arc;
use std::time::Duration;

use insight_tracker::config::parse_config;
use insight_tracker::ingest::fixture::FixtureFetcher;
use insight_tracker::ingest::scheduler::spawn_scheduler;
use insight_tracker::store::MemoryStore;
use insight_tracker::Pipeline;

#[tokio::test]
async fn scheduler_runs_immediately_and_stops_cleanly() {
    let cfg = parse_config(
        r#"
global_keywords = ["cursor"]

[[sources]]
name = "devtools"
endpoint = "https://devtools.test/rss"
"#,
        "toml",
    )
    .unwrap();
    let xml = std::fs::read_to_string("tests/fixtures/devtools_rss.xml").expect("fixture");
    let fetcher = Arc::new(FixtureFetcher::new().with_feed("devtools", xml));
    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::from_config(&cfg, fetcher.clone(), store.clone()).unwrap();

    let handle = spawn_scheduler(pipeline, Duration::from_secs(3600));

    // First tick fires right away.
    for _ in 0..50 {
        if !store.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(store.len(), 1);

    handle.stop().await.unwrap();
    assert_eq!(fetcher.calls().len(), 1);
}
