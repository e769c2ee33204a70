//! Insight tracker binary entrypoint.
//! Loads config, opens the store, and runs the periodic ingest loop until Ctrl-C.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use insight_tracker::config::load_config_default;
use insight_tracker::ingest::fetcher::HttpFetcher;
use insight_tracker::ingest::scheduler::spawn_scheduler;
use insight_tracker::metrics::{self as app_metrics, ENV_METRICS_ADDR};
use insight_tracker::store::{InsightStore, SqliteStore};
use insight_tracker::Pipeline;

/// Compact logs by default; `LOG_FORMAT=json` for structured output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("insight_tracker=info,ingest=info,store=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    // Malformed or missing config is fatal.
    let cfg = load_config_default().context("loading tracker config")?;

    if let Ok(addr) = std::env::var(ENV_METRICS_ADDR) {
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("{ENV_METRICS_ADDR} is not a socket address"))?;
        app_metrics::serve(addr).context("starting metrics exporter")?;
        info!(%addr, "metrics exporter listening");
    }

    let store: Arc<dyn InsightStore> = Arc::new(
        SqliteStore::connect(&cfg.store.path)
            .await
            .context("opening insight store")?,
    );
    let fetcher = Arc::new(HttpFetcher::new(&cfg.fetch).context("building http client")?);
    let pipeline = Pipeline::from_config(&cfg, fetcher, store)?;

    for s in pipeline.registry().source_info() {
        info!(
            source = %s.name,
            kind = s.kind,
            enabled = s.enabled,
            keywords = s.keyword_count,
            "source registered"
        );
    }

    if std::env::var("INGEST_RUN_ONCE").is_ok_and(|v| v == "1") {
        let report = pipeline.run_cycle().await?;
        for o in &report.outcomes {
            info!(
                source = %o.source,
                fetched = o.fetched,
                relevant = o.relevant,
                inserted = o.inserted,
                error = o.error.as_deref().unwrap_or(""),
                "source outcome"
            );
        }
        return Ok(());
    }

    let handle = spawn_scheduler(pipeline, Duration::from_secs(cfg.fetch.interval_secs));
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    if let Err(e) = handle.stop().await {
        warn!(error = %e, "scheduler did not stop cleanly");
    }
    Ok(())
}
