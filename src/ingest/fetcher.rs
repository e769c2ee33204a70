// src/ingest/fetcher.rs
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::debug;

use crate::config::{ArxivQuery, FetchSettings, SourceConfig, SourceKind};
use crate::error::FetchError;
use crate::ingest::parse::parse_feed;
use crate::ingest::types::{FeedFetcher, RawEntry};

const FEED_ACCEPT: &str =
    "application/rss+xml, application/atom+xml, application/xml, text/xml, */*";

/// Fetches sources over HTTP with a per-request timeout. No retries.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(settings: &FetchSettings) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(settings.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// URL actually requested for a source.
    pub fn request_url(source: &SourceConfig) -> Result<Url, FetchError> {
        let parsed = match source.kind {
            SourceKind::Rss => Url::parse(&source.endpoint),
            SourceKind::Arxiv => {
                let q = source.arxiv.clone().unwrap_or_default();
                Url::parse_with_params(&source.endpoint, arxiv_params(&q))
            }
        };
        parsed.map_err(|e| FetchError::Parse(format!("bad endpoint `{}`: {e}", source.endpoint)))
    }
}

fn arxiv_params(q: &ArxivQuery) -> Vec<(&'static str, String)> {
    vec![
        ("search_query", q.search_query()),
        ("start", "0".to_string()),
        ("max_results", q.max_results.to_string()),
        ("sortBy", q.sort_by.clone()),
        ("sortOrder", q.sort_order.clone()),
    ]
}

#[async_trait]
impl FeedFetcher for HttpFetcher {
    async fn fetch(&self, source: &SourceConfig) -> Result<Vec<RawEntry>, FetchError> {
        let url = Self::request_url(source)?;
        let resp = self.client.get(url).header(ACCEPT, FEED_ACCEPT).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }
        let body = resp.text().await?;
        let entries = parse_feed(&body, &source.mapping)?;
        debug!(
            target: "ingest",
            source = %source.name,
            bytes = body.len(),
            entries = entries.len(),
            "feed fetched"
        );
        Ok(entries)
    }
}
