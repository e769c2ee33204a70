// src/ingest/fixture.rs
//! Offline fetcher serving canned feed bodies per source name.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::config::SourceConfig;
use crate::error::FetchError;
use crate::ingest::parse::parse_feed;
use crate::ingest::types::{FeedFetcher, RawEntry};

#[derive(Debug, Clone)]
enum Canned {
    Body(String),
    Status(u16),
}

#[derive(Debug, Default)]
pub struct FixtureFetcher {
    feeds: HashMap<String, Canned>,
    calls: Mutex<Vec<String>>,
}

impl FixtureFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feed(mut self, source: &str, xml: impl Into<String>) -> Self {
        self.feeds.insert(source.to_string(), Canned::Body(xml.into()));
        self
    }

    /// Make `source` answer with a non-2xx status.
    pub fn with_status(mut self, source: &str, status: u16) -> Self {
        self.feeds.insert(source.to_string(), Canned::Status(status));
        self
    }

    /// Source names fetched so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl FeedFetcher for FixtureFetcher {
    async fn fetch(&self, source: &SourceConfig) -> Result<Vec<RawEntry>, FetchError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(source.name.clone());
        }
        match self.feeds.get(&source.name) {
            Some(Canned::Body(xml)) => parse_feed(xml, &source.mapping),
            Some(Canned::Status(code)) => Err(FetchError::HttpStatus(*code)),
            None => Err(FetchError::HttpStatus(404)),
        }
    }
}
