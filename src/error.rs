// src/error.rs
//! Error taxonomy shared by the pipeline.
//!
//! `ConfigError` is fatal at startup, `FetchError` is isolated per source,
//! `StoreError` distinguishes "already there" from "store is down".

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("no config found (set INSIGHT_CONFIG_PATH or add config/sources.toml)")]
    Missing,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unexpected http status {0}")]
    HttpStatus(u16),
    #[error("feed parsing error: {0}")]
    Parse(String),
}

impl FetchError {
    /// Short label used as a metrics/log dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Network(_) => "network",
            FetchError::HttpStatus(_) => "http_status",
            FetchError::Parse(_) => "parse",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("insight already stored for {source_name} / {key}")]
    ConstraintViolation { source_name: String, key: String },
    #[error("insight store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}
