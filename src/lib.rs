//! Sumi-Tide: the scheduling and reconciliation core of a polite crawler
//!
//! This crate decides when each known URL may be fetched, fetches due URLs
//! under per-host politeness constraints, and folds every fetch outcome back
//! into a single durable record per URL.
//!
//! A crawl round runs as a sequence of phases (see [`job::Phase`]):
//! inject seeds, generate a fetch list, fetch it, and update the record db.

pub mod config;
pub mod fetcher;
pub mod generator;
pub mod injector;
pub mod job;
pub mod output;
pub mod reconciler;
pub mod record;
pub mod robots;
pub mod schedule;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Sumi-Tide operations
#[derive(Debug, Error)]
pub enum TideError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] fetcher::FetchError),

    #[error("Reconcile error: {0}")]
    Reconcile(#[from] reconciler::ReconcileError),

    #[error("Job error: {0}")]
    Job(#[from] job::JobError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("URL rejected by filter: {0}")]
    Rejected(String),

    #[error("Failed to resolve host {host}: {message}")]
    Resolve { host: String, message: String },
}

/// Result type alias for Sumi-Tide operations
pub type Result<T> = std::result::Result<T, TideError>;

// Re-export commonly used types
pub use config::Config;
pub use record::{CrawlRecord, CrawlStatus, MetaValue};
pub use schedule::{FetchSchedule, ModifiedState};
