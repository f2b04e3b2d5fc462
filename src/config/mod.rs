//! Configuration module for Sumi-Tide
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use sumi_tide::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Fetch workers: {}", config.fetcher.threads);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AdaptiveConfig, Config, CountMode, DbConfig, FetcherConfig, FilterConfig, GenerateConfig,
    QueueMode, ScheduleClass, ScheduleConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};

pub(crate) use validation::validate_domain_pattern;

/// Configuration used by unit tests: short delays, one segment, in-memory-friendly paths
#[cfg(test)]
pub(crate) fn test_config() -> Config {
    let toml = r#"
[fetcher]
threads = 2
server-delay = 0.0
task-timeout-secs = 10

[schedule]
default-interval-secs = 86400
max-interval-secs = 864000
retry-max = 3

[db]
path = "./test.db"

[user-agent]
crawler-name = "TestCrawler"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"
"#;
    match parse_config(toml) {
        Ok(config) => config,
        Err(e) => panic!("test config is invalid: {}", e),
    }
}
