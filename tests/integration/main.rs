//! Integration tests for Sumi-Tide
//!
//! These tests use wiremock to create mock HTTP servers and run fetch
//! rounds and whole crawl rounds end-to-end.

mod crawl_cycle;
mod fetch_round;

use sumi_tide::config::{parse_config, Config};

/// Creates a test configuration with no politeness delay
pub fn test_config(db_path: &str) -> Config {
    let toml = format!(
        r#"
[fetcher]
threads = 3
server-delay = 0.0
task-timeout-secs = 20
request-timeout-secs = 5

[schedule]
default-interval-secs = 86400
max-interval-secs = 864000
retry-max = 2

[db]
path = "{}"

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"
"#,
        db_path.replace('\\', "/")
    );
    parse_config(&toml).expect("test config should be valid")
}
