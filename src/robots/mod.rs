//! Robots.txt handling module
//!
//! This module fetches, parses, and caches robots.txt rules per host. The
//! HTTP protocol consults it before every fetch.

mod cache;
mod parser;

pub use cache::{CachedRobots, RobotsCache};
pub use parser::RobotRules;

use reqwest::{Client, StatusCode};
use url::Url;

/// Returns the cache key of a URL: `scheme://host[:port]`
pub fn robots_key(url: &Url) -> String {
    url.origin().ascii_serialization()
}

/// Fetches and parses robots.txt for the site of `url`
///
/// # Returns
///
/// * `Some(rules)` - Rules to cache: parsed on 2xx, forbid-all on 401/403,
///   allow-all on any other status
/// * `None` - robots.txt could not be requested; callers should allow the
///   fetch without caching the outcome
pub async fn fetch_robots(client: &Client, url: &Url, user_agent: &str) -> Option<RobotRules> {
    let mut robots_url = url.clone();
    robots_url.set_path("/robots.txt");
    robots_url.set_query(None);
    robots_url.set_fragment(None);

    let response = match client.get(robots_url.as_str()).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!(url = %robots_url, "robots.txt request failed: {}", e);
            return None;
        }
    };

    let status = response.status();
    if status.is_success() {
        match response.text().await {
            Ok(body) => Some(RobotRules::parse(&body, user_agent)),
            Err(e) => {
                tracing::debug!(url = %robots_url, "robots.txt body unreadable: {}", e);
                None
            }
        }
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Some(RobotRules::forbid_all())
    } else {
        Some(RobotRules::allow_all())
    }
}
