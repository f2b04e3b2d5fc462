//! HTTP protocol implementation
//!
//! This module handles all HTTP requests of a fetch round, including:
//! - Building the client with the configured user agent
//! - Conditional GET requests using the record's modified time
//! - Reporting redirects without following them
//! - Truncating bodies to the configured size
//! - Detecting `<meta http-equiv="refresh">` redirects in HTML
//! - Per-host robots.txt caching

use crate::config::{FetcherConfig, UserAgentConfig};
use crate::fetcher::{MetaRefresh, Protocol, ProtocolError, ProtocolResponse, ProtocolStatus};
use crate::record::CrawlRecord;
use crate::robots::{fetch_robots, robots_key, RobotRules, RobotsCache};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::{CONTENT_TYPE, IF_MODIFIED_SINCE, LAST_MODIFIED, LOCATION};
use reqwest::{redirect::Policy, Client, Response};
use scraper::{Html, Selector};
use std::time::Duration;
use url::Url;

/// Builds an HTTP client with proper configuration
///
/// Redirects are never followed by the client; the fetch workers decide
/// what happens to them.
pub fn build_http_client(
    fetcher: &FetcherConfig,
    user_agent: &UserAgentConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(Duration::from_secs(fetcher.request_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .build()
}

/// [`Protocol`] backed by reqwest
pub struct HttpProtocol {
    client: Client,
    user_agent: String,
    max_content_bytes: usize,
    robots: RobotsCache,
}

impl HttpProtocol {
    pub fn new(fetcher: &FetcherConfig, user_agent: &UserAgentConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(fetcher, user_agent)?,
            user_agent: user_agent.header_value(),
            max_content_bytes: fetcher.max_content_bytes,
            robots: RobotsCache::new(),
        })
    }
}

#[async_trait]
impl Protocol for HttpProtocol {
    async fn robot_rules(&self, url: &Url) -> RobotRules {
        let key = robots_key(url);
        if let Some(rules) = self.robots.get(&key) {
            return rules;
        }

        match fetch_robots(&self.client, url, &self.user_agent).await {
            Some(rules) => {
                self.robots.insert(&key, rules.clone());
                rules
            }
            None => RobotRules::allow_all(),
        }
    }

    async fn fetch(
        &self,
        url: &Url,
        record: &CrawlRecord,
    ) -> Result<ProtocolResponse, ProtocolError> {
        let mut request = self.client.get(url.as_str());
        if let Some(since) = http_date(record.modified_time) {
            request = request.header(IF_MODIFIED_SINCE, since);
        }

        let mut response = request.send().await?;
        let code = response.status().as_u16();
        let status = ProtocolStatus::from_http_code(code);
        let headers = response.headers();

        let redirect = match status {
            ProtocolStatus::Moved | ProtocolStatus::TempMoved => headers
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|location| url.join(location).ok())
                .map(|target| target.to_string()),
            _ => None,
        };
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let modified_time = headers
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
            .map_or(0, |d| d.timestamp_millis());

        let content = read_body(&mut response, self.max_content_bytes).await?;

        let is_html = content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("html"));
        let refresh = if status == ProtocolStatus::Success && is_html {
            find_meta_refresh(&String::from_utf8_lossy(&content), url)
        } else {
            None
        };

        tracing::trace!(url = %url, code, bytes = content.len(), "Fetched");

        Ok(ProtocolResponse {
            status,
            code,
            content,
            content_type,
            redirect,
            refresh,
            modified_time,
        })
    }
}

/// Reads at most `limit` bytes of the body; the rest is never downloaded
async fn read_body(response: &mut Response, limit: usize) -> Result<Vec<u8>, reqwest::Error> {
    let mut content = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let room = limit.saturating_sub(content.len());
        if chunk.len() >= room {
            content.extend_from_slice(&chunk[..room]);
            tracing::debug!(url = %response.url(), limit, "Content limit reached");
            break;
        }
        content.extend_from_slice(&chunk);
    }
    Ok(content)
}

/// Formats epoch milliseconds as an HTTP date; None for unknown times
fn http_date(millis: i64) -> Option<String> {
    if millis <= 0 {
        return None;
    }
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|d| d.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
}

/// Extracts a `<meta http-equiv="refresh" content="N; url=...">` redirect
pub fn find_meta_refresh(html: &str, base: &Url) -> Option<MetaRefresh> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("meta[http-equiv]").ok()?;

    document
        .select(&selector)
        .filter(|meta| {
            meta.value()
                .attr("http-equiv")
                .is_some_and(|v| v.eq_ignore_ascii_case("refresh"))
        })
        .find_map(|meta| parse_refresh_content(meta.value().attr("content")?, base))
}

fn parse_refresh_content(content: &str, base: &Url) -> Option<MetaRefresh> {
    let (delay, rest) = content.split_once([';', ',']).unwrap_or((content, ""));
    let delay_secs = delay.trim().split('.').next()?.parse::<u32>().ok()?;

    let rest = rest.trim();
    let target = match rest.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("url=") => &rest[4..],
        _ => rest,
    };
    let target = target.trim().trim_matches(|c| c == '\'' || c == '"');
    if target.is_empty() {
        return None;
    }

    let target = base.join(target).ok()?;
    Some(MetaRefresh {
        target: target.to_string(),
        delay_secs,
    })
}
