use crate::config::QueueMode;
use crate::record::CrawlRecord;
use crate::UrlError;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use url::Url;

static NEXT_ITEM_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies a politeness partition: `scheme://host` or `scheme://ip`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueKey(String);

impl QueueKey {
    /// Builds a by-host key
    pub fn by_host(url: &Url) -> Result<Self, UrlError> {
        let host = url.host_str().ok_or(UrlError::MissingHost)?;
        Ok(Self(format!("{}://{}", url.scheme(), host.to_lowercase())))
    }

    /// Builds the key for `url` under the configured queue mode
    ///
    /// In by-ip mode the host is resolved and the first address is used.
    pub async fn resolve(url: &Url, mode: QueueMode) -> Result<Self, UrlError> {
        match mode {
            QueueMode::ByHost => Self::by_host(url),
            QueueMode::ByIp => {
                let host = url.host_str().ok_or(UrlError::MissingHost)?;
                let port = url.port_or_known_default().unwrap_or(80);
                let mut addrs = tokio::net::lookup_host((host, port)).await.map_err(|e| {
                    UrlError::Resolve {
                        host: host.to_string(),
                        message: e.to_string(),
                    }
                })?;
                let addr = addrs.next().ok_or_else(|| UrlError::Resolve {
                    host: host.to_string(),
                    message: "no addresses".to_string(),
                })?;
                Ok(Self(format!("{}://{}", url.scheme(), addr.ip())))
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A unit of fetch work
///
/// Items are owned by exactly one place at a time: a host queue while
/// pending, then the worker that claimed it. The queue only remembers the
/// id of an in-flight item.
#[derive(Debug, Clone)]
pub struct FetchItem {
    pub id: u64,
    pub url: Url,
    pub record: CrawlRecord,
    pub queue_key: QueueKey,

    /// Times this item went back into its queue after a would-block outcome
    pub would_block_retries: u32,

    /// Redirect hops followed to reach this item
    pub redirect_count: u32,
}

impl FetchItem {
    pub fn new(url: Url, record: CrawlRecord, queue_key: QueueKey) -> Self {
        Self {
            id: NEXT_ITEM_ID.fetch_add(1, Ordering::Relaxed),
            url,
            record,
            queue_key,
            would_block_retries: 0,
            redirect_count: 0,
        }
    }

    /// Parses `url` and derives its queue key
    pub async fn create(url: &str, record: CrawlRecord, mode: QueueMode) -> Result<Self, UrlError> {
        let parsed = Url::parse(url).map_err(|e| UrlError::Parse(e.to_string()))?;
        let key = QueueKey::resolve(&parsed, mode).await?;
        Ok(Self::new(parsed, record, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CrawlStatus;

    #[test]
    fn test_by_host_key() {
        let url = Url::parse("https://Example.com:8443/a?b").unwrap();
        assert_eq!(QueueKey::by_host(&url).unwrap().as_str(), "https://example.com");
    }

    #[test]
    fn test_scheme_separates_queues() {
        let http = QueueKey::by_host(&Url::parse("http://a.com/").unwrap()).unwrap();
        let https = QueueKey::by_host(&Url::parse("https://a.com/").unwrap()).unwrap();
        assert_ne!(http, https);
    }

    #[tokio::test]
    async fn test_by_ip_key_for_literal_address() {
        let url = Url::parse("http://127.0.0.1:9000/x").unwrap();
        let key = QueueKey::resolve(&url, QueueMode::ByIp).await.unwrap();
        assert_eq!(key.as_str(), "http://127.0.0.1");
    }

    #[tokio::test]
    async fn test_create_rejects_malformed() {
        let record = CrawlRecord::with_status(CrawlStatus::DbUnfetched);
        let result = FetchItem::create("::nope", record, QueueMode::ByHost).await;
        assert!(matches!(result, Err(UrlError::Parse(_))));
    }

    #[test]
    fn test_ids_are_unique() {
        let url = Url::parse("http://a.com/").unwrap();
        let key = QueueKey::by_host(&url).unwrap();
        let record = CrawlRecord::with_status(CrawlStatus::DbUnfetched);
        let a = FetchItem::new(url.clone(), record.clone(), key.clone());
        let b = FetchItem::new(url, record, key);
        assert_ne!(a.id, b.id);
    }
}
