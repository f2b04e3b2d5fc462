use crate::record::CrawlStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A metadata value attached to a crawl record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetaValue {
    Text(String),
    Long(i64),
    Bytes(Vec<u8>),
}

impl MetaValue {
    /// Returns the text value, if this is a text entry
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the numeric value, if this is a long entry
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }
}

/// Everything the crawler knows about one URL
///
/// Times are epoch milliseconds; `modified_time` and `discovery_time` use 0
/// for "unknown". `fetch_interval` is in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlRecord {
    pub status: CrawlStatus,
    pub fetch_time: i64,
    pub modified_time: i64,
    pub retries_since_fetch: u32,
    pub fetch_interval: u32,
    pub score: f32,
    pub signature: Option<Vec<u8>>,
    pub discovery_time: i64,
    #[serde(default)]
    pub metadata: BTreeMap<String, MetaValue>,
}

impl CrawlRecord {
    /// Creates a record with the given status, interval and score
    pub fn new(status: CrawlStatus, fetch_interval: u32, score: f32) -> Self {
        Self {
            status,
            fetch_time: 0,
            modified_time: 0,
            retries_since_fetch: 0,
            fetch_interval,
            score,
            signature: None,
            discovery_time: 0,
            metadata: BTreeMap::new(),
        }
    }

    /// Creates a record with the given status and all other fields zeroed
    pub fn with_status(status: CrawlStatus) -> Self {
        Self::new(status, 0, 0.0)
    }

    /// Copies every metadata entry of `other` over this record's metadata
    pub fn put_all_metadata(&mut self, other: &CrawlRecord) {
        for (key, value) in &other.metadata {
            self.metadata.insert(key.clone(), value.clone());
        }
    }

    /// Returns a text metadata entry
    pub fn meta_text(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(MetaValue::as_text)
    }

    /// Returns a numeric metadata entry
    pub fn meta_long(&self, key: &str) -> Option<i64> {
        self.metadata.get(key).and_then(MetaValue::as_long)
    }

    /// Sets a text metadata entry
    pub fn set_meta_text(&mut self, key: &str, value: impl Into<String>) {
        self.metadata
            .insert(key.to_string(), MetaValue::Text(value.into()));
    }

    /// Sets a numeric metadata entry
    pub fn set_meta_long(&mut self, key: &str, value: i64) {
        self.metadata.insert(key.to_string(), MetaValue::Long(value));
    }

    /// Encodes the record as JSON for storage
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decodes a record stored as JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
