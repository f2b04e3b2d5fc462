//! Fetch list generation
//!
//! The [`Selector`] reads the record db, keeps the records that are due,
//! ranks them and caps how many URLs of one host or domain go into each
//! segment. A segment is the fetch list of one round.

mod selector;

pub use selector::Selector;

use crate::record::CrawlRecord;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A record placed in a segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorEntry {
    pub url: String,
    pub record: CrawlRecord,
    pub segment: u32,
}

/// The fetch list of one round
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub name: String,
    pub entries: Vec<SelectorEntry>,
}

impl Segment {
    /// Returns the `(url, record)` pairs to feed into a fetch round
    pub fn fetch_list(&self) -> Vec<(String, CrawlRecord)> {
        self.entries
            .iter()
            .map(|entry| (entry.url.clone(), entry.record.clone()))
            .collect()
    }
}

/// Result of one generation
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Non-empty segments in fetch order
    pub segments: Vec<Segment>,

    /// Db records stamped with the generation time, to write back
    pub marked: Vec<(String, CrawlRecord)>,

    /// Eligible records that did not fit in any segment
    pub dropped: usize,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Names a segment after its generation time: `YYYYmmddHHMMSS-N`
pub fn segment_name(now: i64, index: usize) -> String {
    let stamp = Utc
        .timestamp_millis_opt(now)
        .single()
        .map(|d| d.format("%Y%m%d%H%M%S").to_string())
        .unwrap_or_else(|| now.to_string());
    format!("{}-{}", stamp, index)
}
