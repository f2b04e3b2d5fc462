//! Crawl record model
//!
//! A [`CrawlRecord`] is everything the crawler knows about one URL. The same
//! type flows through every phase: the generator reads it from the record db,
//! the fetcher emits it tagged with a fetch status, and the reconciler folds
//! old and new copies back into one db record.

mod crawl_record;
mod status;

pub use crawl_record::{CrawlRecord, MetaValue};
pub use status::CrawlStatus;

/// Metadata key holding the time (epoch ms) a record was put on a fetch list
pub const GENERATE_TIME_KEY: &str = "_ngt_";

/// Metadata key holding the representative URL of a redirect chain
pub const REPR_URL_KEY: &str = "_repr_";

/// Metadata key holding the name of the last protocol status
pub const PROTOCOL_STATUS_KEY: &str = "_pst_";

const MILLIS_PER_SECOND: i64 = 1000;

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Converts an interval in seconds to milliseconds
pub fn secs_to_millis(secs: u32) -> i64 {
    i64::from(secs) * MILLIS_PER_SECOND
}
