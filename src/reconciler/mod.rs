//! Record db update
//!
//! After a fetch round every URL may have several records: the db copy, the
//! fetch outcome, links discovered through redirects, a content signature
//! and parse metadata. The [`Reconciler`] folds them into one db record per
//! URL. A key that cannot be merged is logged and skipped; the rest of the
//! batch is unaffected.

mod merge;

pub use merge::Reconciler;

use crate::record::{CrawlRecord, CrawlStatus};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("unexpected status {status:?} for {url}")]
    UnexpectedStatus { url: String, status: CrawlStatus },
}

/// Counters of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileSummary {
    /// Keys processed
    pub keys: usize,

    /// Records written back
    pub written: usize,

    /// Keys dropped because additions are disabled
    pub dropped: usize,

    /// Keys skipped after an error
    pub failed: usize,

    /// Written records per db status
    pub by_status: HashMap<CrawlStatus, usize>,
}

impl Reconciler {
    /// Reconciles every key of a batch
    ///
    /// Keys are processed in order; failures are counted, never propagated.
    pub fn reconcile_all<I>(&self, groups: I, now: i64) -> (Vec<(String, CrawlRecord)>, ReconcileSummary)
    where
        I: IntoIterator<Item = (String, Vec<CrawlRecord>)>,
    {
        let mut summary = ReconcileSummary::default();
        let mut output = Vec::new();

        for (url, records) in groups {
            summary.keys += 1;
            match self.reconcile(&url, &records, now) {
                Ok(Some(record)) => {
                    summary.written += 1;
                    *summary.by_status.entry(record.status).or_insert(0) += 1;
                    output.push((url, record));
                }
                Ok(None) => summary.dropped += 1,
                Err(e) => {
                    tracing::error!(url = %url, "Skipping key: {}", e);
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            keys = summary.keys,
            written = summary.written,
            dropped = summary.dropped,
            failed = summary.failed,
            "Reconciliation finished"
        );
        (output, summary)
    }
}

/// Groups db records and round output by URL, db records first
///
/// The map is ordered by URL so a batch always reconciles in the same order.
pub fn group_by_url<A, B>(db: A, updates: B) -> BTreeMap<String, Vec<CrawlRecord>>
where
    A: IntoIterator<Item = (String, CrawlRecord)>,
    B: IntoIterator<Item = (String, CrawlRecord)>,
{
    let mut groups: BTreeMap<String, Vec<CrawlRecord>> = BTreeMap::new();
    for (url, record) in db.into_iter().chain(updates) {
        groups.entry(url).or_default().push(record);
    }
    groups
}
