//! Queue feeder
//!
//! A single background task that moves the round's input into the fetch
//! queues, keeping at most `capacity` items pending so memory stays bounded
//! however large the fetch list is.

use crate::config::QueueMode;
use crate::fetcher::{FetchItem, FetchQueues};
use crate::record::CrawlRecord;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How long the feeder waits when the queues are full
const FULL_QUEUE_WAIT: Duration = Duration::from_secs(1);

/// Counters reported by the feeder when its input is exhausted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeederSummary {
    /// Items added to the queues
    pub fed: usize,

    /// Input entries dropped because their URL was malformed
    pub skipped: usize,

    /// Input entries read after the time limit and discarded
    pub dropped_by_time_limit: usize,
}

/// Clears the liveness flag when the feeder stops, even if it panics
struct AliveGuard(Arc<AtomicBool>);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct QueueFeeder {
    queues: Arc<FetchQueues>,
    capacity: usize,
    mode: QueueMode,
    alive: Arc<AtomicBool>,
}

impl QueueFeeder {
    /// Creates a feeder; `alive` is set now and cleared when `run` returns
    pub fn new(
        queues: Arc<FetchQueues>,
        capacity: usize,
        mode: QueueMode,
        alive: Arc<AtomicBool>,
    ) -> Self {
        alive.store(true, Ordering::SeqCst);
        Self {
            queues,
            capacity: capacity.max(1),
            mode,
            alive,
        }
    }

    /// Feeds every `(url, record)` pair of `input` into the queues
    pub async fn run<I>(self, input: I) -> FeederSummary
    where
        I: IntoIterator<Item = (String, CrawlRecord)>,
        I::IntoIter: Send,
    {
        let _guard = AliveGuard(self.alive.clone());
        let mut input = input.into_iter();
        let mut summary = FeederSummary::default();

        'feed: loop {
            if self.queues.time_limit_passed() {
                summary.dropped_by_time_limit = input.by_ref().count();
                tracing::info!(
                    dropped = summary.dropped_by_time_limit,
                    "Time limit reached, draining remaining input"
                );
                break;
            }

            let feed = self.capacity.saturating_sub(self.queues.total_pending());
            if feed == 0 {
                tokio::time::sleep(FULL_QUEUE_WAIT).await;
                continue;
            }

            for _ in 0..feed {
                let Some((url, record)) = input.next() else {
                    break 'feed;
                };
                match FetchItem::create(&url, record, self.mode).await {
                    Ok(item) => {
                        self.queues.add_item(item);
                        summary.fed += 1;
                    }
                    Err(e) => {
                        tracing::warn!(url = %url, "Skipping fetch list entry: {}", e);
                        summary.skipped += 1;
                    }
                }
            }
        }

        tracing::info!(
            fed = summary.fed,
            skipped = summary.skipped,
            "Feeder finished"
        );
        summary
    }
}
