//! Fetch queue engine
//!
//! Pending work is partitioned into one [`HostQueue`] per [`QueueKey`].
//! Each queue enforces its own politeness:
//! - at most `max_threads` items in flight
//! - no new item before `next_fetch_time`, which every finished fetch pushes
//!   forward by the crawl delay
//!
//! All queues sit behind one lock. Critical sections only move items and
//! timestamps around; network I/O never happens while it is held. The number
//! of pending items is mirrored in an atomic so the feeder and the
//! supervisor can read it without locking.

use crate::config::FetcherConfig;
use crate::fetcher::{FetchItem, QueueKey};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Pending and in-flight work of one politeness partition
#[derive(Debug)]
pub struct HostQueue {
    pending: VecDeque<FetchItem>,
    in_flight: HashSet<u64>,
    crawl_delay: Duration,
    min_crawl_delay: Duration,
    max_threads: usize,
    next_fetch_time: Instant,
    exception_count: u64,
}

impl HostQueue {
    fn new(max_threads: usize, crawl_delay: Duration, min_crawl_delay: Duration, now: Instant) -> Self {
        Self {
            pending: VecDeque::new(),
            in_flight: HashSet::new(),
            crawl_delay,
            min_crawl_delay,
            max_threads,
            next_fetch_time: now,
            exception_count: 0,
        }
    }

    fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty()
    }

    fn can_start(&self, now: Instant) -> bool {
        self.in_flight.len() < self.max_threads && now >= self.next_fetch_time
    }

    /// Claims the head item if the queue allows another fetch at `now`
    fn next_eligible(&mut self, now: Instant) -> Option<FetchItem> {
        if !self.can_start(now) {
            return None;
        }
        let item = self.pending.pop_front()?;
        self.in_flight.insert(item.id);
        Some(item)
    }

    fn finish(&mut self, id: u64, asap: bool, now: Instant) {
        self.in_flight.remove(&id);
        self.next_fetch_time = if asap {
            now
        } else if self.max_threads > 1 {
            now + self.min_crawl_delay
        } else {
            now + self.crawl_delay
        };
    }

    fn purge(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }
}

/// The set of host queues shared by the feeder and the workers
#[derive(Debug)]
pub struct FetchQueues {
    queues: Mutex<HashMap<QueueKey, HostQueue>>,
    total_pending: AtomicUsize,
    max_threads: usize,
    crawl_delay: Duration,
    min_crawl_delay: Duration,
    max_exceptions: Option<u64>,
    deadline: Option<Instant>,
}

impl FetchQueues {
    /// Creates an empty queue set
    ///
    /// The time limit of the round, if any, counts from `start`.
    pub fn new(config: &FetcherConfig, start: Instant) -> Self {
        let deadline = u64::try_from(config.time_limit_mins)
            .ok()
            .map(|mins| start + Duration::from_secs(mins * 60));
        let max_exceptions = u64::try_from(config.max_exceptions_per_queue)
            .ok()
            .filter(|max| *max > 0);

        Self {
            queues: Mutex::new(HashMap::new()),
            total_pending: AtomicUsize::new(0),
            max_threads: config.threads_per_queue.max(1),
            crawl_delay: Duration::from_secs_f64(config.server_delay.max(0.0)),
            min_crawl_delay: Duration::from_secs_f64(config.server_min_delay.max(0.0)),
            max_exceptions,
            deadline,
        }
    }

    fn new_queue(&self, now: Instant) -> HostQueue {
        HostQueue::new(self.max_threads, self.crawl_delay, self.min_crawl_delay, now)
    }

    /// Appends an item to its queue, creating the queue if needed
    pub fn add_item(&self, item: FetchItem) {
        let now = Instant::now();
        let mut queues = self.queues.lock();
        queues
            .entry(item.queue_key.clone())
            .or_insert_with(|| self.new_queue(now))
            .pending
            .push_back(item);
        self.total_pending.fetch_add(1, Ordering::SeqCst);
    }

    /// Claims the next eligible item, if any queue has one
    pub fn next_item(&self) -> Option<FetchItem> {
        self.next_item_at(Instant::now())
    }

    /// Claims the next item eligible at `now`
    ///
    /// Idle queues are reaped during the scan. Returning None does not mean
    /// the round is over: items may be pending behind a crawl delay.
    pub fn next_item_at(&self, now: Instant) -> Option<FetchItem> {
        let mut queues = self.queues.lock();
        queues.retain(|_, queue| !queue.is_idle());

        let item = queues.values_mut().find_map(|queue| queue.next_eligible(now))?;
        self.total_pending.fetch_sub(1, Ordering::SeqCst);
        Some(item)
    }

    /// Releases an in-flight item and pushes its queue's next fetch time
    ///
    /// With `asap` the queue may serve its next item immediately; this is
    /// used when no request reached the host.
    pub fn finish_item(&self, item: &FetchItem, asap: bool) {
        self.finish_item_at(item, asap, Instant::now());
    }

    pub fn finish_item_at(&self, item: &FetchItem, asap: bool, now: Instant) {
        let mut queues = self.queues.lock();
        match queues.get_mut(&item.queue_key) {
            Some(queue) => queue.finish(item.id, asap, now),
            None => tracing::debug!(queue = %item.queue_key, "Finished item of a purged queue"),
        }
    }

    /// Registers an item created outside the feeder (a followed redirect)
    /// as in flight on its queue
    ///
    /// Fails with the time to wait when the queue is at its thread cap or
    /// still inside its crawl delay; the caller sleeps and tries again.
    pub fn claim_in_flight(&self, item: &FetchItem) -> Result<(), Duration> {
        self.claim_in_flight_at(item, Instant::now())
    }

    pub fn claim_in_flight_at(&self, item: &FetchItem, now: Instant) -> Result<(), Duration> {
        let mut queues = self.queues.lock();
        let queue = queues
            .entry(item.queue_key.clone())
            .or_insert_with(|| self.new_queue(now));

        if queue.can_start(now) {
            queue.in_flight.insert(item.id);
            return Ok(());
        }

        let wait = queue.next_fetch_time.saturating_duration_since(now);
        Err(wait.max(BUSY_QUEUE_WAIT))
    }

    /// Overrides the crawl delay of a queue (robots Crawl-delay)
    pub fn set_crawl_delay(&self, key: &QueueKey, delay: Duration) {
        if let Some(queue) = self.queues.lock().get_mut(key) {
            queue.crawl_delay = delay;
        }
    }

    /// Counts a transport failure against a queue
    ///
    /// When the count reaches the configured maximum and the queue still has
    /// pending items, they are purged and their number returned. Returns 0
    /// otherwise.
    pub fn check_exception_threshold(&self, key: &QueueKey) -> usize {
        let mut queues = self.queues.lock();
        let Some(queue) = queues.get_mut(key) else {
            return 0;
        };

        queue.exception_count += 1;
        let Some(max) = self.max_exceptions else {
            return 0;
        };
        if queue.exception_count < max || queue.pending.is_empty() {
            return 0;
        }

        let purged = queue.purge();
        self.total_pending.fetch_sub(purged, Ordering::SeqCst);
        tracing::info!(
            queue = %key,
            exceptions = queue.exception_count,
            purged,
            "Purged queue after too many exceptions"
        );
        purged
    }

    /// Returns true once the round's time limit has passed
    pub fn time_limit_passed(&self) -> bool {
        self.time_limit_passed_at(Instant::now())
    }

    pub fn time_limit_passed_at(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Empties every queue once the time limit has passed
    ///
    /// Returns the number of purged items.
    pub fn check_time_limit(&self) -> usize {
        self.check_time_limit_at(Instant::now())
    }

    pub fn check_time_limit_at(&self, now: Instant) -> usize {
        if !self.time_limit_passed_at(now) {
            return 0;
        }
        self.empty_queues()
    }

    /// Purges the pending items of every queue
    pub fn empty_queues(&self) -> usize {
        let mut queues = self.queues.lock();
        let purged: usize = queues.values_mut().map(HostQueue::purge).sum();
        queues.retain(|_, queue| !queue.is_idle());

        if queues.is_empty() {
            self.total_pending.store(0, Ordering::SeqCst);
        } else {
            self.total_pending.fetch_sub(purged, Ordering::SeqCst);
        }
        purged
    }

    /// Number of items waiting in any queue
    pub fn total_pending(&self) -> usize {
        self.total_pending.load(Ordering::SeqCst)
    }

    /// Number of live queues
    pub fn queue_count(&self) -> usize {
        self.queues.lock().len()
    }

    /// Number of items in flight on one queue
    pub fn in_flight_count(&self, key: &QueueKey) -> usize {
        self.queues
            .lock()
            .get(key)
            .map_or(0, |queue| queue.in_flight.len())
    }
}

/// Wait suggested to a redirect hop whose queue is at its thread cap
const BUSY_QUEUE_WAIT: Duration = Duration::from_millis(50);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CrawlRecord, CrawlStatus};
    use url::Url;

    fn config(threads_per_queue: usize, delay: f64, min_delay: f64) -> FetcherConfig {
        FetcherConfig {
            threads_per_queue,
            server_delay: delay,
            server_min_delay: min_delay,
            ..FetcherConfig::default()
        }
    }

    fn item(url: &str) -> FetchItem {
        let url = Url::parse(url).unwrap();
        let key = QueueKey::by_host(&url).unwrap();
        FetchItem::new(url, CrawlRecord::with_status(CrawlStatus::DbUnfetched), key)
    }

    #[test]
    fn test_fifo_within_queue() {
        let start = Instant::now();
        let queues = FetchQueues::new(&config(1, 0.0, 0.0), start);
        queues.add_item(item("http://a.com/1"));
        queues.add_item(item("http://a.com/2"));
        assert_eq!(queues.total_pending(), 2);

        let first = queues.next_item_at(start).unwrap();
        assert_eq!(first.url.path(), "/1");
        queues.finish_item_at(&first, false, start);

        let second = queues.next_item_at(start).unwrap();
        assert_eq!(second.url.path(), "/2");
        assert_eq!(queues.total_pending(), 0);
    }

    #[test]
    fn test_crawl_delay_blocks_until_elapsed() {
        let start = Instant::now();
        let queues = FetchQueues::new(&config(1, 2.0, 0.0), start);
        queues.add_item(item("http://a.com/1"));
        queues.add_item(item("http://a.com/2"));

        let first = queues.next_item_at(start).unwrap();
        let finished = start + Duration::from_millis(300);
        queues.finish_item_at(&first, false, finished);

        assert!(queues.next_item_at(finished + Duration::from_millis(1999)).is_none());
        assert!(queues.next_item_at(finished + Duration::from_secs(2)).is_some());
    }

    #[test]
    fn test_asap_finish_skips_delay() {
        let start = Instant::now();
        let queues = FetchQueues::new(&config(1, 30.0, 0.0), start);
        queues.add_item(item("http://a.com/1"));
        queues.add_item(item("http://a.com/2"));

        let first = queues.next_item_at(start).unwrap();
        queues.finish_item_at(&first, true, start);
        assert!(queues.next_item_at(start).is_some());
    }

    #[test]
    fn test_thread_cap_and_min_delay() {
        let start = Instant::now();
        let queues = FetchQueues::new(&config(2, 30.0, 1.0), start);
        for i in 0..3 {
            queues.add_item(item(&format!("http://a.com/{}", i)));
        }
        let key = QueueKey::by_host(&Url::parse("http://a.com/").unwrap()).unwrap();

        let a = queues.next_item_at(start).unwrap();
        let _b = queues.next_item_at(start).unwrap();
        assert_eq!(queues.in_flight_count(&key), 2);
        assert!(queues.next_item_at(start).is_none());

        // with several threads per queue the minimum delay applies
        queues.finish_item_at(&a, false, start);
        assert!(queues.next_item_at(start + Duration::from_millis(500)).is_none());
        assert!(queues.next_item_at(start + Duration::from_secs(1)).is_some());
        assert!(queues.in_flight_count(&key) <= 2);
    }

    #[test]
    fn test_hosts_do_not_block_each_other() {
        let start = Instant::now();
        let queues = FetchQueues::new(&config(1, 60.0, 0.0), start);
        queues.add_item(item("http://a.com/1"));
        queues.add_item(item("http://a.com/2"));
        queues.add_item(item("http://b.com/1"));

        let first = queues.next_item_at(start).unwrap();
        queues.finish_item_at(&first, false, start);
        let second = queues.next_item_at(start).unwrap();
        assert_ne!(first.queue_key, second.queue_key);
    }

    #[test]
    fn test_idle_queues_are_reaped() {
        let start = Instant::now();
        let queues = FetchQueues::new(&config(1, 0.0, 0.0), start);
        queues.add_item(item("http://a.com/1"));
        let claimed = queues.next_item_at(start).unwrap();
        assert_eq!(queues.queue_count(), 1);

        queues.finish_item_at(&claimed, false, start);
        assert!(queues.next_item_at(start).is_none());
        assert_eq!(queues.queue_count(), 0);
    }

    #[test]
    fn test_empty_set_returns_none() {
        let queues = FetchQueues::new(&config(1, 0.0, 0.0), Instant::now());
        assert!(queues.next_item().is_none());
        assert_eq!(queues.total_pending(), 0);
    }

    #[test]
    fn test_exception_threshold_purges_on_nth_failure() {
        let start = Instant::now();
        let mut cfg = config(1, 0.0, 0.0);
        cfg.max_exceptions_per_queue = 3;
        let queues = FetchQueues::new(&cfg, start);
        for i in 0..5 {
            queues.add_item(item(&format!("http://a.com/{}", i)));
        }
        let key = QueueKey::by_host(&Url::parse("http://a.com/").unwrap()).unwrap();
        let claimed = queues.next_item_at(start).unwrap();

        assert_eq!(queues.check_exception_threshold(&key), 0);
        assert_eq!(queues.check_exception_threshold(&key), 0);
        assert_eq!(queues.check_exception_threshold(&key), 4);
        assert_eq!(queues.total_pending(), 0);
        assert_eq!(queues.check_exception_threshold(&key), 0);

        queues.finish_item_at(&claimed, false, start);
    }

    #[test]
    fn test_exception_threshold_disabled() {
        let start = Instant::now();
        let queues = FetchQueues::new(&config(1, 0.0, 0.0), start);
        queues.add_item(item("http://a.com/1"));
        let key = QueueKey::by_host(&Url::parse("http://a.com/").unwrap()).unwrap();
        for _ in 0..10 {
            assert_eq!(queues.check_exception_threshold(&key), 0);
        }
        let missing = QueueKey::by_host(&Url::parse("http://z.com/").unwrap()).unwrap();
        assert_eq!(queues.check_exception_threshold(&missing), 0);
    }

    #[test]
    fn test_time_limit_empties_queues() {
        let start = Instant::now();
        let mut cfg = config(1, 0.0, 0.0);
        cfg.time_limit_mins = 1;
        let queues = FetchQueues::new(&cfg, start);
        queues.add_item(item("http://a.com/1"));
        queues.add_item(item("http://b.com/1"));

        assert_eq!(queues.check_time_limit_at(start + Duration::from_secs(59)), 0);
        assert_eq!(queues.check_time_limit_at(start + Duration::from_secs(60)), 2);
        assert_eq!(queues.total_pending(), 0);
        assert_eq!(queues.queue_count(), 0);
    }

    #[test]
    fn test_no_time_limit() {
        let start = Instant::now();
        let queues = FetchQueues::new(&config(1, 0.0, 0.0), start);
        queues.add_item(item("http://a.com/1"));
        assert!(!queues.time_limit_passed_at(start + Duration::from_secs(86_400)));
        assert_eq!(queues.check_time_limit_at(start + Duration::from_secs(86_400)), 0);
    }

    #[test]
    fn test_claim_in_flight_respects_delay() {
        let start = Instant::now();
        let queues = FetchQueues::new(&config(1, 5.0, 0.0), start);
        queues.add_item(item("http://a.com/1"));
        let first = queues.next_item_at(start).unwrap();
        queues.finish_item_at(&first, false, start);

        let redirect = item("http://a.com/moved");
        let wait = queues.claim_in_flight_at(&redirect, start).unwrap_err();
        assert_eq!(wait, Duration::from_secs(5));

        let later = start + Duration::from_secs(5);
        assert!(queues.claim_in_flight_at(&redirect, later).is_ok());
        // the claimed redirect now holds the only slot
        assert!(queues.next_item_at(later).is_none());
    }

    #[test]
    fn test_set_crawl_delay_overrides() {
        let start = Instant::now();
        let queues = FetchQueues::new(&config(1, 0.0, 0.0), start);
        queues.add_item(item("http://a.com/1"));
        queues.add_item(item("http://a.com/2"));
        let first = queues.next_item_at(start).unwrap();
        queues.set_crawl_delay(&first.queue_key, Duration::from_secs(10));
        queues.finish_item_at(&first, false, start);

        assert!(queues.next_item_at(start + Duration::from_secs(9)).is_none());
        assert!(queues.next_item_at(start + Duration::from_secs(10)).is_some());
    }
}
