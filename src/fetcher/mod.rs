//! Fetch round
//!
//! A round is driven by [`Fetcher::run`]:
//! - one [`QueueFeeder`] task moves the fetch list into the [`FetchQueues`]
//! - `threads` worker tasks claim items, fetch them and emit [`FetchOutput`]
//! - the calling task supervises: it enforces the time limit once the feeder
//!   is done and aborts the round when no request makes progress
//!
//! Output records are sent over an mpsc channel as soon as they are known,
//! so whatever was emitted before an abort stands.

mod feeder;
mod http;
mod item;
mod protocol;
mod queues;
mod worker;

pub use feeder::{FeederSummary, QueueFeeder};
pub use http::HttpProtocol;
pub use item::{FetchItem, QueueKey};
pub use protocol::{MetaRefresh, Protocol, ProtocolError, ProtocolResponse, ProtocolStatus};
pub use queues::{FetchQueues, HostQueue};
pub use worker::signature;

use crate::config::FetcherConfig;
use crate::record::{CrawlRecord, CrawlStatus};
use crate::url::UrlFilter;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use worker::{FetchWorker, WorkerContext};

/// How often the supervisor checks on the round
const SUPERVISOR_TICK: Duration = Duration::from_secs(1);

/// Errors that abort a fetch round
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("aborting with {active} hung workers")]
    HungThreads { active: usize },

    #[error("fetch task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A record emitted by a worker, with the fetched content if any
#[derive(Debug, Clone)]
pub struct FetchOutput {
    pub url: String,
    pub record: CrawlRecord,
    pub content: Option<Vec<u8>>,
}

/// Counters of a finished fetch round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub fed: usize,
    pub skipped: usize,
    pub success: usize,
    pub redirects: usize,
    pub not_modified: usize,
    pub retry: usize,
    pub gone: usize,
    pub robots_denied: usize,
    pub redirects_exceeded: usize,
    pub exceptions: usize,
    pub purged_by_exceptions: usize,
    pub purged_by_time_limit: usize,
    pub bytes: u64,
}

/// Shared progress counters of a round
#[derive(Debug)]
pub struct FetchStats {
    start: Instant,
    last_activity_ms: AtomicU64,
    active_workers: AtomicUsize,
    spin_waiting: AtomicUsize,
    success: AtomicUsize,
    redirects: AtomicUsize,
    not_modified: AtomicUsize,
    retry: AtomicUsize,
    gone: AtomicUsize,
    robots_denied: AtomicUsize,
    redirects_exceeded: AtomicUsize,
    exceptions: AtomicUsize,
    purged_by_exceptions: AtomicUsize,
    bytes: AtomicU64,
}

impl FetchStats {
    fn new(start: Instant) -> Self {
        Self {
            start,
            last_activity_ms: AtomicU64::new(0),
            active_workers: AtomicUsize::new(0),
            spin_waiting: AtomicUsize::new(0),
            success: AtomicUsize::new(0),
            redirects: AtomicUsize::new(0),
            not_modified: AtomicUsize::new(0),
            retry: AtomicUsize::new(0),
            gone: AtomicUsize::new(0),
            robots_denied: AtomicUsize::new(0),
            redirects_exceeded: AtomicUsize::new(0),
            exceptions: AtomicUsize::new(0),
            purged_by_exceptions: AtomicUsize::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Marks that a request started or finished
    pub(crate) fn touch(&self) {
        self.last_activity_ms.store(self.elapsed_ms(), Ordering::SeqCst);
    }

    fn idle_for(&self) -> Duration {
        let last = self.last_activity_ms.load(Ordering::SeqCst);
        Duration::from_millis(self.elapsed_ms().saturating_sub(last))
    }

    pub(crate) fn worker_started(&self) {
        self.active_workers.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn worker_stopped(&self) {
        self.active_workers.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn spin_waiting(&self, waiting: bool) {
        if waiting {
            self.spin_waiting.fetch_add(1, Ordering::SeqCst);
        } else {
            self.spin_waiting.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub(crate) fn record_status(&self, status: CrawlStatus) {
        let counter = match status {
            CrawlStatus::FetchSuccess => &self.success,
            CrawlStatus::FetchRedirTemp | CrawlStatus::FetchRedirPerm => &self.redirects,
            CrawlStatus::FetchNotModified => &self.not_modified,
            CrawlStatus::FetchRetry => &self.retry,
            CrawlStatus::FetchGone => &self.gone,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_robots_denied(&self) {
        self.robots_denied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_redirect_exceeded(&self) {
        self.redirects_exceeded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_exception(&self, purged: usize) {
        self.exceptions.fetch_add(1, Ordering::Relaxed);
        self.purged_by_exceptions.fetch_add(purged, Ordering::Relaxed);
    }

    pub(crate) fn record_bytes(&self, len: usize) {
        self.bytes.fetch_add(len as u64, Ordering::Relaxed);
    }

    /// Number of workers still running
    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::SeqCst)
    }

    fn summary(&self, feeder: FeederSummary, purged_by_time_limit: usize) -> FetchSummary {
        FetchSummary {
            fed: feeder.fed,
            skipped: feeder.skipped,
            success: self.success.load(Ordering::Relaxed),
            redirects: self.redirects.load(Ordering::Relaxed),
            not_modified: self.not_modified.load(Ordering::Relaxed),
            retry: self.retry.load(Ordering::Relaxed),
            gone: self.gone.load(Ordering::Relaxed),
            robots_denied: self.robots_denied.load(Ordering::Relaxed),
            redirects_exceeded: self.redirects_exceeded.load(Ordering::Relaxed),
            exceptions: self.exceptions.load(Ordering::Relaxed),
            purged_by_exceptions: self.purged_by_exceptions.load(Ordering::Relaxed),
            purged_by_time_limit: purged_by_time_limit + feeder.dropped_by_time_limit,
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

/// Runs fetch rounds with a fixed protocol and URL filter
pub struct Fetcher {
    config: FetcherConfig,
    protocol: Arc<dyn Protocol>,
    filter: Arc<dyn UrlFilter>,
    pause: watch::Receiver<bool>,
}

impl Fetcher {
    pub fn new(
        config: FetcherConfig,
        protocol: Arc<dyn Protocol>,
        filter: Arc<dyn UrlFilter>,
    ) -> Self {
        let (_, pause) = watch::channel(false);
        Self {
            config,
            protocol,
            filter,
            pause,
        }
    }

    /// Makes workers wait while the channel holds `true`
    pub fn with_pause(mut self, pause: watch::Receiver<bool>) -> Self {
        self.pause = pause;
        self
    }

    /// Fetches every entry of `input`, sending outcomes to `sink`
    ///
    /// # Returns
    ///
    /// * `Ok(FetchSummary)` - All workers finished
    /// * `Err(FetchError::HungThreads)` - No request started or finished for
    ///   half the task timeout while workers were still active; records
    ///   already sent to `sink` stand
    pub async fn run<I>(
        &self,
        input: I,
        sink: mpsc::Sender<FetchOutput>,
    ) -> Result<FetchSummary, FetchError>
    where
        I: IntoIterator<Item = (String, CrawlRecord)> + Send + 'static,
        I::IntoIter: Send + 'static,
    {
        let start = Instant::now();
        let queues = Arc::new(FetchQueues::new(&self.config, start));
        let feeder_alive = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(FetchStats::new(start));

        let feeder = QueueFeeder::new(
            queues.clone(),
            self.config.buffer_capacity(),
            self.config.queue_mode,
            feeder_alive.clone(),
        );
        let feeder_task = tokio::spawn(feeder.run(input));

        let ctx = Arc::new(WorkerContext {
            queues: queues.clone(),
            protocol: self.protocol.clone(),
            filter: self.filter.clone(),
            config: self.config.clone(),
            feeder_alive: feeder_alive.clone(),
            stats: stats.clone(),
            sink,
            pause: self.pause.clone(),
        });

        let threads = self.config.threads.max(1);
        let mut workers = JoinSet::new();
        for id in 0..threads {
            workers.spawn(FetchWorker::new(id, ctx.clone()).run());
        }
        drop(ctx);
        tracing::info!(threads, "Fetch round started");

        let hung_after = Duration::from_secs(self.config.task_timeout_secs / 2);
        let mut purged_by_time_limit = 0;
        let mut ticker = tokio::time::interval(SUPERVISOR_TICK);

        loop {
            tokio::select! {
                joined = workers.join_next() => match joined {
                    None => break,
                    Some(Err(e)) => tracing::error!("Fetch worker failed: {}", e),
                    Some(Ok(())) => {}
                },
                _ = ticker.tick() => {
                    tracing::debug!(
                        active = stats.active_workers(),
                        spin_waiting = stats.spin_waiting.load(Ordering::SeqCst),
                        pending = queues.total_pending(),
                        queues = queues.queue_count(),
                        "Fetch progress"
                    );

                    if !feeder_alive.load(Ordering::SeqCst) {
                        let purged = queues.check_time_limit();
                        if purged > 0 {
                            tracing::info!(purged, "Time limit reached, emptied queues");
                            purged_by_time_limit += purged;
                        }
                    }

                    let paused = *self.pause.borrow();
                    if paused {
                        stats.touch();
                    } else if stats.idle_for() > hung_after && stats.active_workers() > 0 {
                        let active = stats.active_workers();
                        tracing::warn!(active, idle = ?stats.idle_for(), "Aborting with hung workers");
                        workers.abort_all();
                        feeder_task.abort();
                        return Err(FetchError::HungThreads { active });
                    }
                }
            }
        }

        let feeder_summary = feeder_task.await?;
        let summary = stats.summary(feeder_summary, purged_by_time_limit);
        tracing::info!(
            success = summary.success,
            redirects = summary.redirects,
            retry = summary.retry,
            gone = summary.gone,
            "Fetch round finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{PROTOCOL_STATUS_KEY, REPR_URL_KEY};
    use crate::robots::RobotRules;
    use crate::url::StandardUrlFilter;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use url::Url;

    /// Protocol answering from a script keyed by URL
    #[derive(Default)]
    struct ScriptedProtocol {
        responses: Mutex<HashMap<String, Vec<ProtocolResponse>>>,
        robots: HashMap<String, RobotRules>,
        failures: Vec<String>,
        latency: Duration,
        hang: bool,
        log: Mutex<Vec<(String, Instant, Instant)>>,
    }

    impl ScriptedProtocol {
        fn respond(self, url: &str, response: ProtocolResponse) -> Self {
            self.responses
                .lock()
                .entry(url.to_string())
                .or_default()
                .push(response);
            self
        }
    }

    #[async_trait]
    impl Protocol for ScriptedProtocol {
        async fn robot_rules(&self, url: &Url) -> RobotRules {
            let host = url.host_str().unwrap_or_default();
            self.robots
                .get(host)
                .cloned()
                .unwrap_or_else(RobotRules::allow_all)
        }

        async fn fetch(
            &self,
            url: &Url,
            _record: &CrawlRecord,
        ) -> Result<ProtocolResponse, ProtocolError> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            let started = Instant::now();
            tokio::time::sleep(self.latency).await;
            self.log
                .lock()
                .push((url.to_string(), started, Instant::now()));

            if self.failures.iter().any(|f| f == url.as_str()) {
                return Err(ProtocolError::Connect("refused".to_string()));
            }
            let mut responses = self.responses.lock();
            let queue = responses.entry(url.to_string()).or_default();
            Ok(if queue.len() > 1 {
                queue.remove(0)
            } else {
                queue
                    .first()
                    .cloned()
                    .unwrap_or_else(|| ProtocolResponse::success("ok"))
            })
        }
    }

    fn fetcher_config() -> FetcherConfig {
        FetcherConfig {
            threads: 4,
            server_delay: 0.0,
            task_timeout_secs: 10,
            ..FetcherConfig::default()
        }
    }

    fn entry(url: &str) -> (String, CrawlRecord) {
        let mut record = CrawlRecord::new(CrawlStatus::DbUnfetched, 86_400, 1.0);
        record.fetch_time = 1;
        (url.to_string(), record)
    }

    async fn run_round(
        config: FetcherConfig,
        protocol: ScriptedProtocol,
        input: Vec<(String, CrawlRecord)>,
    ) -> (Result<FetchSummary, FetchError>, Vec<FetchOutput>, Arc<ScriptedProtocol>) {
        let protocol = Arc::new(protocol);
        let filter = Arc::new(StandardUrlFilter::default());
        let fetcher = Fetcher::new(config, protocol.clone(), filter);
        let (tx, mut rx) = mpsc::channel(1024);

        let result = fetcher.run(input, tx).await;
        let mut outputs = Vec::new();
        while let Ok(output) = rx.try_recv() {
            outputs.push(output);
        }
        (result, outputs, protocol)
    }

    fn find<'a>(outputs: &'a [FetchOutput], url: &str) -> &'a FetchOutput {
        outputs
            .iter()
            .find(|o| o.url == url)
            .unwrap_or_else(|| panic!("no output for {}", url))
    }

    #[tokio::test]
    async fn test_success_sets_signature_and_status() {
        let protocol = ScriptedProtocol::default()
            .respond("http://a.com/", ProtocolResponse::success("hello"));
        let (result, outputs, _) =
            run_round(fetcher_config(), protocol, vec![entry("http://a.com/")]).await;

        let summary = result.unwrap();
        assert_eq!(summary.fed, 1);
        assert_eq!(summary.success, 1);

        let output = find(&outputs, "http://a.com/");
        assert_eq!(output.record.status, CrawlStatus::FetchSuccess);
        assert_eq!(output.record.signature, Some(signature(b"hello")));
        assert_eq!(output.record.meta_text(PROTOCOL_STATUS_KEY), Some("success"));
        assert!(output.record.fetch_time > 1);
        assert_eq!(output.content.as_deref(), Some(&b"hello"[..]));
    }

    #[tokio::test]
    async fn test_outcome_table() {
        let protocol = ScriptedProtocol {
            failures: vec!["http://down.com/".to_string()],
            ..ScriptedProtocol::default()
        }
        .respond("http://a.com/404", ProtocolResponse::with_status(ProtocolStatus::NotFound))
        .respond("http://b.com/304", ProtocolResponse::with_status(ProtocolStatus::NotModified))
        .respond("http://c.com/503", ProtocolResponse::with_status(ProtocolStatus::Retry))
        .respond("http://d.com/403", ProtocolResponse::with_status(ProtocolStatus::AccessDenied));

        let input = vec![
            entry("http://a.com/404"),
            entry("http://b.com/304"),
            entry("http://c.com/503"),
            entry("http://d.com/403"),
            entry("http://down.com/"),
        ];
        let (result, outputs, _) = run_round(fetcher_config(), protocol, input).await;
        let summary = result.unwrap();

        assert_eq!(find(&outputs, "http://a.com/404").record.status, CrawlStatus::FetchGone);
        assert_eq!(
            find(&outputs, "http://b.com/304").record.status,
            CrawlStatus::FetchNotModified
        );
        assert_eq!(find(&outputs, "http://c.com/503").record.status, CrawlStatus::FetchRetry);
        assert_eq!(find(&outputs, "http://d.com/403").record.status, CrawlStatus::FetchGone);
        let down = find(&outputs, "http://down.com/");
        assert_eq!(down.record.status, CrawlStatus::FetchRetry);
        assert_eq!(down.record.meta_text(PROTOCOL_STATUS_KEY), Some("exception"));
        assert_eq!(summary.exceptions, 1);
        assert!(down.record.signature.is_none());
    }

    #[tokio::test]
    async fn test_robots_denial_and_crawl_delay_ceiling() {
        let mut robots = HashMap::new();
        robots.insert("denied.com".to_string(), RobotRules::forbid_all());
        robots.insert(
            "slow.com".to_string(),
            RobotRules::parse("User-agent: *\nCrawl-delay: 120", "TestCrawler"),
        );
        let protocol = ScriptedProtocol {
            robots,
            ..ScriptedProtocol::default()
        };

        let input = vec![entry("http://denied.com/x"), entry("http://slow.com/y")];
        let (result, outputs, protocol) = run_round(fetcher_config(), protocol, input).await;
        assert_eq!(result.unwrap().robots_denied, 2);

        for url in ["http://denied.com/x", "http://slow.com/y"] {
            let output = find(&outputs, url);
            assert_eq!(output.record.status, CrawlStatus::FetchGone);
            assert_eq!(output.record.meta_text(PROTOCOL_STATUS_KEY), Some("robots_denied"));
        }
        assert!(protocol.log.lock().is_empty());
    }

    #[tokio::test]
    async fn test_redirect_chain_is_bounded() {
        let mut protocol = ScriptedProtocol::default();
        for hop in 0..5 {
            protocol = protocol.respond(
                &format!("http://a.com/{}", hop),
                ProtocolResponse::redirect(format!("http://a.com/{}", hop + 1), false),
            );
        }
        let config = FetcherConfig {
            max_redirects: 2,
            ..fetcher_config()
        };

        let (result, outputs, protocol) = run_round(config, protocol, vec![entry("http://a.com/0")]).await;
        let summary = result.unwrap();

        // the original and two followed hops are fetched
        assert_eq!(protocol.log.lock().len(), 3);
        for hop in 0..3 {
            let output = find(&outputs, &format!("http://a.com/{}", hop));
            assert_eq!(output.record.status, CrawlStatus::FetchRedirPerm);
        }
        let exceeded = find(&outputs, "http://a.com/3");
        assert_eq!(exceeded.record.status, CrawlStatus::FetchGone);
        assert_eq!(exceeded.record.meta_text(PROTOCOL_STATUS_KEY), Some("redir_exceeded"));
        assert_eq!(summary.redirects_exceeded, 1);
        assert!(outputs.iter().all(|o| o.url != "http://a.com/4"));
    }

    #[tokio::test]
    async fn test_first_hop_exceeds_zero_redirect_limit() {
        let protocol = ScriptedProtocol::default().respond(
            "http://a.com/start",
            ProtocolResponse::redirect("http://a.com/next", false),
        );
        let config = FetcherConfig {
            max_redirects: 0,
            ..fetcher_config()
        };

        let (result, outputs, protocol) =
            run_round(config, protocol, vec![entry("http://a.com/start")]).await;
        let summary = result.unwrap();
        assert_eq!(protocol.log.lock().len(), 1);

        assert_eq!(
            find(&outputs, "http://a.com/start").record.status,
            CrawlStatus::FetchRedirPerm
        );
        let exceeded = find(&outputs, "http://a.com/next");
        assert_eq!(exceeded.record.status, CrawlStatus::FetchGone);
        assert_eq!(exceeded.record.meta_text(PROTOCOL_STATUS_KEY), Some("redir_exceeded"));
        assert_eq!(exceeded.record.meta_text(REPR_URL_KEY), Some("http://a.com/next"));
        assert_eq!(summary.redirects_exceeded, 1);
    }

    #[tokio::test]
    async fn test_reported_redirect_exceeded_is_gone() {
        let protocol = ScriptedProtocol::default().respond(
            "http://a.com/",
            ProtocolResponse::with_status(ProtocolStatus::RedirExceeded),
        );
        let (_, outputs, _) = run_round(fetcher_config(), protocol, vec![entry("http://a.com/")]).await;

        let output = find(&outputs, "http://a.com/");
        assert_eq!(output.record.status, CrawlStatus::FetchGone);
        assert_eq!(output.record.meta_text(PROTOCOL_STATUS_KEY), Some("redir_exceeded"));
    }

    #[tokio::test]
    async fn test_worker_waits_while_feeder_is_alive() {
        let config = fetcher_config();
        let queues = Arc::new(FetchQueues::new(&config, Instant::now()));
        let feeder_alive = Arc::new(AtomicBool::new(true));
        let (tx, mut rx) = mpsc::channel(16);
        let (_pause_tx, pause_rx) = watch::channel(false);
        let ctx = Arc::new(WorkerContext {
            queues: queues.clone(),
            protocol: Arc::new(ScriptedProtocol::default()),
            filter: Arc::new(StandardUrlFilter::default()),
            config,
            feeder_alive: feeder_alive.clone(),
            stats: Arc::new(FetchStats::new(Instant::now())),
            sink: tx,
            pause: pause_rx,
        });
        let worker = tokio::spawn(FetchWorker::new(0, ctx).run());

        // no queue, nothing pending, feeder still running
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(queues.total_pending(), 0);
        assert!(queues.next_item().is_none());
        assert!(!worker.is_finished());

        let (url, record) = entry("http://a.com/late");
        let item = FetchItem::create(&url, record, crate::config::QueueMode::ByHost).await.unwrap();
        queues.add_item(item);
        feeder_alive.store(false, Ordering::SeqCst);

        tokio::time::timeout(Duration::from_secs(5), worker)
            .await
            .expect("worker should exit once the feeder is done")
            .unwrap();
        let output = rx.recv().await.unwrap();
        assert_eq!(output.url, "http://a.com/late");
        assert_eq!(output.record.status, CrawlStatus::FetchSuccess);
    }

    #[tokio::test]
    async fn test_redirect_to_self_ends_chain() {
        let protocol = ScriptedProtocol::default().respond(
            "http://a.com/loop",
            ProtocolResponse::redirect("http://a.com/loop#frag", true),
        );
        let (_, outputs, protocol) =
            run_round(fetcher_config(), protocol, vec![entry("http://a.com/loop")]).await;
        assert_eq!(protocol.log.lock().len(), 1);
        assert_eq!(outputs.len(), 1);
    }

    #[tokio::test]
    async fn test_meta_refresh_is_followed() {
        let mut refreshing = ProtocolResponse::success("<html></html>");
        refreshing.refresh = Some(MetaRefresh {
            target: "http://a.com/landing".to_string(),
            delay_secs: 0,
        });
        let protocol = ScriptedProtocol::default().respond("http://a.com/", refreshing);

        let (_, outputs, _) = run_round(fetcher_config(), protocol, vec![entry("http://a.com/")]).await;
        assert_eq!(find(&outputs, "http://a.com/").record.status, CrawlStatus::FetchSuccess);
        let landing = find(&outputs, "http://a.com/landing");
        assert_eq!(landing.record.status, CrawlStatus::FetchSuccess);
        // temporary redirect from a root keeps the root as representative
        assert_eq!(landing.record.meta_text(REPR_URL_KEY), Some("http://a.com/"));
    }

    #[tokio::test]
    async fn test_would_block_is_capped() {
        let protocol = ScriptedProtocol::default().respond(
            "http://a.com/",
            ProtocolResponse::with_status(ProtocolStatus::WouldBlock),
        );
        let config = FetcherConfig {
            max_would_block_retries: 2,
            ..fetcher_config()
        };

        let (_, outputs, protocol) = run_round(config, protocol, vec![entry("http://a.com/")]).await;
        assert_eq!(protocol.log.lock().len(), 3);
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].record.status, CrawlStatus::FetchRetry);
    }

    #[tokio::test]
    async fn test_politeness_between_completions() {
        let protocol = ScriptedProtocol {
            latency: Duration::from_millis(20),
            ..ScriptedProtocol::default()
        };
        let config = FetcherConfig {
            server_delay: 0.3,
            ..fetcher_config()
        };
        let input = (0..3).map(|i| entry(&format!("http://a.com/{}", i))).collect();

        let (result, _, protocol) = run_round(config, protocol, input).await;
        assert_eq!(result.unwrap().success, 3);

        let mut log = protocol.log.lock().clone();
        log.sort_by_key(|(_, _, finished)| *finished);
        for pair in log.windows(2) {
            // a request never starts before the previous one finished plus the delay
            assert!(pair[1].1 >= pair[0].2 + Duration::from_millis(300));
        }
    }

    #[tokio::test]
    async fn test_exception_threshold_purges_host() {
        let failing: Vec<String> = (0..5).map(|i| format!("http://dead.com/{}", i)).collect();
        let protocol = ScriptedProtocol {
            failures: failing.clone(),
            ..ScriptedProtocol::default()
        };
        let config = FetcherConfig {
            threads: 1,
            max_exceptions_per_queue: 2,
            ..fetcher_config()
        };
        let input = failing.iter().map(|u| entry(u)).collect();

        let (result, outputs, protocol) = run_round(config, protocol, input).await;
        let summary = result.unwrap();
        assert_eq!(protocol.log.lock().len(), 2);
        assert_eq!(summary.exceptions, 2);
        assert_eq!(summary.purged_by_exceptions, 3);
        assert_eq!(outputs.len(), 2);
    }

    #[tokio::test]
    async fn test_hung_round_is_aborted_with_partial_output() {
        let protocol = ScriptedProtocol {
            hang: true,
            robots: HashMap::from([("denied.com".to_string(), RobotRules::forbid_all())]),
            ..ScriptedProtocol::default()
        };
        let config = FetcherConfig {
            threads: 2,
            task_timeout_secs: 2,
            ..fetcher_config()
        };
        let input = vec![entry("http://denied.com/"), entry("http://a.com/")];

        let (result, outputs, _) = run_round(config, protocol, input).await;
        assert!(matches!(result, Err(FetchError::HungThreads { .. })));
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].url, "http://denied.com/");
    }

    #[tokio::test]
    async fn test_paused_workers_wait_for_resume() {
        let (pause_tx, pause_rx) = watch::channel(true);
        let protocol = Arc::new(ScriptedProtocol::default());
        let fetcher = Fetcher::new(
            fetcher_config(),
            protocol.clone(),
            Arc::new(StandardUrlFilter::default()),
        )
        .with_pause(pause_rx);
        let (tx, mut rx) = mpsc::channel(16);

        let round = tokio::spawn(async move { fetcher.run(vec![entry("http://a.com/")], tx).await });
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(protocol.log.lock().is_empty());

        pause_tx.send(false).unwrap();
        let summary = round.await.unwrap().unwrap();
        assert_eq!(summary.success, 1);
        assert!(rx.recv().await.is_some());
    }
}
