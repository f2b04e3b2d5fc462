//! Fetch worker
//!
//! Each worker claims items from the shared queues, fetches them through
//! the [`Protocol`] and turns the response into output records for the
//! reconciler. Redirects are followed inside the same iteration, up to the
//! configured number of hops.

use crate::config::FetcherConfig;
use crate::fetcher::{
    FetchItem, FetchOutput, FetchQueues, FetchStats, Protocol, ProtocolResponse, ProtocolStatus,
    QueueKey,
};
use crate::record::{now_millis, CrawlRecord, CrawlStatus, PROTOCOL_STATUS_KEY, REPR_URL_KEY};
use crate::url::{choose_repr, UrlFilter};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use url::Url;

/// How long an idle worker waits before asking the queues again
const IDLE_WAIT: Duration = Duration::from_millis(100);

/// Meta refreshes shorter than this are temporary redirects
const PERM_REFRESH_SECS: u32 = 5;

/// Everything a worker shares with the pool
pub(crate) struct WorkerContext {
    pub queues: Arc<FetchQueues>,
    pub protocol: Arc<dyn Protocol>,
    pub filter: Arc<dyn UrlFilter>,
    pub config: FetcherConfig,
    pub feeder_alive: Arc<AtomicBool>,
    pub stats: Arc<FetchStats>,
    pub sink: mpsc::Sender<FetchOutput>,
    pub pause: watch::Receiver<bool>,
}

pub(crate) struct FetchWorker {
    id: usize,
    ctx: Arc<WorkerContext>,
    pause: watch::Receiver<bool>,
}

/// Decrements the active worker count when a worker stops
struct ActiveGuard(Arc<FetchStats>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.worker_stopped();
    }
}

impl FetchWorker {
    pub fn new(id: usize, ctx: Arc<WorkerContext>) -> Self {
        let pause = ctx.pause.clone();
        Self { id, ctx, pause }
    }

    /// Runs until the feeder is done and no item is pending
    pub async fn run(mut self) {
        self.ctx.stats.worker_started();
        let _guard = ActiveGuard(self.ctx.stats.clone());
        tracing::debug!(worker = self.id, "Worker started");

        loop {
            self.wait_while_paused().await;

            let Some(item) = self.ctx.queues.next_item() else {
                if self.ctx.feeder_alive.load(Ordering::SeqCst)
                    || self.ctx.queues.total_pending() > 0
                {
                    self.ctx.stats.spin_waiting(true);
                    tokio::time::sleep(IDLE_WAIT).await;
                    self.ctx.stats.spin_waiting(false);
                    continue;
                }
                break;
            };

            self.process(item).await;
        }

        tracing::debug!(worker = self.id, "Worker finished");
    }

    async fn wait_while_paused(&mut self) {
        while *self.pause.borrow() {
            if self.pause.changed().await.is_err() {
                break;
            }
        }
    }

    /// Fetches one item and every redirect hop it leads to
    async fn process(&self, mut item: FetchItem) {
        loop {
            let rules = self.ctx.protocol.robot_rules(&item.url).await;
            if !rules.is_allowed(item.url.as_str()) {
                tracing::debug!(url = %item.url, "Denied by robots.txt");
                self.deny(&item).await;
                return;
            }

            if let Some(delay) = rules.crawl_delay() {
                let max = self.ctx.config.max_crawl_delay;
                if max >= 0.0 && delay.as_secs_f64() > max {
                    tracing::debug!(
                        url = %item.url,
                        crawl_delay = delay.as_secs_f64(),
                        "Crawl-delay above maximum, skipping"
                    );
                    self.deny(&item).await;
                    return;
                }
                self.ctx.queues.set_crawl_delay(&item.queue_key, delay);
            }

            self.ctx.stats.touch();
            let result = self.ctx.protocol.fetch(&item.url, &item.record).await;
            self.ctx.queues.finish_item(&item, false);
            self.ctx.stats.touch();

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!(url = %item.url, "Fetch failed: {}", e);
                    self.on_exception(&item).await;
                    return;
                }
            };
            self.ctx.stats.record_bytes(response.content.len());

            match self.classify(item, response).await {
                Some(next) => item = next,
                None => return,
            }
        }
    }

    /// Emits the outcome of a response; returns the redirect hop to follow
    async fn classify(&self, mut item: FetchItem, response: ProtocolResponse) -> Option<FetchItem> {
        let pstatus = response.status;
        match pstatus {
            ProtocolStatus::WouldBlock => {
                if item.would_block_retries < self.ctx.config.max_would_block_retries {
                    item.would_block_retries += 1;
                    self.ctx.queues.add_item(item);
                } else {
                    self.emit(&item, item.record.clone(), CrawlStatus::FetchRetry, pstatus, None)
                        .await;
                }
                None
            }
            ProtocolStatus::Success => {
                let mut record = item.record.clone();
                if response.modified_time > 0 {
                    record.modified_time = response.modified_time;
                }
                self.emit(
                    &item,
                    record,
                    CrawlStatus::FetchSuccess,
                    pstatus,
                    Some(response.content),
                )
                .await;

                let refresh = response.refresh?;
                let temp = refresh.delay_secs < PERM_REFRESH_SECS;
                self.handle_redirect(&item, &refresh.target, temp).await
            }
            ProtocolStatus::Moved | ProtocolStatus::TempMoved => {
                let temp = pstatus == ProtocolStatus::TempMoved;
                let status = if temp {
                    CrawlStatus::FetchRedirTemp
                } else {
                    CrawlStatus::FetchRedirPerm
                };
                self.emit(&item, item.record.clone(), status, pstatus, Some(response.content))
                    .await;

                match response.redirect {
                    Some(target) => self.handle_redirect(&item, &target, temp).await,
                    None => {
                        tracing::warn!(url = %item.url, "Redirect without a target");
                        None
                    }
                }
            }
            ProtocolStatus::Exception => {
                self.on_exception(&item).await;
                None
            }
            ProtocolStatus::Gone
            | ProtocolStatus::NotFound
            | ProtocolStatus::AccessDenied
            | ProtocolStatus::RobotsDenied
            | ProtocolStatus::RedirExceeded => {
                self.emit(&item, item.record.clone(), CrawlStatus::FetchGone, pstatus, None)
                    .await;
                None
            }
            ProtocolStatus::NotModified => {
                self.emit(&item, item.record.clone(), CrawlStatus::FetchNotModified, pstatus, None)
                    .await;
                None
            }
            ProtocolStatus::Retry
            | ProtocolStatus::Blocked
            | ProtocolStatus::Failed => {
                self.emit(&item, item.record.clone(), CrawlStatus::FetchRetry, pstatus, None)
                    .await;
                None
            }
        }
    }

    /// Policy denial: no request reached the host, so it is not penalized
    async fn deny(&self, item: &FetchItem) {
        self.ctx.queues.finish_item(item, true);
        self.ctx.stats.record_robots_denied();
        self.emit(
            item,
            item.record.clone(),
            CrawlStatus::FetchGone,
            ProtocolStatus::RobotsDenied,
            None,
        )
        .await;
    }

    async fn on_exception(&self, item: &FetchItem) {
        let purged = self.ctx.queues.check_exception_threshold(&item.queue_key);
        self.ctx.stats.record_exception(purged);
        self.emit(
            item,
            item.record.clone(),
            CrawlStatus::FetchRetry,
            ProtocolStatus::Exception,
            None,
        )
        .await;
    }

    /// Decides what happens to a redirect target
    ///
    /// Returns the claimed hop when it should be fetched now. A hop past
    /// `max_redirects` is emitted as gone with `redir_exceeded`.
    async fn handle_redirect(&self, item: &FetchItem, target: &str, temp: bool) -> Option<FetchItem> {
        let Some(new_url) = self.ctx.filter.filter(target) else {
            tracing::debug!(from = %item.url, to = target, "Redirect target rejected");
            return None;
        };
        if new_url == item.url.as_str() {
            return None;
        }

        let parsed = match Url::parse(&new_url) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(to = %new_url, "Malformed redirect target: {}", e);
                return None;
            }
        };
        if self.ctx.config.ignore_external_redirects && parsed.host_str() != item.url.host_str() {
            tracing::debug!(from = %item.url, to = %new_url, "Ignoring external redirect");
            return None;
        }

        let previous_repr = item
            .record
            .meta_text(REPR_URL_KEY)
            .unwrap_or(item.url.as_str());
        let repr = choose_repr(previous_repr, &new_url, temp);

        let max = self.ctx.config.max_redirects;
        let mut record =
            CrawlRecord::new(CrawlStatus::DbUnfetched, item.record.fetch_interval, item.record.score);
        record.put_all_metadata(&item.record);
        record.set_meta_text(REPR_URL_KEY, repr);

        let key = match QueueKey::resolve(&parsed, self.ctx.config.queue_mode).await {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(to = %new_url, "Cannot queue redirect target: {}", e);
                return None;
            }
        };
        let mut next = FetchItem::new(parsed, record, key);
        next.redirect_count = item.redirect_count + 1;

        if next.redirect_count > max {
            tracing::debug!(url = %next.url, hops = next.redirect_count, "Too many redirects");
            self.ctx.stats.record_redirect_exceeded();
            self.emit(
                &next,
                next.record.clone(),
                CrawlStatus::FetchGone,
                ProtocolStatus::RedirExceeded,
                None,
            )
            .await;
            return None;
        }

        while let Err(wait) = self.ctx.queues.claim_in_flight(&next) {
            tokio::time::sleep(wait).await;
        }
        tracing::debug!(from = %item.url, to = %next.url, hop = next.redirect_count, "Following redirect");
        Some(next)
    }

    /// Stamps a record with its fetch outcome and sends it to the sink
    async fn emit(
        &self,
        item: &FetchItem,
        mut record: CrawlRecord,
        status: CrawlStatus,
        pstatus: ProtocolStatus,
        content: Option<Vec<u8>>,
    ) {
        record.status = status;
        record.fetch_time = now_millis();
        record.set_meta_text(PROTOCOL_STATUS_KEY, pstatus.name());
        if status == CrawlStatus::FetchSuccess {
            record.signature = content.as_deref().map(signature);
        }
        self.ctx.stats.record_status(status);

        self.send(FetchOutput {
            url: item.url.to_string(),
            record,
            content,
        })
        .await;
    }

    async fn send(&self, output: FetchOutput) {
        if let Err(e) = self.ctx.sink.send(output).await {
            tracing::warn!(url = %e.0.url, "Output channel closed, dropping record");
        }
    }
}

/// SHA-256 fingerprint of fetched content
pub fn signature(content: &[u8]) -> Vec<u8> {
    Sha256::digest(content).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_stable() {
        assert_eq!(signature(b"hello"), signature(b"hello"));
        assert_ne!(signature(b"hello"), signature(b"world"));
        assert_eq!(signature(b"").len(), 32);
    }
}
