use crate::reconciler::ReconcileError;
use crate::record::{CrawlRecord, CrawlStatus, MetaValue, GENERATE_TIME_KEY};
use crate::schedule::{FetchSchedule, FetchTimes, ModifiedState};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Folds every record known for one URL into the next db record
pub struct Reconciler {
    schedule: Arc<dyn FetchSchedule>,
    additions_allowed: bool,
    score_linked: f32,
    retry_max: u32,
}

/// Records of one key, sorted by origin
#[derive(Default)]
struct Inputs<'a> {
    old: Option<&'a CrawlRecord>,
    fetch: Option<&'a CrawlRecord>,
    linked: Option<&'a CrawlRecord>,
    signature: Option<&'a [u8]>,
    parse_meta: Option<&'a BTreeMap<String, MetaValue>>,
}

/// Keeps the record with the latest fetch time; the first one wins ties
fn latest<'a>(current: Option<&'a CrawlRecord>, candidate: &'a CrawlRecord) -> Option<&'a CrawlRecord> {
    match current {
        Some(current) if current.fetch_time >= candidate.fetch_time => Some(current),
        _ => Some(candidate),
    }
}

impl Reconciler {
    pub fn new(
        schedule: Arc<dyn FetchSchedule>,
        additions_allowed: bool,
        score_linked: f32,
        retry_max: u32,
    ) -> Self {
        Self {
            schedule,
            additions_allowed,
            score_linked,
            retry_max,
        }
    }

    /// Builds a reconciler from the `[db]` and `[schedule]` sections
    pub fn from_config(config: &crate::Config, schedule: Arc<dyn FetchSchedule>) -> Self {
        Self::new(
            schedule,
            config.db.additions_allowed,
            config.db.score_linked,
            config.schedule.retry_max,
        )
    }

    /// Merges the records of `url` into its next db record
    ///
    /// Returns `Ok(None)` when the key is dropped: no db record and link
    /// additions disabled. The result depends only on the inputs and `now`.
    pub fn reconcile(
        &self,
        url: &str,
        records: &[CrawlRecord],
        now: i64,
    ) -> Result<Option<CrawlRecord>, ReconcileError> {
        let inputs = classify(url, records)?;

        let Some(old) = inputs.old else {
            if !self.additions_allowed {
                return Ok(None);
            }
            return Ok(inputs
                .fetch
                .or(inputs.linked)
                .map(|fetch| self.merge(url, None, fetch, &inputs, now)));
        };

        match inputs.fetch.or(inputs.linked) {
            Some(fetch) => Ok(Some(self.merge(url, Some(old), fetch, &inputs, now))),
            None => Ok(Some(old.clone())),
        }
    }

    fn merge(
        &self,
        url: &str,
        old: Option<&CrawlRecord>,
        fetch: &CrawlRecord,
        inputs: &Inputs<'_>,
        now: i64,
    ) -> CrawlRecord {
        let signature = inputs
            .signature
            .map(<[u8]>::to_vec)
            .or_else(|| fetch.signature.clone());

        let mut result = fetch.clone();
        if let Some(old) = old {
            let mut metadata = old.metadata.clone();
            metadata.extend(fetch.metadata.clone());
            result.metadata = metadata;
            if old.modified_time > 0 && fetch.modified_time == 0 {
                result.modified_time = old.modified_time;
            }
        }

        let times = FetchTimes {
            prev_fetch: old.map_or(0, |o| o.fetch_time),
            prev_modified: old.map_or(0, |o| o.modified_time),
            fetch: fetch.fetch_time,
            modified: fetch.modified_time,
        };

        match fetch.status {
            CrawlStatus::Linked => match old {
                Some(old) => result = old.clone(),
                None => {
                    self.schedule.initialize(url, &mut result, now);
                    result.status = CrawlStatus::DbUnfetched;
                    result.score = self.score_linked;
                }
            },
            CrawlStatus::FetchSuccess
            | CrawlStatus::FetchRedirTemp
            | CrawlStatus::FetchRedirPerm
            | CrawlStatus::FetchNotModified => {
                if let Some(meta) = inputs.parse_meta {
                    result.metadata.extend(meta.clone());
                }

                let state = modified_state(fetch.status, old, signature.as_deref());
                self.schedule
                    .set_fetch_schedule(url, &mut result, times, state);

                if state == ModifiedState::NotModified {
                    result.status = CrawlStatus::DbNotModified;
                    result.modified_time = times.prev_modified;
                    if let Some(old) = old {
                        result.signature = old.signature.clone();
                    }
                } else {
                    result.status = match fetch.status {
                        CrawlStatus::FetchSuccess => CrawlStatus::DbFetched,
                        CrawlStatus::FetchRedirPerm => CrawlStatus::DbRedirPerm,
                        _ => CrawlStatus::DbRedirTemp,
                    };
                    result.signature = signature;
                }

                if result.discovery_time == 0 && fetch.status == CrawlStatus::FetchSuccess {
                    result.discovery_time = fetch.fetch_time;
                }

                if result.fetch_interval > self.schedule.settings().max_interval {
                    self.schedule
                        .force_refetch(url, &mut result, false, fetch.fetch_time);
                }
            }
            CrawlStatus::FetchRetry => {
                if let Some(old) = old {
                    result.signature = old.signature.clone();
                }
                self.schedule
                    .set_page_retry_schedule(url, &mut result, times);
                if result.retries_since_fetch < self.retry_max {
                    result.status = CrawlStatus::DbUnfetched;
                } else {
                    tracing::debug!(url, retries = result.retries_since_fetch, "Retry ceiling reached");
                    result.status = CrawlStatus::DbGone;
                    self.schedule
                        .set_page_gone_schedule(url, &mut result, times);
                }
            }
            CrawlStatus::FetchGone => {
                if let Some(old) = old {
                    result.signature = old.signature.clone();
                }
                result.status = CrawlStatus::DbGone;
                self.schedule
                    .set_page_gone_schedule(url, &mut result, times);
            }
            // classify only hands fetch statuses and links to merge
            _ => {}
        }

        if let Some(old) = old {
            if old.discovery_time != 0 {
                result.discovery_time = old.discovery_time;
            }
        }
        result.metadata.remove(GENERATE_TIME_KEY);
        result
    }
}

/// Sorts one key's records by origin; any status without a role is an error
fn classify<'a>(url: &str, records: &'a [CrawlRecord]) -> Result<Inputs<'a>, ReconcileError> {
    let mut inputs = Inputs::default();

    for record in records {
        match record.status {
            status if status.is_db_status() => inputs.old = latest(inputs.old, record),
            status if status.is_fetch_status() => inputs.fetch = latest(inputs.fetch, record),
            CrawlStatus::Linked => {
                if inputs.linked.map_or(true, |best| record.score > best.score) {
                    inputs.linked = Some(record);
                }
            }
            CrawlStatus::Signature => inputs.signature = record.signature.as_deref(),
            CrawlStatus::ParseMeta => inputs.parse_meta = Some(&record.metadata),
            status => {
                return Err(ReconcileError::UnexpectedStatus {
                    url: url.to_string(),
                    status,
                })
            }
        }
    }

    Ok(inputs)
}

/// Only a successful fetch is compared by signature; redirects stay unknown
fn modified_state(
    status: CrawlStatus,
    old: Option<&CrawlRecord>,
    signature: Option<&[u8]>,
) -> ModifiedState {
    match status {
        CrawlStatus::FetchNotModified => ModifiedState::NotModified,
        CrawlStatus::FetchSuccess => {
            match (old.and_then(|o| o.signature.as_deref()), signature) {
                (Some(previous), Some(current)) if previous == current => {
                    ModifiedState::NotModified
                }
                (Some(_), Some(_)) => ModifiedState::Modified,
                _ => ModifiedState::Unknown,
            }
        }
        _ => ModifiedState::Unknown,
    }
}
