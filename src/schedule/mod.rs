//! Fetch schedule policies
//!
//! A fetch schedule decides when a record is due again. It is a pure policy:
//! every method mutates only the record it is handed and reads time from its
//! arguments, so the reconciler stays deterministic for a given input.
//!
//! Two implementations are provided:
//! - [`DefaultSchedule`]: keeps the interval fixed
//! - [`AdaptiveSchedule`]: shrinks the interval for changing pages and grows
//!   it for stable ones

mod adaptive;
mod default;

pub use adaptive::AdaptiveSchedule;
pub use default::DefaultSchedule;

use crate::config::{ScheduleClass, ScheduleConfig};
use crate::record::{secs_to_millis, CrawlRecord, CrawlStatus};
use std::sync::Arc;

const SECONDS_PER_DAY: u32 = 24 * 60 * 60;

/// Whether a page changed since its previous fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifiedState {
    Unknown,
    Modified,
    NotModified,
}

/// Limits shared by every schedule implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSettings {
    /// Interval for newly scheduled records (seconds)
    pub default_interval: u32,

    /// System-wide maximum interval (seconds)
    pub max_interval: u32,
}

impl From<&ScheduleConfig> for ScheduleSettings {
    fn from(config: &ScheduleConfig) -> Self {
        Self {
            default_interval: config.default_interval_secs,
            max_interval: config.max_interval_secs,
        }
    }
}

/// Previous and current fetch/modification times of a record (epoch ms)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetchTimes {
    pub prev_fetch: i64,
    pub prev_modified: i64,
    pub fetch: i64,
    pub modified: i64,
}

/// Policy computing the next fetch time and interval of a record
pub trait FetchSchedule: Send + Sync {
    /// Returns the limits this schedule works with
    fn settings(&self) -> &ScheduleSettings;

    /// Sets the next fetch time after a successful fetch
    ///
    /// Implementations must reset `retries_since_fetch`.
    fn set_fetch_schedule(
        &self,
        url: &str,
        record: &mut CrawlRecord,
        times: FetchTimes,
        state: ModifiedState,
    );

    /// Schedules a record that has never been fetched
    fn initialize(&self, _url: &str, record: &mut CrawlRecord, now: i64) {
        record.fetch_time = now;
        record.fetch_interval = self.settings().default_interval;
        record.retries_since_fetch = 0;
    }

    /// Schedules a record whose page is gone: the interval grows by half
    /// until it passes the system maximum, at which point a refetch is forced
    fn set_page_gone_schedule(&self, url: &str, record: &mut CrawlRecord, times: FetchTimes) {
        let max = self.settings().max_interval;
        if record.fetch_interval < max {
            record.fetch_interval = scale_interval(record.fetch_interval, 1.5);
        }
        record.fetch_time = times.fetch + secs_to_millis(record.fetch_interval);
        if record.fetch_interval > max {
            self.force_refetch(url, record, false, times.fetch);
        }
    }

    /// Schedules a record whose fetch failed transiently: retry in a day
    fn set_page_retry_schedule(&self, _url: &str, record: &mut CrawlRecord, times: FetchTimes) {
        record.fetch_time = times.fetch + secs_to_millis(SECONDS_PER_DAY);
        record.retries_since_fetch += 1;
    }

    /// Returns the time the record was last fetched, derived from its schedule
    fn calculate_last_fetch_time(&self, record: &CrawlRecord) -> i64 {
        record.fetch_time - secs_to_millis(record.fetch_interval)
    }

    /// Returns true if the record is due at `now`
    ///
    /// A record scheduled further out than the maximum interval, or holding an
    /// interval above it, is pulled back to `now` so it cannot starve forever.
    fn should_fetch(&self, _url: &str, record: &mut CrawlRecord, now: i64) -> bool {
        let max = self.settings().max_interval;
        if record.fetch_time - now > secs_to_millis(max) || record.fetch_interval > max {
            if record.fetch_interval > max {
                record.fetch_interval = scale_interval(max, 0.9);
            }
            record.fetch_time = now;
        }
        record.fetch_time <= now
    }

    /// Resets the record so the next generation picks it up
    ///
    /// With `asap` the record becomes due at `now`, otherwise it keeps its
    /// natural schedule.
    fn force_refetch(&self, _url: &str, record: &mut CrawlRecord, asap: bool, now: i64) {
        let max = self.settings().max_interval;
        if record.fetch_interval > max {
            record.fetch_interval = scale_interval(max, 0.9);
        }
        record.status = CrawlStatus::DbUnfetched;
        record.retries_since_fetch = 0;
        record.signature = None;
        record.modified_time = 0;
        if asap {
            record.fetch_time = now;
        }
    }
}

/// Multiplies an interval, saturating at `u32::MAX` and never reaching zero
pub(crate) fn scale_interval(interval: u32, factor: f64) -> u32 {
    let scaled = (f64::from(interval) * factor).round();
    if scaled >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        (scaled as u32).max(1)
    }
}

/// Builds the schedule selected in the configuration
pub fn from_config(config: &ScheduleConfig) -> Arc<dyn FetchSchedule> {
    let settings = ScheduleSettings::from(config);
    match config.class {
        ScheduleClass::Default => Arc::new(DefaultSchedule::new(settings)),
        ScheduleClass::Adaptive => Arc::new(AdaptiveSchedule::new(settings, &config.adaptive)),
    }
}
