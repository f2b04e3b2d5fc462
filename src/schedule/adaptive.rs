use crate::config::AdaptiveConfig;
use crate::record::CrawlRecord;
use crate::schedule::{FetchSchedule, FetchTimes, ModifiedState, ScheduleSettings};

/// Schedule that adapts the interval to how often a page changes
///
/// A modified page has its interval shrunk by `dec_rate`, an unmodified one
/// grown by `inc_rate`. With `sync_delta` the interval is also stretched to
/// the observed age of the content and the next fetch is pulled earlier by
/// a fraction of that age. The result is clamped to `[min, max]`.
#[derive(Debug, Clone)]
pub struct AdaptiveSchedule {
    settings: ScheduleSettings,
    inc_rate: f64,
    dec_rate: f64,
    min_interval: f64,
    max_interval: f64,
    sync_delta: bool,
    sync_delta_rate: f64,
}

impl AdaptiveSchedule {
    pub fn new(settings: ScheduleSettings, config: &AdaptiveConfig) -> Self {
        Self {
            settings,
            inc_rate: f64::from(config.inc_rate),
            dec_rate: f64::from(config.dec_rate),
            min_interval: f64::from(config.min_interval_secs),
            max_interval: f64::from(config.max_interval_secs),
            sync_delta: config.sync_delta,
            sync_delta_rate: f64::from(config.sync_delta_rate),
        }
    }
}

impl FetchSchedule for AdaptiveSchedule {
    fn settings(&self) -> &ScheduleSettings {
        &self.settings
    }

    fn set_fetch_schedule(
        &self,
        _url: &str,
        record: &mut CrawlRecord,
        times: FetchTimes,
        state: ModifiedState,
    ) {
        record.retries_since_fetch = 0;
        if record.fetch_interval == 0 {
            record.fetch_interval = self.settings.default_interval;
        }

        let mut ref_time = times.fetch;
        let mut modified_time = if times.modified <= 0 {
            times.fetch
        } else {
            times.modified
        };

        let mut interval = f64::from(record.fetch_interval);
        match state {
            ModifiedState::Modified => {
                interval *= 1.0 - self.dec_rate;
                modified_time = times.fetch;
            }
            ModifiedState::NotModified => interval *= 1.0 + self.inc_rate,
            ModifiedState::Unknown => {}
        }

        if self.sync_delta {
            let delta_secs = (times.fetch - modified_time) as f64 / 1000.0;
            if delta_secs > interval {
                interval = delta_secs;
            }
            ref_time = times.fetch - (delta_secs * self.sync_delta_rate * 1000.0).round() as i64;
        }

        interval = interval.clamp(self.min_interval, self.max_interval);

        record.fetch_interval = interval.round() as u32;
        record.fetch_time = ref_time + (interval * 1000.0).round() as i64;
        record.modified_time = modified_time;
    }
}
