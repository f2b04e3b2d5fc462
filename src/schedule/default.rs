use crate::record::{secs_to_millis, CrawlRecord};
use crate::schedule::{FetchSchedule, FetchTimes, ModifiedState, ScheduleSettings};

/// Schedule that refetches every record after a fixed interval
///
/// The modification state is ignored; records fetched for the first time
/// adopt the default interval.
#[derive(Debug, Clone)]
pub struct DefaultSchedule {
    settings: ScheduleSettings,
}

impl DefaultSchedule {
    pub fn new(settings: ScheduleSettings) -> Self {
        Self { settings }
    }
}

impl FetchSchedule for DefaultSchedule {
    fn settings(&self) -> &ScheduleSettings {
        &self.settings
    }

    fn set_fetch_schedule(
        &self,
        _url: &str,
        record: &mut CrawlRecord,
        times: FetchTimes,
        _state: ModifiedState,
    ) {
        record.retries_since_fetch = 0;
        if record.fetch_interval == 0 {
            record.fetch_interval = self.settings.default_interval;
        }
        record.fetch_time = times.fetch + secs_to_millis(record.fetch_interval);
        record.modified_time = times.modified;
    }
}
