//! Statistics generation from the record db

use crate::record::CrawlStatus;
use crate::storage::{RecordStore, RunRecord, SegmentStage, StorageResult};
use std::collections::HashMap;

/// Record db summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Total number of records
    pub total_records: u64,

    /// Count of records by status
    pub records_by_status: HashMap<CrawlStatus, u64>,

    /// Newest segment waiting at each stage
    pub latest_segments: Vec<(SegmentStage, String)>,

    /// Most recent phase run
    pub latest_run: Option<RunRecord>,
}

impl CrawlStatistics {
    /// Share of records fetched at least once, as a percentage
    pub fn fetched_percentage(&self) -> f64 {
        if self.total_records == 0 {
            return 0.0;
        }
        let fetched: u64 = [CrawlStatus::DbFetched, CrawlStatus::DbNotModified]
            .iter()
            .filter_map(|s| self.records_by_status.get(s))
            .sum();
        (fetched as f64 / self.total_records as f64) * 100.0
    }
}

/// Loads statistics from storage
pub fn load_statistics(store: &dyn RecordStore) -> StorageResult<CrawlStatistics> {
    let records_by_status = store.count_by_status()?;
    let total_records = records_by_status.values().sum();

    let mut latest_segments = Vec::new();
    for stage in [SegmentStage::Generated, SegmentStage::Fetched, SegmentStage::Updated] {
        if let Some(name) = store.latest_segment(stage)? {
            latest_segments.push((stage, name));
        }
    }

    Ok(CrawlStatistics {
        total_records,
        records_by_status,
        latest_segments,
        latest_run: store.latest_run()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Record Db Statistics ===\n");

    println!("Records: {}", stats.total_records);
    println!();

    println!("Records by Status:");
    let mut status_counts: Vec<_> = stats.records_by_status.iter().collect();
    status_counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

    for (status, count) in status_counts {
        let percentage = if stats.total_records > 0 {
            (*count as f64 / stats.total_records as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status.name(), count, percentage);
    }
    println!();

    if !stats.latest_segments.is_empty() {
        println!("Latest Segments:");
        for (stage, name) in &stats.latest_segments {
            println!("  {}: {}", stage.to_db_string(), name);
        }
        println!();
    }

    if let Some(run) = &stats.latest_run {
        println!(
            "Last Phase: {} ({}) started {}",
            run.phase,
            run.status.to_db_string(),
            run.started_at
        );
    }

    println!("Fetched: {:.1}%", stats.fetched_percentage());
}
