//! Storage traits and error types

use crate::fetcher::FetchOutput;
use crate::generator::Segment;
use crate::record::{CrawlRecord, CrawlStatus};
use crate::storage::{RunRecord, RunStatus, SegmentStage};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Segment not found: {0}")]
    SegmentNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence of the record db, segments and fetch output between phases
pub trait RecordStore {
    // ===== Record Db =====

    /// Loads every record, ordered by URL
    fn load_records(&self) -> StorageResult<Vec<(String, CrawlRecord)>>;

    /// Gets the record of one URL
    fn get_record(&self, url: &str) -> StorageResult<Option<CrawlRecord>>;

    /// Inserts or replaces the given records, leaving others untouched
    fn upsert_records(&mut self, records: &[(String, CrawlRecord)]) -> StorageResult<usize>;

    /// Replaces the whole record db with `records` in one transaction
    fn write_records(&mut self, records: &[(String, CrawlRecord)]) -> StorageResult<usize>;

    /// Counts records per status
    fn count_by_status(&self) -> StorageResult<HashMap<CrawlStatus, u64>>;

    // ===== Segments =====

    /// Stores a generated segment at the `Generated` stage
    fn save_segment(&mut self, segment: &Segment) -> StorageResult<()>;

    /// Loads a segment with its entries in fetch order
    fn load_segment(&self, name: &str) -> StorageResult<Segment>;

    /// Moves a segment to the given stage
    fn mark_segment(&mut self, name: &str, stage: SegmentStage) -> StorageResult<()>;

    /// Returns the newest segment currently at `stage`
    fn latest_segment(&self, stage: SegmentStage) -> StorageResult<Option<String>>;

    // ===== Fetch Output =====

    /// Stores the output of a fetch round, replacing earlier output of the segment
    fn save_fetch_output(&mut self, segment: &str, output: &[FetchOutput]) -> StorageResult<()>;

    /// Loads the output of a fetch round in emission order
    fn load_fetch_output(&self, segment: &str) -> StorageResult<Vec<FetchOutput>>;

    // ===== Run Journal =====

    /// Records the start of a phase
    fn start_run(
        &mut self,
        phase: &str,
        segment: Option<&str>,
        config_hash: &str,
    ) -> StorageResult<i64>;

    /// Records how a phase ended
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn latest_run(&self) -> StorageResult<Option<RunRecord>>;
}
