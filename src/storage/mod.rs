//! Storage module for persisting crawl data
//!
//! This module handles all database operations of a crawl, including:
//! - SQLite database initialization and schema management
//! - The record db, one authoritative [`CrawlRecord`](crate::CrawlRecord) per URL
//! - Generated segments and their fetch output
//! - A journal of phase runs

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{RecordStore, StorageError, StorageResult};

use std::path::Path;

/// Initializes or opens a storage database
pub fn open_store(path: &Path) -> StorageResult<SqliteStore> {
    SqliteStore::new(path)
}

/// Where a segment is in its round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentStage {
    Generated,
    Fetched,
    Updated,
}

impl SegmentStage {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::Fetched => "fetched",
            Self::Updated => "updated",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "generated" => Some(Self::Generated),
            "fetched" => Some(Self::Fetched),
            "updated" => Some(Self::Updated),
            _ => None,
        }
    }
}

/// One execution of a phase
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub phase: String,
    pub segment: Option<String>,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a phase run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_roundtrip() {
        for status in &[
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Interrupted,
            RunStatus::Failed,
        ] {
            let db_str = status.to_db_string();
            assert_eq!(Some(*status), RunStatus::from_db_string(db_str));
        }
        assert_eq!(RunStatus::from_db_string("invalid"), None);
    }

    #[test]
    fn test_segment_stage_roundtrip() {
        for stage in [SegmentStage::Generated, SegmentStage::Fetched, SegmentStage::Updated] {
            assert_eq!(SegmentStage::from_db_string(stage.to_db_string()), Some(stage));
        }
    }
}
