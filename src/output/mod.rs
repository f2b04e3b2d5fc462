//! Output module for reporting on the record db
//!
//! This module handles:
//! - Collecting record counts per status from the store
//! - Printing them together with the latest phase run

pub mod stats;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};
