//! Seed injection
//!
//! Seed lists hold one URL per line, optionally followed by tab-separated
//! `key=value` pairs. `score` and `fetchInterval` (seconds) set the record's
//! score and interval; any other key becomes text metadata. Blank lines and
//! lines starting with `#` are ignored.
//!
//! ```text
//! # news sites
//! https://example.com/	score=2.5	fetchInterval=3600
//! https://example.org/	lang=en
//! ```

use crate::config::Config;
use crate::record::{CrawlRecord, CrawlStatus};
use crate::schedule::FetchSchedule;
use crate::storage::{RecordStore, StorageResult};
use crate::url::UrlFilter;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// One parsed seed line
#[derive(Debug, Clone, PartialEq)]
pub struct Seed {
    pub url: String,
    pub score: Option<f32>,
    pub fetch_interval: Option<u32>,
    pub metadata: BTreeMap<String, String>,
}

/// Parses a seed list; malformed annotations are skipped with a warning
pub fn parse_seeds(content: &str) -> Vec<Seed> {
    content
        .lines()
        .enumerate()
        .filter_map(|(index, line)| parse_seed_line(index + 1, line))
        .collect()
}

/// Reads and parses a seed file
pub fn read_seeds(path: &Path) -> std::io::Result<Vec<Seed>> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_seeds(&content))
}

fn parse_seed_line(line_no: usize, line: &str) -> Option<Seed> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let mut fields = line.split('\t');
    let url = fields.next()?.trim().to_string();
    let mut seed = Seed {
        url,
        score: None,
        fetch_interval: None,
        metadata: BTreeMap::new(),
    };

    for field in fields.map(str::trim).filter(|f| !f.is_empty()) {
        let Some((key, value)) = field.split_once('=') else {
            tracing::warn!(line = line_no, field, "Ignoring seed annotation without '='");
            continue;
        };
        match key {
            "score" => match value.parse::<f32>() {
                Ok(score) => seed.score = Some(score),
                Err(_) => tracing::warn!(line = line_no, value, "Invalid seed score"),
            },
            "fetchInterval" => match value.parse::<u32>() {
                Ok(interval) if interval > 0 => seed.fetch_interval = Some(interval),
                _ => tracing::warn!(line = line_no, value, "Invalid seed fetch interval"),
            },
            _ => {
                seed.metadata.insert(key.to_string(), value.to_string());
            }
        }
    }

    Some(seed)
}

/// Counters of one injection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InjectSummary {
    /// Seeds read
    pub read: usize,

    /// Seeds rejected by the URL filter
    pub rejected: usize,

    /// URLs new to the record db
    pub added: usize,

    /// Known URLs overwritten or updated
    pub updated: usize,

    /// Known URLs left as they were
    pub unchanged: usize,
}

/// Turns seeds into db records and merges them into the store
pub struct Injector {
    filter: Arc<dyn UrlFilter>,
    schedule: Arc<dyn FetchSchedule>,
    score_injected: f32,
    overwrite: bool,
    update: bool,
}

impl Injector {
    pub fn new(
        config: &Config,
        filter: Arc<dyn UrlFilter>,
        schedule: Arc<dyn FetchSchedule>,
    ) -> Self {
        Self {
            filter,
            schedule,
            score_injected: config.db.score_injected,
            overwrite: config.db.injector_overwrite,
            update: config.db.injector_update,
        }
    }

    /// Builds the INJECTED record of a seed, scheduled for `now`
    pub fn injected_record(&self, url: &str, seed: &Seed, now: i64) -> CrawlRecord {
        let mut record = CrawlRecord::new(
            CrawlStatus::Injected,
            0,
            seed.score.unwrap_or(self.score_injected),
        );
        self.schedule.initialize(url, &mut record, now);
        if let Some(interval) = seed.fetch_interval {
            record.fetch_interval = interval;
        }
        for (key, value) in &seed.metadata {
            record.set_meta_text(key, value.as_str());
        }
        record
    }

    /// Merges an injected record with the db record of the same URL
    ///
    /// Returns None when the db record is kept unchanged.
    pub fn merge(
        &self,
        old: Option<&CrawlRecord>,
        injected: &CrawlRecord,
        seed: &Seed,
    ) -> Option<CrawlRecord> {
        let mut fresh = injected.clone();
        fresh.status = CrawlStatus::DbUnfetched;

        let Some(old) = old else {
            return Some(fresh);
        };

        if self.overwrite {
            return Some(fresh);
        }
        if self.update {
            let mut merged = old.clone();
            merged.put_all_metadata(injected);
            if seed.score.is_some() {
                merged.score = injected.score;
            }
            if seed.fetch_interval.is_some() {
                merged.fetch_interval = injected.fetch_interval;
            }
            return Some(merged);
        }
        None
    }

    /// Injects seeds into the store
    ///
    /// URLs are normalized by the filter; duplicate seeds keep the last line.
    pub fn inject(
        &self,
        store: &mut dyn RecordStore,
        seeds: Vec<Seed>,
        now: i64,
    ) -> StorageResult<InjectSummary> {
        let mut summary = InjectSummary {
            read: seeds.len(),
            ..InjectSummary::default()
        };

        let mut accepted: BTreeMap<String, Seed> = BTreeMap::new();
        for seed in seeds {
            match self.filter.filter(&seed.url) {
                Some(url) => {
                    accepted.insert(url, seed);
                }
                None => summary.rejected += 1,
            }
        }

        let mut writes = Vec::new();
        for (url, seed) in &accepted {
            let old = store.get_record(url)?;
            let injected = self.injected_record(url, seed, now);
            match self.merge(old.as_ref(), &injected, seed) {
                Some(record) => {
                    if old.is_some() {
                        summary.updated += 1;
                    } else {
                        summary.added += 1;
                    }
                    writes.push((url.clone(), record));
                }
                None => summary.unchanged += 1,
            }
        }
        store.upsert_records(&writes)?;

        tracing::info!(
            read = summary.read,
            rejected = summary.rejected,
            added = summary.added,
            updated = summary.updated,
            unchanged = summary.unchanged,
            "Injection finished"
        );
        Ok(summary)
    }
}
