use crate::config::{CountMode, GenerateConfig};
use crate::generator::{segment_name, Segment, Selection, SelectorEntry};
use crate::record::{secs_to_millis, CrawlRecord, GENERATE_TIME_KEY};
use crate::schedule::FetchSchedule;
use crate::url::{registered_domain, UrlFilter};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// Picks the records due for fetching and splits them into segments
pub struct Selector {
    config: GenerateConfig,
    filter: Arc<dyn UrlFilter>,
    schedule: Arc<dyn FetchSchedule>,
}

/// A record that passed every eligibility check
struct Candidate {
    url: String,
    count_key: String,
    record: CrawlRecord,
    stored: CrawlRecord,
}

impl Selector {
    pub fn new(
        config: GenerateConfig,
        filter: Arc<dyn UrlFilter>,
        schedule: Arc<dyn FetchSchedule>,
    ) -> Self {
        Self {
            config,
            filter,
            schedule,
        }
    }

    /// Selects due records at `now` (epoch ms)
    ///
    /// # Selection Steps
    ///
    /// 1. Drop records rejected by the URL filter, not due per the fetch
    ///    schedule, generated less than `delay-secs` ago, or scoring below
    ///    `min-score`
    /// 2. Rank by score, highest first, ties broken by URL
    /// 3. Place each record in the first segment that still has room under
    ///    `top-n` and under `max-count` for its host or domain; records that
    ///    fit nowhere are left for the next round
    ///
    /// Every selected record is stamped with the generation time.
    pub fn select<I>(&self, records: I, now: i64) -> Selection
    where
        I: IntoIterator<Item = (String, CrawlRecord)>,
    {
        let mut candidates: Vec<Candidate> = records
            .into_iter()
            .filter_map(|(url, record)| self.eligible(url, record, now))
            .collect();

        candidates.sort_by(|a, b| {
            b.record
                .score
                .partial_cmp(&a.record.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.url.cmp(&b.url))
        });

        let num_segments = self.config.num_segments.max(1) as usize;
        let top_n = self.config.top_n.unwrap_or(usize::MAX);
        let max_count = usize::try_from(self.config.max_count)
            .ok()
            .filter(|max| *max > 0);

        let mut entries: Vec<Vec<SelectorEntry>> = vec![Vec::new(); num_segments];
        let mut per_key: HashMap<(String, usize), usize> = HashMap::new();
        let mut first_open: HashMap<String, usize> = HashMap::new();
        let mut marked = Vec::new();
        let mut dropped = 0usize;

        for candidate in candidates {
            if entries.iter().all(|segment| segment.len() >= top_n) {
                dropped += 1;
                continue;
            }

            let start = first_open.get(&candidate.count_key).copied().unwrap_or(0);
            let slot = (start..num_segments).find(|&segment| {
                entries[segment].len() < top_n
                    && max_count.map_or(true, |max| {
                        per_key
                            .get(&(candidate.count_key.clone(), segment))
                            .copied()
                            .unwrap_or(0)
                            < max
                    })
            });

            let Some(segment) = slot else {
                dropped += 1;
                continue;
            };

            let count = per_key
                .entry((candidate.count_key.clone(), segment))
                .or_insert(0);
            *count += 1;
            if max_count.is_some_and(|max| *count >= max) {
                first_open.insert(candidate.count_key.clone(), segment + 1);
            }

            let Candidate {
                url,
                mut record,
                mut stored,
                ..
            } = candidate;
            record.set_meta_long(GENERATE_TIME_KEY, now);
            stored.set_meta_long(GENERATE_TIME_KEY, now);

            entries[segment].push(SelectorEntry {
                url: url.clone(),
                record,
                segment: segment as u32,
            });
            if self.config.update_db {
                marked.push((url, stored));
            }
        }

        let segments: Vec<Segment> = entries
            .into_iter()
            .enumerate()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(index, entries)| Segment {
                name: segment_name(now, index),
                entries,
            })
            .collect();

        let selected: usize = segments.iter().map(|s| s.entries.len()).sum();
        tracing::info!(
            selected,
            segments = segments.len(),
            dropped,
            "Selection finished"
        );

        Selection {
            segments,
            marked,
            dropped,
        }
    }

    fn eligible(&self, url: String, stored: CrawlRecord, now: i64) -> Option<Candidate> {
        if self.filter.filter(&url).is_none() {
            return None;
        }

        let mut record = stored.clone();
        if !self.schedule.should_fetch(&url, &mut record, now) {
            tracing::trace!(url = %url, fetch_time = record.fetch_time, "Not due");
            return None;
        }

        if let Some(generated) = record.meta_long(GENERATE_TIME_KEY) {
            if generated + secs_to_millis(self.config.delay_secs) > now {
                tracing::trace!(url = %url, "Generated recently, awaiting update");
                return None;
            }
        }

        if self.config.min_score.is_some_and(|min| record.score < min) {
            return None;
        }

        let host = match Url::parse(&url) {
            Ok(parsed) => parsed.host_str()?.to_lowercase(),
            Err(e) => {
                tracing::debug!(url = %url, "Skipping malformed URL: {}", e);
                return None;
            }
        };
        let count_key = match self.config.count_mode {
            CountMode::Host => host,
            CountMode::Domain => registered_domain(&host),
        };

        Some(Candidate {
            url,
            count_key,
            record,
            stored,
        })
    }
}
