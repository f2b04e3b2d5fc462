//! Per-host robots rules cache
//!
//! Entries expire after 24 hours so changes made by site owners are picked
//! up within a day.

use crate::robots::RobotRules;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Robots rules together with the time they were fetched
#[derive(Debug, Clone)]
pub struct CachedRobots {
    pub rules: RobotRules,
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    pub fn new(rules: RobotRules) -> Self {
        Self {
            rules,
            fetched_at: Utc::now(),
        }
    }

    /// Returns true once the entry is older than 24 hours
    pub fn is_stale(&self) -> bool {
        Utc::now() - self.fetched_at > Duration::hours(24)
    }
}

/// Robots rules keyed by `scheme://host[:port]`
#[derive(Debug, Default)]
pub struct RobotsCache {
    entries: Mutex<HashMap<String, CachedRobots>>,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns fresh rules for `key`, evicting a stale entry
    pub fn get(&self, key: &str) -> Option<RobotRules> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(cached) if cached.is_stale() => {
                entries.remove(key);
                None
            }
            Some(cached) => Some(cached.rules.clone()),
            None => None,
        }
    }

    pub fn insert(&self, key: &str, rules: RobotRules) {
        self.entries
            .lock()
            .insert(key.to_string(), CachedRobots::new(rules));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
