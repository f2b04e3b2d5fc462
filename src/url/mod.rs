//! URL handling module for Sumi-Tide
//!
//! This module provides the URL filter/normalizer used by the generator,
//! the injector and redirect handling, together with host and domain
//! extraction and the representative-URL heuristic for redirect chains.

mod domain;
mod matcher;
mod normalize;
mod repr;

use crate::config::FilterConfig;
use crate::{ConfigError, UrlError};
use url::Url;

pub use domain::{extract_host, registered_domain, url_domain};
pub use matcher::{deny_patterns, HostPattern};
pub use normalize::normalize_url;
pub use repr::choose_repr;

/// Normalizes or rejects URLs
///
/// Returns the normalized form of an accepted URL and None for a rejected
/// one. Implementations must be pure and safe to call from many workers.
pub trait UrlFilter: Send + Sync {
    fn filter(&self, url: &str) -> Option<String>;
}

/// Filter built from the `[filter]` configuration section
///
/// Normalizes the URL with [`normalize_url`] and rejects hosts matching any
/// deny pattern.
#[derive(Debug, Clone, Default)]
pub struct StandardUrlFilter {
    deny: Vec<HostPattern>,
}

impl StandardUrlFilter {
    /// Creates a filter from the configuration
    pub fn from_config(config: &FilterConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            deny: deny_patterns(config)?,
        })
    }

    /// Normalizes a URL and checks it against the deny list
    pub fn check(&self, url: &str) -> Result<Url, UrlError> {
        let normalized = normalize_url(url)?;
        let host = extract_host(&normalized).ok_or(UrlError::MissingHost)?;
        if self.deny.iter().any(|p| p.matches(&host)) {
            return Err(UrlError::Rejected(normalized.to_string()));
        }
        Ok(normalized)
    }
}

impl UrlFilter for StandardUrlFilter {
    fn filter(&self, url: &str) -> Option<String> {
        match self.check(url) {
            Ok(normalized) => Some(normalized.to_string()),
            Err(e) => {
                tracing::debug!(url, "Rejected URL: {}", e);
                None
            }
        }
    }
}
