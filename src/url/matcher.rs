use crate::config::FilterConfig;
use crate::ConfigError;

/// A host pattern from the configuration
///
/// Two forms are supported:
/// 1. Exact: `example.com` matches only `example.com`
/// 2. Wildcard: `*.example.com` matches `example.com` and every subdomain
///
/// # Examples
///
/// ```
/// use sumi_tide::url::HostPattern;
///
/// let pattern = HostPattern::parse("*.example.com").unwrap();
/// assert!(pattern.matches("example.com"));
/// assert!(pattern.matches("api.v2.example.com"));
/// assert!(!pattern.matches("badexample.com"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPattern {
    Exact(String),
    Subdomains(String),
}

impl HostPattern {
    /// Parses and validates a pattern
    pub fn parse(pattern: &str) -> Result<Self, ConfigError> {
        crate::config::validate_domain_pattern(pattern)?;
        let lower = pattern.to_lowercase();
        Ok(match lower.strip_prefix("*.") {
            Some(base) => Self::Subdomains(base.to_string()),
            None => Self::Exact(lower),
        })
    }

    /// Returns true if `host` (lowercase) matches this pattern
    pub fn matches(&self, host: &str) -> bool {
        match self {
            Self::Exact(domain) => host == domain,
            Self::Subdomains(base) => {
                host == base
                    || (host.len() > base.len()
                        && host.ends_with(base.as_str())
                        && host.as_bytes()[host.len() - base.len() - 1] == b'.')
            }
        }
    }
}

/// Parses every deny pattern of the filter configuration
pub fn deny_patterns(config: &FilterConfig) -> Result<Vec<HostPattern>, ConfigError> {
    config.deny.iter().map(|p| HostPattern::parse(p)).collect()
}
