use crate::config::types::{Config, FetcherConfig, GenerateConfig, ScheduleConfig, UserAgentConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_fetcher_config(&config.fetcher)?;
    validate_schedule_config(&config.schedule)?;
    validate_generate_config(&config.generate)?;
    validate_user_agent_config(&config.user_agent)?;

    if config.db.path.is_empty() {
        return Err(ConfigError::Validation("db path cannot be empty".to_string()));
    }

    for pattern in &config.filter.deny {
        validate_domain_pattern(pattern)?;
    }

    Ok(())
}

/// Validates fetcher configuration
fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.threads < 1 {
        return Err(ConfigError::Validation(format!(
            "fetcher threads must be >= 1, got {}",
            config.threads
        )));
    }

    if config.threads_per_queue < 1 {
        return Err(ConfigError::Validation(format!(
            "threads_per_queue must be >= 1, got {}",
            config.threads_per_queue
        )));
    }

    if config.server_delay < 0.0 || config.server_min_delay < 0.0 {
        return Err(ConfigError::Validation(format!(
            "server delays cannot be negative, got {} / {}",
            config.server_delay, config.server_min_delay
        )));
    }

    if config.queue_depth_multiplier < 1 {
        return Err(ConfigError::Validation(
            "queue_depth_multiplier must be >= 1".to_string(),
        ));
    }

    if config.task_timeout_secs < 2 {
        return Err(ConfigError::Validation(format!(
            "task_timeout_secs must be >= 2, got {}",
            config.task_timeout_secs
        )));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.max_content_bytes < 1 {
        return Err(ConfigError::Validation(
            "max_content_bytes must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates schedule configuration
fn validate_schedule_config(config: &ScheduleConfig) -> Result<(), ConfigError> {
    if config.default_interval_secs == 0 || config.max_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "fetch intervals must be > 0".to_string(),
        ));
    }

    if config.default_interval_secs > config.max_interval_secs {
        return Err(ConfigError::Validation(format!(
            "default_interval_secs ({}) exceeds max_interval_secs ({})",
            config.default_interval_secs, config.max_interval_secs
        )));
    }

    let adaptive = &config.adaptive;
    if adaptive.min_interval_secs == 0 || adaptive.min_interval_secs > adaptive.max_interval_secs
    {
        return Err(ConfigError::Validation(format!(
            "adaptive interval bounds are invalid: [{}, {}]",
            adaptive.min_interval_secs, adaptive.max_interval_secs
        )));
    }

    if !(0.0..1.0).contains(&adaptive.dec_rate) || adaptive.inc_rate < 0.0 {
        return Err(ConfigError::Validation(format!(
            "adaptive rates out of range: inc {} dec {}",
            adaptive.inc_rate, adaptive.dec_rate
        )));
    }

    Ok(())
}

/// Validates generator configuration
fn validate_generate_config(config: &GenerateConfig) -> Result<(), ConfigError> {
    if config.num_segments < 1 {
        return Err(ConfigError::Validation(
            "num_segments must be >= 1".to_string(),
        ));
    }

    if config.top_n == Some(0) {
        return Err(ConfigError::Validation("top_n must be >= 1".to_string()));
    }

    if config.max_count == 0 {
        return Err(ConfigError::Validation(
            "max_count must be >= 1 or -1 for unlimited".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates a domain pattern (supports wildcards)
pub(crate) fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    let domain = pattern.strip_prefix("*.").unwrap_or(pattern);

    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
        || domain.contains("..")
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' is malformed",
            domain
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must contain at least one dot (e.g., 'example.com')",
            domain
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let (local, domain) = email
        .split_once('@')
        .ok_or_else(|| ConfigError::Validation(format!("Invalid email format: '{}'", email)))?;

    if local.is_empty() || domain.is_empty() || domain.contains('@') || !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    Ok(())
}
