use serde::Deserialize;

const DAY_SECS: u32 = 24 * 60 * 60;

/// Main configuration structure for Sumi-Tide
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub generate: GenerateConfig,
    pub db: DbConfig,
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub filter: FilterConfig,
}

/// How fetch items are partitioned into politeness queues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum QueueMode {
    #[default]
    ByHost,
    ByIp,
}

/// Fetch round behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FetcherConfig {
    /// Number of concurrent fetch workers
    pub threads: usize,

    /// Maximum number of concurrent fetches per queue
    pub threads_per_queue: usize,

    /// Delay between fetches to one queue when it allows a single thread (seconds)
    pub server_delay: f64,

    /// Delay between fetches to one queue when it allows several threads (seconds)
    pub server_min_delay: f64,

    /// Longest robots.txt Crawl-delay accepted (seconds, negative = unlimited)
    pub max_crawl_delay: f64,

    /// Redirect hops followed inside one fetch
    pub max_redirects: u32,

    /// Transport failures tolerated per queue before purging it (-1 = never)
    pub max_exceptions_per_queue: i64,

    /// Length of a fetch round in minutes (-1 = unbounded)
    pub time_limit_mins: i64,

    /// Buffered items allowed per worker
    pub queue_depth_multiplier: usize,

    pub queue_mode: QueueMode,

    /// Task timeout (seconds); workers idle for half of it are considered hung
    pub task_timeout_secs: u64,

    /// Times a would-block outcome may put an item back into its queue
    pub max_would_block_retries: u32,

    /// Drop redirects that leave the original host
    pub ignore_external_redirects: bool,

    /// Timeout for a single HTTP request (seconds)
    pub request_timeout_secs: u64,

    /// Response bodies are truncated to this many bytes
    pub max_content_bytes: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            threads: 10,
            threads_per_queue: 1,
            server_delay: 5.0,
            server_min_delay: 0.0,
            max_crawl_delay: 30.0,
            max_redirects: 3,
            max_exceptions_per_queue: -1,
            time_limit_mins: -1,
            queue_depth_multiplier: 50,
            queue_mode: QueueMode::ByHost,
            task_timeout_secs: 600,
            max_would_block_retries: 3,
            ignore_external_redirects: false,
            request_timeout_secs: 30,
            max_content_bytes: 10 * 1024 * 1024,
        }
    }
}

impl FetcherConfig {
    /// Upper bound on items buffered in the fetch queues
    pub fn buffer_capacity(&self) -> usize {
        self.threads * self.queue_depth_multiplier
    }
}

/// Which fetch schedule implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ScheduleClass {
    #[default]
    Default,
    Adaptive,
}

/// Fetch schedule configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ScheduleConfig {
    pub class: ScheduleClass,

    /// Interval given to newly scheduled records (seconds)
    pub default_interval_secs: u32,

    /// System-wide maximum interval (seconds)
    pub max_interval_secs: u32,

    /// Retries allowed before a record is marked gone
    pub retry_max: u32,

    pub adaptive: AdaptiveConfig,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            class: ScheduleClass::Default,
            default_interval_secs: 30 * DAY_SECS,
            max_interval_secs: 90 * DAY_SECS,
            retry_max: 3,
            adaptive: AdaptiveConfig::default(),
        }
    }
}

/// Tuning for the adaptive schedule
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AdaptiveConfig {
    pub inc_rate: f32,
    pub dec_rate: f32,
    pub min_interval_secs: u32,
    pub max_interval_secs: u32,
    pub sync_delta: bool,
    pub sync_delta_rate: f32,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            inc_rate: 0.2,
            dec_rate: 0.2,
            min_interval_secs: 60,
            max_interval_secs: 365 * DAY_SECS,
            sync_delta: true,
            sync_delta_rate: 0.3,
        }
    }
}

/// Whether per-site caps count hosts or registered domains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CountMode {
    #[default]
    Host,
    Domain,
}

/// Fetch list generation
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GenerateConfig {
    /// Maximum number of URLs per segment
    pub top_n: Option<usize>,

    /// Maximum URLs per host or domain per segment (-1 = unlimited)
    pub max_count: i64,

    pub count_mode: CountMode,

    /// Number of segments generated per round
    pub num_segments: u32,

    /// Records scoring below this are skipped
    pub min_score: Option<f32>,

    /// How long a generated record waits for its update before it may be generated again (seconds)
    pub delay_secs: u32,

    /// Stamp selected records in the db with their generation time
    pub update_db: bool,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            top_n: None,
            max_count: -1,
            count_mode: CountMode::Host,
            num_segments: 1,
            min_score: None,
            delay_secs: 7 * DAY_SECS,
            update_db: true,
        }
    }
}

/// Record db configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DbConfig {
    /// Path to the SQLite database file
    pub path: String,

    /// Whether URLs unknown to the db may be added by links
    #[serde(default = "default_true")]
    pub additions_allowed: bool,

    /// Score of injected URLs
    #[serde(default = "default_score_injected")]
    pub score_injected: f32,

    /// Score of URLs discovered through links
    #[serde(default)]
    pub score_linked: f32,

    /// Injected records replace existing ones
    #[serde(default)]
    pub injector_overwrite: bool,

    /// Injected records update score, interval and metadata of existing ones
    #[serde(default)]
    pub injector_update: bool,
}

fn default_true() -> bool {
    true
}

fn default_score_injected() -> f32 {
    1.0
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the crawler
    pub crawler_name: String,

    /// Version of the crawler
    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: String,

    /// Email address for crawler-related contact
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the User-Agent header: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// URL filter configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FilterConfig {
    /// Domain patterns (e.g., "example.com" or "*.example.com") never crawled
    pub deny: Vec<String>,
}
