use crate::config::Config;
use crate::fetcher::{HttpProtocol, Protocol};
use crate::job::JobError;
use crate::schedule::{self, FetchSchedule};
use crate::storage::{open_store, RecordStore};
use crate::url::{StandardUrlFilter, UrlFilter};
use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

/// Phases implemented outside this crate
///
/// Content parsing and indexing need a parser and an index this crate does
/// not ship; a job that wants them supplies an implementation.
#[async_trait]
pub trait ExternalPhases: Send + Sync {
    async fn parse(&self, ctx: &JobContext, segment: &str) -> Result<(), JobError>;

    async fn index(&self, ctx: &JobContext, segment: &str) -> Result<(), JobError>;
}

/// Everything a crawl job owns while its phases run
pub struct JobContext {
    config: Config,
    config_hash: String,
    store: Mutex<Box<dyn RecordStore + Send>>,
    filter: Arc<dyn UrlFilter>,
    schedule: Arc<dyn FetchSchedule>,
    protocol: Arc<dyn Protocol>,
    external: Option<Arc<dyn ExternalPhases>>,
    pause: watch::Sender<bool>,
}

impl JobContext {
    /// Builds the URL filter and fetch schedule named in the configuration
    pub fn new(
        config: Config,
        config_hash: impl Into<String>,
        store: Box<dyn RecordStore + Send>,
        protocol: Arc<dyn Protocol>,
    ) -> Result<Self, JobError> {
        let filter = StandardUrlFilter::from_config(&config.filter)?;
        let schedule = schedule::from_config(&config.schedule);
        let (pause, _) = watch::channel(false);

        Ok(Self {
            config,
            config_hash: config_hash.into(),
            store: Mutex::new(store),
            filter: Arc::new(filter),
            schedule,
            protocol,
            external: None,
            pause,
        })
    }

    /// Opens the configured SQLite db and fetches over HTTP
    pub fn open(config: Config, config_hash: impl Into<String>) -> crate::Result<Self> {
        let store = open_store(Path::new(&config.db.path))?;
        let protocol = HttpProtocol::new(&config.fetcher, &config.user_agent)?;
        Ok(Self::new(config, config_hash, Box::new(store), Arc::new(protocol))?)
    }

    pub fn with_external(mut self, external: Arc<dyn ExternalPhases>) -> Self {
        self.external = Some(external);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    /// Locks the store; never hold the guard across an await
    pub fn store(&self) -> MutexGuard<'_, Box<dyn RecordStore + Send>> {
        self.store.lock()
    }

    pub fn filter(&self) -> Arc<dyn UrlFilter> {
        self.filter.clone()
    }

    pub fn schedule(&self) -> Arc<dyn FetchSchedule> {
        self.schedule.clone()
    }

    pub fn protocol(&self) -> Arc<dyn Protocol> {
        self.protocol.clone()
    }

    pub(crate) fn external(&self) -> Option<Arc<dyn ExternalPhases>> {
        self.external.clone()
    }

    /// Makes fetch workers stop claiming new items until [`resume`](Self::resume)
    pub fn pause(&self) {
        self.pause.send_replace(true);
        tracing::info!("Job paused");
    }

    pub fn resume(&self) {
        self.pause.send_replace(false);
        tracing::info!("Job resumed");
    }

    pub fn is_paused(&self) -> bool {
        *self.pause.borrow()
    }

    /// Receiver handed to fetch workers
    pub fn pause_receiver(&self) -> watch::Receiver<bool> {
        self.pause.subscribe()
    }
}
