//! Crawl phases
//!
//! A crawl round is a sequence of [`Phase`]s run against one
//! [`JobContext`]: inject seeds, generate segments, fetch a segment, and
//! update the record db from its output. Parse and index are delegated to
//! [`ExternalPhases`] when the job provides one.
//!
//! Every phase is journaled in the store with the config hash it ran with.

mod context;

pub use context::{ExternalPhases, JobContext};

use crate::fetcher::{FetchError, FetchOutput, FetchSummary, Fetcher};
use crate::generator::Selector;
use crate::injector::{read_seeds, InjectSummary, Injector};
use crate::reconciler::{group_by_url, ReconcileSummary, Reconciler};
use crate::record::now_millis;
use crate::storage::{RunStatus, SegmentStage, StorageError};
use crate::ConfigError;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("failed to read seeds: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} phase needs an external implementation")]
    PhaseUnavailable(&'static str),

    #[error("no {stage} segment to {phase}")]
    NoSegment { phase: &'static str, stage: &'static str },

    #[error("{phase} phase failed: {message}")]
    External { phase: &'static str, message: String },
}

/// One step of a crawl round
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Merge a seed list into the record db
    Inject { seeds: PathBuf },

    /// Select due records into new segments
    Generate,

    /// Fetch a segment; the newest generated one when None
    Fetch { segment: Option<String> },

    /// Parse fetched content; the newest fetched segment when None
    Parse { segment: Option<String> },

    /// Reconcile a segment's fetch output into the record db; the newest
    /// fetched segment when None
    Update { segment: Option<String> },

    /// Index a segment; the newest updated segment when None
    Index { segment: Option<String> },
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Inject { .. } => "inject",
            Self::Generate => "generate",
            Self::Fetch { .. } => "fetch",
            Self::Parse { .. } => "parse",
            Self::Update { .. } => "update",
            Self::Index { .. } => "index",
        }
    }
}

/// What a phase did
#[derive(Debug, Clone)]
pub enum PhaseOutcome {
    Injected(InjectSummary),
    Generated {
        segments: Vec<String>,
        selected: usize,
        dropped: usize,
    },
    Fetched {
        segment: String,
        summary: FetchSummary,
    },
    Updated {
        segment: String,
        summary: ReconcileSummary,
    },
    External {
        phase: &'static str,
        segment: String,
    },
}

/// Runs one phase, journaling its start and end in the store
pub async fn run_phase(ctx: &JobContext, phase: Phase) -> Result<PhaseOutcome, JobError> {
    let name = phase.name();
    let run_id = ctx.store().start_run(name, None, ctx.config_hash())?;
    tracing::info!(phase = name, run = run_id, config_hash = ctx.config_hash(), "Phase started");

    let result = match phase {
        Phase::Inject { seeds } => inject(ctx, seeds),
        Phase::Generate => generate(ctx),
        Phase::Fetch { segment } => fetch(ctx, segment).await,
        Phase::Update { segment } => update(ctx, segment),
        Phase::Parse { segment } => parse(ctx, segment).await,
        Phase::Index { segment } => index(ctx, segment).await,
    };

    let status = match &result {
        Ok(_) => RunStatus::Completed,
        Err(JobError::Fetch(FetchError::HungThreads { .. })) => RunStatus::Interrupted,
        Err(_) => RunStatus::Failed,
    };
    if let Err(e) = ctx.store().finish_run(run_id, status) {
        tracing::warn!(run = run_id, "Failed to journal phase end: {}", e);
    }
    match &result {
        Ok(_) => tracing::info!(phase = name, "Phase completed"),
        Err(e) => tracing::error!(phase = name, "Phase failed: {}", e),
    }
    result
}

fn resolve_segment(
    ctx: &JobContext,
    segment: Option<String>,
    stage: SegmentStage,
    phase: &'static str,
) -> Result<String, JobError> {
    if let Some(segment) = segment {
        return Ok(segment);
    }
    ctx.store()
        .latest_segment(stage)?
        .ok_or(JobError::NoSegment {
            phase,
            stage: stage.to_db_string(),
        })
}

/// The external implementation and segment a delegated phase runs on
fn external_target(
    ctx: &JobContext,
    segment: Option<String>,
    stage: SegmentStage,
    phase: &'static str,
) -> Result<(Arc<dyn ExternalPhases>, String), JobError> {
    let external = ctx.external().ok_or(JobError::PhaseUnavailable(phase))?;
    let segment = resolve_segment(ctx, segment, stage, phase)?;
    Ok((external, segment))
}

async fn parse(ctx: &JobContext, segment: Option<String>) -> Result<PhaseOutcome, JobError> {
    let (external, segment) = external_target(ctx, segment, SegmentStage::Fetched, "parse")?;
    external.parse(ctx, &segment).await?;
    Ok(PhaseOutcome::External {
        phase: "parse",
        segment,
    })
}

async fn index(ctx: &JobContext, segment: Option<String>) -> Result<PhaseOutcome, JobError> {
    let (external, segment) = external_target(ctx, segment, SegmentStage::Updated, "index")?;
    external.index(ctx, &segment).await?;
    Ok(PhaseOutcome::External {
        phase: "index",
        segment,
    })
}

fn inject(ctx: &JobContext, seeds: PathBuf) -> Result<PhaseOutcome, JobError> {
    let seeds = read_seeds(&seeds)?;
    let injector = Injector::new(ctx.config(), ctx.filter(), ctx.schedule());
    let mut store = ctx.store();
    let summary = injector.inject(&mut **store, seeds, now_millis())?;
    Ok(PhaseOutcome::Injected(summary))
}

fn generate(ctx: &JobContext) -> Result<PhaseOutcome, JobError> {
    let selector = Selector::new(ctx.config().generate.clone(), ctx.filter(), ctx.schedule());
    let mut store = ctx.store();
    let records = store.load_records()?;
    let selection = selector.select(records, now_millis());

    for segment in &selection.segments {
        store.save_segment(segment)?;
        tracing::info!(segment = %segment.name, entries = segment.entries.len(), "Segment generated");
    }
    if !selection.marked.is_empty() {
        store.upsert_records(&selection.marked)?;
    }
    if selection.is_empty() {
        tracing::warn!("No records due for fetching");
    }

    Ok(PhaseOutcome::Generated {
        segments: selection.segments.iter().map(|s| s.name.clone()).collect(),
        selected: selection.segments.iter().map(|s| s.entries.len()).sum(),
        dropped: selection.dropped,
    })
}

/// Fetches a segment and stores whatever output the round produced
///
/// Output emitted before a hung-round abort is stored too, and the segment
/// still moves to the fetched stage.
async fn fetch(ctx: &JobContext, segment: Option<String>) -> Result<PhaseOutcome, JobError> {
    let name = resolve_segment(ctx, segment, SegmentStage::Generated, "fetch")?;
    let fetch_list = ctx.store().load_segment(&name)?.fetch_list();
    tracing::info!(segment = %name, entries = fetch_list.len(), "Fetching segment");

    let config = &ctx.config().fetcher;
    let fetcher = Fetcher::new(config.clone(), ctx.protocol(), ctx.filter())
        .with_pause(ctx.pause_receiver());

    let (sink, mut output) = mpsc::channel::<FetchOutput>(config.buffer_capacity().max(1));
    let collector = tokio::spawn(async move {
        let mut collected = Vec::new();
        while let Some(out) = output.recv().await {
            collected.push(out);
        }
        collected
    });

    let result = fetcher.run(fetch_list, sink).await;
    let collected = collector.await.map_err(FetchError::from)?;

    {
        let mut store = ctx.store();
        store.save_fetch_output(&name, &collected)?;
        store.mark_segment(&name, SegmentStage::Fetched)?;
    }
    tracing::info!(segment = %name, records = collected.len(), "Fetch output stored");

    let summary = result?;
    Ok(PhaseOutcome::Fetched {
        segment: name,
        summary,
    })
}

fn update(ctx: &JobContext, segment: Option<String>) -> Result<PhaseOutcome, JobError> {
    let name = resolve_segment(ctx, segment, SegmentStage::Fetched, "update")?;
    let reconciler = Reconciler::from_config(ctx.config(), ctx.schedule());

    let mut store = ctx.store();
    let output = store.load_fetch_output(&name)?;
    let db = store.load_records()?;
    let groups = group_by_url(db, output.into_iter().map(|out| (out.url, out.record)));

    let (records, summary) = reconciler.reconcile_all(groups, now_millis());
    store.write_records(&records)?;
    store.mark_segment(&name, SegmentStage::Updated)?;

    Ok(PhaseOutcome::Updated {
        segment: name,
        summary,
    })
}
