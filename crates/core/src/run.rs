use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::extract::{ExtractTool, ExtractionOrchestrator};
use crate::materialize::{
    finish_scratch, AuditLog, DirMediaStore, FrameProgress, Materializer, NoteSink,
};
use crate::models::{CardOptions, RunState, RunSummary, VideoSource};
use crate::plan::SamplingPlan;
use crate::video::{probe_video, ProbeTool};

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub video: PathBuf,
    pub media_dir: PathBuf,
    /// Parent of the per-run scratch directory; the media directory when unset.
    pub scratch_root: Option<PathBuf>,
    pub interval: Option<u32>,
    pub frame_count: Option<u32>,
    pub card: CardOptions,
    /// Enables the audit log when set.
    pub audit_dir: Option<PathBuf>,
    pub probe: ProbeTool,
    pub extract: ExtractTool,
    pub poll_interval: Duration,
}

impl RunConfig {
    pub fn new(video: impl Into<PathBuf>, media_dir: impl Into<PathBuf>) -> Self {
        Self {
            video: video.into(),
            media_dir: media_dir.into(),
            scratch_root: None,
            interval: None,
            frame_count: None,
            card: CardOptions::default(),
            audit_dir: None,
            probe: ProbeTool::default(),
            extract: ExtractTool::default(),
            poll_interval: Duration::from_millis(100),
        }
    }

    pub fn plan_for(&self, source: &VideoSource) -> Result<SamplingPlan> {
        match (self.interval, self.frame_count) {
            (Some(_), Some(_)) => Err(Error::InvalidArgument(
                "give either an interval or a frame count, not both".to_string(),
            )),
            (Some(interval), None) => SamplingPlan::with_interval(source.duration_secs, interval),
            (None, Some(count)) => SamplingPlan::with_frame_count(source.duration_secs, count),
            (None, None) => SamplingPlan::new(source.duration_secs),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RunCancelToken {
    cancelled: Arc<AtomicBool>,
}

impl RunCancelToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Default for RunCancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub enum RunProgress {
    State(RunState),
    Planned {
        source: VideoSource,
        plan: SamplingPlan,
    },
    Waiting {
        elapsed: Duration,
    },
    Frame(FrameProgress),
}

pub fn run<N: NoteSink>(config: &RunConfig, notes: &mut N) -> Result<RunSummary> {
    run_with_progress(config, notes, None, |_| {})
}

/// Drives one run `Idle -> Probing -> Planning -> Extracting ->
/// Materializing -> Cleanup -> Idle`.
///
/// Probe, plan and extraction errors move the run to `Failed` and are
/// returned; a failed extraction passes through `Cleanup` first. Once frames exist the run always reaches `Cleanup` and returns
/// a summary, with per-frame failures inside it.
pub fn run_with_progress<N, F>(
    config: &RunConfig,
    notes: &mut N,
    cancel: Option<&RunCancelToken>,
    mut on_progress: F,
) -> Result<RunSummary>
where
    N: NoteSink,
    F: FnMut(&RunProgress),
{
    let fail = |err: Error, on_progress: &mut F| {
        tracing::warn!("run failed: {err}");
        on_progress(&RunProgress::State(RunState::Failed));
        err
    };

    on_progress(&RunProgress::State(RunState::Probing));
    let source =
        probe_video(&config.probe, &config.video).map_err(|e| fail(e, &mut on_progress))?;

    on_progress(&RunProgress::State(RunState::Planning));
    let plan = config.plan_for(&source).map_err(|e| fail(e, &mut on_progress))?;
    tracing::info!(
        "sampling {} every {}s for {} frames",
        source.path.to_string_lossy(),
        plan.interval_secs(),
        plan.frame_count()
    );
    on_progress(&RunProgress::Planned {
        source: source.clone(),
        plan: plan.clone(),
    });

    let mut media =
        DirMediaStore::open(&config.media_dir).map_err(|e| fail(e, &mut on_progress))?;
    let audit = match &config.audit_dir {
        Some(dir) => {
            Some(AuditLog::open(dir, &source.base_name()).map_err(|e| fail(e, &mut on_progress))?)
        }
        None => None,
    };

    on_progress(&RunProgress::State(RunState::Extracting));
    let orchestrator = ExtractionOrchestrator {
        tool: config.extract.clone(),
        poll_interval: config.poll_interval,
    };
    let scratch_root = config
        .scratch_root
        .clone()
        .unwrap_or_else(|| config.media_dir.clone());
    let scratch = orchestrator
        .extract_with_progress(&source, &plan, &scratch_root, cancel, |elapsed| {
            on_progress(&RunProgress::Waiting { elapsed })
        })
        .map_err(|e| {
            // the orchestrator has already removed its scratch directory
            on_progress(&RunProgress::State(RunState::Cleanup));
            fail(e, &mut on_progress)
        })?;

    on_progress(&RunProgress::State(RunState::Materializing));
    let mut materializer =
        Materializer::new(&mut media, notes).with_tag(config.card.tag.clone());
    if let Some(audit) = audit {
        materializer = materializer.with_audit(audit);
    }
    let mut summary = materializer.process_frames(&scratch, &source, |frame| {
        on_progress(&RunProgress::Frame(frame.clone()))
    });

    on_progress(&RunProgress::State(RunState::Cleanup));
    summary.scratch_removed = finish_scratch(scratch);

    tracing::info!(
        "materialized {} frames from {} ({} blank, {} failed)",
        summary.materialized_count(),
        source.path.to_string_lossy(),
        summary.blank_frames,
        summary.failures.len()
    );
    on_progress(&RunProgress::State(RunState::Idle));
    Ok(summary)
}
