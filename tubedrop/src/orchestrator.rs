//! Drives one request from quota check to delivery.
//!
//! ```text
//! Idle → QuotaChecked → Resolving → Fetching → (Muxing) → SizeChecked → Delivering → Completed
//! ```
//!
//! Any failure after the quota check ends in `Errored`; an oversized artifact
//! ends in `Aborted`. Quota is only consumed on `Completed`. Every file a
//! request creates belongs to the fetched media's [`TempFiles`] guard and is
//! gone by the time [`Orchestrator::run`] returns.
//!
//! [`TempFiles`]: crate::temp::TempFiles

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::delivery::{Delivery, Progress};
use crate::error::{Error, Result};
use crate::fetch::{FetchPipeline, FetchedMedia};
use crate::gate::SizeGate;
use crate::mux::Muxer;
use crate::quota::{QuotaStore, Remaining};
use crate::resolver::StreamResolver;
use crate::temp::temp_file_name;
use crate::types::{Artifact, Intent, MediaKind, UserId, VideoDetails};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    QuotaChecked,
    Resolving,
    Fetching,
    Muxing,
    SizeChecked,
    Delivering,
    Completed,
    Errored,
    /// The artifact was over the upload ceiling.
    Aborted,
}

/// A user's request to act on a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub user: UserId,
    pub url: String,
    pub intent: Intent,
}

/// How a request ended. Each request produces exactly one.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    LimitReached { daily_limit: u32 },
    Info(VideoDetails),
    InfoUnavailable { reason: String },
    TooLarge { size_bytes: u64, ceiling: u64, kind: MediaKind },
    Failed { reason: String },
    Completed { size_bytes: u64, remaining: Remaining },
}

impl Outcome {
    /// The terminal message shown to the user.
    pub fn message(&self) -> String {
        match self {
            Outcome::LimitReached { daily_limit } => {
                format!("⚠️ Daily limit reached ({daily_limit}/day). Try again tomorrow.")
            }
            Outcome::Info(details) => details.summary(),
            Outcome::InfoUnavailable { reason } => format!("❌ Error fetching video info: {reason}"),
            Outcome::TooLarge { ceiling, kind, .. } => {
                let limit_mb = ceiling / (1024 * 1024);
                match kind {
                    MediaKind::Video => {
                        format!("❌ File too large (>{limit_mb}MB). Try audio or lower quality.")
                    }
                    MediaKind::Audio => format!("❌ Audio file too large (>{limit_mb}MB)"),
                }
            }
            Outcome::Failed { reason } => format!("❌ Download failed: {reason}"),
            Outcome::Completed { remaining, .. } => {
                format!("✅ Download complete!\n📊 Remaining: {remaining}")
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Completed { .. } | Outcome::Info(_))
    }
}

/// The outcome plus every state the request passed through.
#[derive(Debug, Clone)]
pub struct RequestReport {
    pub outcome: Outcome,
    pub states: Vec<RequestState>,
}

impl RequestReport {
    pub fn final_state(&self) -> RequestState {
        self.states.last().copied().unwrap_or(RequestState::Idle)
    }

    pub fn visited(&self, state: RequestState) -> bool {
        self.states.contains(&state)
    }
}

struct Trace {
    user: UserId,
    states: Vec<RequestState>,
}

impl Trace {
    fn new(user: UserId) -> Self {
        Self {
            user,
            states: vec![RequestState::Idle],
        }
    }

    fn enter(&mut self, state: RequestState) {
        debug!(user = %self.user, ?state, "request state");
        self.states.push(state);
    }

    fn finish(self, outcome: Outcome) -> RequestReport {
        RequestReport {
            outcome,
            states: self.states,
        }
    }
}

pub struct Orchestrator {
    quota: Arc<QuotaStore>,
    pipeline: FetchPipeline,
    muxer: Arc<dyn Muxer>,
    gate: SizeGate,
}

impl Orchestrator {
    pub fn new(
        settings: &Settings,
        quota: Arc<QuotaStore>,
        resolver: Arc<dyn StreamResolver>,
        muxer: Arc<dyn Muxer>,
    ) -> Self {
        let pipeline = FetchPipeline::new(resolver, settings.resolve_work_dir(), settings.fetch_timeout);
        Self {
            quota,
            pipeline,
            muxer,
            gate: SizeGate::new(settings.max_upload_bytes),
        }
    }

    pub fn quota(&self) -> &Arc<QuotaStore> {
        &self.quota
    }

    /// Run a request to its terminal outcome.
    pub async fn run(&self, request: &DownloadRequest, delivery: &dyn Delivery) -> RequestReport {
        let mut trace = Trace::new(request.user);

        if let Err(e) = self.quota.ensure(request.user) {
            info!(user = %request.user, reason = %e, "request rejected");
            return trace.finish(failure_outcome(request, e));
        }
        trace.enter(RequestState::QuotaChecked);

        let outcome = match self.execute(request, delivery, &mut trace).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_policy() => {
                trace.enter(RequestState::Aborted);
                info!(user = %request.user, reason = %e, "request rejected");
                failure_outcome(request, e)
            }
            Err(e) => {
                trace.enter(RequestState::Errored);
                error!(user = %request.user, url = %request.url, error = %e, "request failed");
                failure_outcome(request, e)
            }
        };
        trace.finish(outcome)
    }

    async fn execute(
        &self,
        request: &DownloadRequest,
        delivery: &dyn Delivery,
        trace: &mut Trace,
    ) -> Result<Outcome> {
        trace.enter(RequestState::Resolving);
        let details = self.pipeline.resolve(&request.url).await?;

        let Some((kind, tier)) = request.intent.fetch_target() else {
            info!(user = %request.user, title = %details.title, "info request served");
            return Ok(Outcome::Info(details));
        };

        trace.enter(RequestState::Fetching);
        report(delivery, Progress::Downloading(kind)).await;
        let mut media = self.pipeline.fetch_resolved(&details, kind, tier).await?;

        let artifact_path = match kind {
            MediaKind::Video => {
                trace.enter(RequestState::Muxing);
                report(delivery, Progress::Muxing).await;
                self.mux(&mut media).await?
            }
            MediaKind::Audio => media.audio.clone(),
        };

        trace.enter(RequestState::SizeChecked);
        let size_bytes = self.gate.check(&artifact_path).await?;

        trace.enter(RequestState::Delivering);
        report(delivery, Progress::Uploading(kind)).await;
        let artifact = Artifact {
            path: artifact_path,
            title: media.title.clone(),
            size_bytes,
            kind,
            quality_label: media.quality_label.clone(),
        };
        delivery.deliver(&artifact).await?;

        let count = self.quota.increment(request.user);
        trace.enter(RequestState::Completed);
        let remaining = self.quota.remaining(request.user);
        info!(user = %request.user, title = %artifact.title, size_bytes, count, %remaining, "download delivered");

        Ok(Outcome::Completed {
            size_bytes,
            remaining,
        })
    }

    /// Mux the fetched legs into a new file owned by the same job.
    async fn mux(&self, media: &mut FetchedMedia) -> Result<PathBuf> {
        let video = media
            .video
            .clone()
            .ok_or_else(|| Error::Mux("video leg missing".into()))?;
        let name = self
            .pipeline
            .work_dir()
            .join(temp_file_name(&media.title, "muxed", "mp4"));
        let output = media.files_mut().register(name);
        self.muxer.mux(&video, &media.audio, &output).await?;
        Ok(output)
    }
}

/// Map an error that ended a request to what the user is told.
fn failure_outcome(request: &DownloadRequest, error: Error) -> Outcome {
    match error {
        Error::QuotaExhausted { limit } => Outcome::LimitReached { daily_limit: limit },
        Error::SizeExceeded { size, ceiling } => Outcome::TooLarge {
            size_bytes: size,
            ceiling,
            kind: request
                .intent
                .fetch_target()
                .map_or(MediaKind::Video, |(kind, _)| kind),
        },
        e if request.intent == Intent::Info => Outcome::InfoUnavailable { reason: e.to_string() },
        e => Outcome::Failed { reason: e.to_string() },
    }
}

async fn report(delivery: &dyn Delivery, stage: Progress) {
    if let Err(e) = delivery.progress(stage).await {
        warn!(?stage, error = %e, "failed to report progress");
    }
}
