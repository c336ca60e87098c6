//! Quota-limited video download pipeline for chat bots: link in, playable file out.
//!
//! **tubedrop** handles everything between a user pasting a link and a file
//! landing in their chat: per-user daily quotas with a midnight reset, stream
//! resolution (via yt-dlp), concurrent video/audio downloads under a deadline,
//! muxing (via ffmpeg), an upload size gate, and guaranteed cleanup of every
//! temporary file. The chat platform itself sits behind the [`Delivery`] trait.
//!
//! # Quick start
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use tubedrop::{Delivery, DownloadRequest, Intent, Orchestrator, QualityTier, QuotaStore, Settings, UserId};
//! # #[cfg(feature = "ytdlp")]
//! # async fn run(delivery: &dyn Delivery) -> tubedrop::Result<()> {
//! let settings = Settings::from_env()?;
//! let quota = Arc::new(QuotaStore::new(settings.daily_limit));
//! let orchestrator = Orchestrator::new(
//!     &settings,
//!     quota,
//!     Arc::new(tubedrop::ytdlp::YtDlpResolver::new(&settings.tools.ytdlp)),
//!     Arc::new(tubedrop::mux::FfmpegMuxer::new(&settings.tools.ffmpeg)),
//! );
//!
//! let request = DownloadRequest {
//!     user: UserId(42),
//!     url: "https://youtu.be/dQw4w9WgXcQ".into(),
//!     intent: Intent::Video(QualityTier::Highest),
//! };
//! let report = orchestrator.run(&request, delivery).await;
//! println!("{}", report.outcome.message());
//! # Ok(())
//! # }
//! # fn main() {}
//! ```

pub mod callback;
pub mod config;
pub mod delivery;
pub mod error;
pub mod fetch;
pub mod gate;
pub mod link;
pub mod mux;
pub mod orchestrator;
pub mod quota;
pub mod resolver;
pub(crate) mod temp;
pub mod tools;
pub mod types;
#[cfg(feature = "ytdlp")]
pub mod ytdlp;

#[cfg(test)]
mod test_support;

pub use callback::{CallbackData, LinkRegistry, LinkToken};
pub use config::{Settings, ToolPaths};
pub use delivery::{Delivery, Progress};
pub use error::{Error, Result};
pub use orchestrator::{DownloadRequest, Orchestrator, Outcome, RequestReport, RequestState};
pub use quota::{QuotaStore, Remaining, ResetScheduler};
pub use types::{format_bytes, Artifact, Intent, MediaKind, QualityTier, UserId, VideoDetails};
