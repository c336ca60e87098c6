use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Artifact, MediaKind};

/// Pipeline stage reported to the user while a request runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Starting,
    FetchingInfo,
    Downloading(MediaKind),
    Muxing,
    Uploading(MediaKind),
}

impl Progress {
    pub fn message(&self) -> &'static str {
        match self {
            Progress::Starting => "⏳ Starting download...",
            Progress::FetchingInfo => "📊 Fetching video info...",
            Progress::Downloading(MediaKind::Video) => "📥 Downloading video... (This may take a while)",
            Progress::Downloading(MediaKind::Audio) => "🎵 Downloading audio...",
            Progress::Muxing => "🎞️ Merging video and audio...",
            Progress::Uploading(MediaKind::Video) => "📤 Uploading video...",
            Progress::Uploading(MediaKind::Audio) => "📤 Uploading audio...",
        }
    }
}

/// The outbound side of a request: status updates and the final upload.
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Update the request's status message. Failures here are logged, never fatal.
    async fn progress(&self, stage: Progress) -> Result<()>;

    /// Hand the artifact to the user. The file is deleted right after this returns.
    async fn deliver(&self, artifact: &Artifact) -> Result<()>;
}
