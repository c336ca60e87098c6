use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::error::Result;
use crate::types::{QualityTier, StreamDescriptor, StreamKind, VideoDetails};

/// A readable byte stream for one elementary stream. Ends with `None`;
/// transport failures surface as an `Err` item.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Turns a link into stream metadata and opens byte sources for it.
#[async_trait]
pub trait StreamResolver: Send + Sync {
    /// Resolve a URL. Private, region-locked, live or otherwise unplayable
    /// sources fail with [`crate::Error::Resolution`].
    async fn resolve(&self, url: &str) -> Result<VideoDetails>;

    /// Open the byte source behind a descriptor returned by [`Self::resolve`].
    async fn open(&self, descriptor: &StreamDescriptor) -> Result<ByteStream>;
}

/// Best audio-only stream: highest bitrate, then largest declared size.
pub fn select_audio(streams: &[StreamDescriptor]) -> Option<&StreamDescriptor> {
    streams
        .iter()
        .filter(|s| s.kind == StreamKind::AudioOnly)
        .max_by(|a, b| {
            bitrate(a)
                .total_cmp(&bitrate(b))
                .then(a.content_length.cmp(&b.content_length))
        })
}

/// Highest or lowest video-only stream, ranked by height then bitrate.
pub fn select_video(streams: &[StreamDescriptor], tier: QualityTier) -> Option<&StreamDescriptor> {
    let candidates = streams.iter().filter(|s| s.kind == StreamKind::VideoOnly);
    let rank = |a: &&StreamDescriptor, b: &&StreamDescriptor| {
        a.height
            .unwrap_or(0)
            .cmp(&b.height.unwrap_or(0))
            .then(bitrate(a).total_cmp(&bitrate(b)))
    };
    match tier {
        QualityTier::Highest => candidates.max_by(rank),
        QualityTier::Lowest => candidates.min_by(rank),
    }
}

fn bitrate(stream: &StreamDescriptor) -> f64 {
    stream.bitrate_kbps.unwrap_or(0.0)
}
