//! Downloads the elementary streams for one job into temporary files.
//!
//! Video jobs fetch a video-only and an audio-only stream concurrently and
//! succeed only when both legs finish. The first leg to fail drops the other
//! one, which closes its connection and file handle. Every path a job writes
//! to is registered with a [`TempFiles`] guard before the first byte lands, so
//! a failed or timed-out job never leaves files behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::resolver::{select_audio, select_video, StreamResolver};
use crate::temp::{temp_file_name, TempFiles};
use crate::types::{MediaKind, QualityTier, StreamDescriptor, VideoDetails};

/// Per-job deadline covering every download leg.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Downloaded streams for one job. Dropping it deletes the files.
#[derive(Debug)]
pub struct FetchedMedia {
    pub title: String,
    pub kind: MediaKind,
    pub video: Option<PathBuf>,
    pub audio: PathBuf,
    /// Quality label of the video leg, if any.
    pub quality_label: Option<String>,
    files: TempFiles,
}

impl FetchedMedia {
    /// The guard owning this job's files. Register derived outputs here so
    /// they share the job's lifetime.
    pub fn files_mut(&mut self) -> &mut TempFiles {
        &mut self.files
    }
}

/// The streams picked for a job, chosen before any file is created.
struct Selection<'a> {
    video: Option<&'a StreamDescriptor>,
    audio: &'a StreamDescriptor,
}

fn select(details: &VideoDetails, kind: MediaKind, tier: QualityTier) -> Result<Selection<'_>> {
    let audio = select_audio(&details.streams).ok_or(Error::NoSuitableFormat("audio"))?;
    let video = match kind {
        MediaKind::Video => {
            Some(select_video(&details.streams, tier).ok_or(Error::NoSuitableFormat("video"))?)
        }
        MediaKind::Audio => None,
    };
    Ok(Selection { video, audio })
}

pub struct FetchPipeline {
    resolver: Arc<dyn StreamResolver>,
    work_dir: PathBuf,
    timeout: Duration,
}

impl FetchPipeline {
    pub fn new(resolver: Arc<dyn StreamResolver>, work_dir: PathBuf, timeout: Duration) -> Self {
        Self {
            resolver,
            work_dir,
            timeout,
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Resolve `url` under the job deadline.
    ///
    /// The resolver may be an external process; dropping its future on expiry
    /// kills it.
    pub async fn resolve(&self, url: &str) -> Result<VideoDetails> {
        match tokio::time::timeout(self.timeout, self.resolver.resolve(url)).await {
            Ok(resolved) => resolved,
            Err(_) => {
                warn!(%url, timeout_secs = self.timeout.as_secs(), "resolution timed out");
                Err(Error::Timeout(self.timeout))
            }
        }
    }

    /// Resolve `url` and download the streams for `kind`.
    pub async fn fetch(&self, url: &str, kind: MediaKind, tier: QualityTier) -> Result<FetchedMedia> {
        let details = self.resolve(url).await?;
        self.fetch_resolved(&details, kind, tier).await
    }

    /// Download the streams for `kind` from already resolved details.
    pub async fn fetch_resolved(
        &self,
        details: &VideoDetails,
        kind: MediaKind,
        tier: QualityTier,
    ) -> Result<FetchedMedia> {
        let selection = select(details, kind, tier)?;
        tokio::fs::create_dir_all(&self.work_dir).await?;

        let mut files = TempFiles::new();
        let audio_path = files.register(self.work_dir.join(temp_file_name(
            &details.title,
            "audio",
            &selection.audio.extension,
        )));
        let video_path = selection.video.map(|descriptor| {
            files.register(self.work_dir.join(temp_file_name(
                &details.title,
                "video",
                &descriptor.extension,
            )))
        });

        info!(
            title = %details.title,
            %kind,
            ?tier,
            video = selection.video.map(|d| d.quality_label.as_str()),
            audio = %selection.audio.quality_label,
            "fetching streams"
        );

        // Files exist before any leg starts, so cancellation can never race their creation.
        let audio_file = File::create(&audio_path).await?;
        let video_file = match &video_path {
            Some(path) => Some(File::create(path).await?),
            None => None,
        };

        let legs = async {
            match (selection.video, video_file) {
                (Some(video), Some(video_file)) => {
                    let (video_bytes, audio_bytes) = tokio::try_join!(
                        self.download_leg(video, video_file),
                        self.download_leg(selection.audio, audio_file),
                    )?;
                    debug!(video_bytes, audio_bytes, "both legs complete");
                }
                _ => {
                    let audio_bytes = self.download_leg(selection.audio, audio_file).await?;
                    debug!(audio_bytes, "audio leg complete");
                }
            }
            Ok::<(), Error>(())
        };

        let outcome = tokio::time::timeout(self.timeout, legs).await;
        match outcome {
            Ok(Ok(())) => Ok(FetchedMedia {
                title: details.title.clone(),
                kind,
                video: video_path,
                audio: audio_path,
                quality_label: selection.video.map(|d| d.quality_label.clone()),
                files,
            }),
            Ok(Err(e)) => {
                warn!(error = %e, "fetch failed, discarding partial files");
                Err(e)
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "fetch timed out, discarding partial files");
                Err(Error::Timeout(self.timeout))
            }
        }
    }

    /// Stream one descriptor into `file`. Returns the number of bytes written.
    async fn download_leg(&self, descriptor: &StreamDescriptor, mut file: File) -> Result<u64> {
        let mut stream = self.resolver.open(descriptor).await?;
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        if let Some(expected) = descriptor.content_length {
            if expected != written {
                debug!(expected, written, quality = %descriptor.quality_label, "size differs from declared length");
            }
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{files_in, sample_details, scratch_dir, Script, ScriptedResolver};
    use crate::types::StreamKind;

    fn pipeline(resolver: ScriptedResolver, dir: &Path, timeout: Duration) -> FetchPipeline {
        FetchPipeline::new(Arc::new(resolver), dir.to_path_buf(), timeout)
    }

    #[tokio::test]
    async fn test_audio_fetch_writes_one_file() {
        let dir = scratch_dir("fetch_audio");
        let resolver = ScriptedResolver::new(sample_details())
            .script("mem://128kbps", Script::Chunks(vec![b"ab".to_vec(), b"cd".to_vec()]));
        let pipeline = pipeline(resolver, &dir, DEFAULT_FETCH_TIMEOUT);

        let media = pipeline
            .fetch("https://youtu.be/dQw4w9WgXcQ", MediaKind::Audio, QualityTier::Highest)
            .await
            .unwrap();

        assert!(media.video.is_none());
        assert_eq!(media.quality_label, None);
        assert_eq!(std::fs::read(&media.audio).unwrap(), b"abcd");
        assert!(media.audio.extension().is_some_and(|e| e == "m4a"));
        assert_eq!(files_in(&dir).len(), 1);

        drop(media);
        assert!(files_in(&dir).is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_video_fetch_downloads_both_legs() {
        let dir = scratch_dir("fetch_video");
        let resolver = ScriptedResolver::new(sample_details())
            .script("mem://144p", Script::Chunks(vec![b"video".to_vec()]))
            .script("mem://128kbps", Script::Chunks(vec![b"audio".to_vec()]));
        let pipeline = pipeline(resolver, &dir, DEFAULT_FETCH_TIMEOUT);

        let media = pipeline
            .fetch("https://youtu.be/dQw4w9WgXcQ", MediaKind::Video, QualityTier::Lowest)
            .await
            .unwrap();

        assert_eq!(media.quality_label.as_deref(), Some("144p"));
        assert_eq!(std::fs::read(media.video.as_ref().unwrap()).unwrap(), b"video");
        assert_eq!(std::fs::read(&media.audio).unwrap(), b"audio");
        assert_eq!(files_in(&dir).len(), 2);

        drop(media);
        assert!(files_in(&dir).is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_audio_leg_failure_removes_completed_video_leg() {
        let dir = scratch_dir("fetch_audio_leg_fails");
        let resolver = ScriptedResolver::new(sample_details())
            .script("mem://720p", Script::Chunks(vec![vec![7u8; 4096]]))
            .script(
                "mem://128kbps",
                Script::FailAfter(vec![b"partial".to_vec()], Duration::from_millis(200)),
            );
        let pipeline = pipeline(resolver, &dir, DEFAULT_FETCH_TIMEOUT);

        let err = pipeline
            .fetch("https://youtu.be/dQw4w9WgXcQ", MediaKind::Video, QualityTier::Highest)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Stream(_)));
        assert!(files_in(&dir).is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_video_leg_failure_cancels_audio_leg() {
        let dir = scratch_dir("fetch_video_leg_fails");
        let resolver = ScriptedResolver::new(sample_details())
            .script(
                "mem://720p",
                Script::FailAfter(vec![b"partial".to_vec()], Duration::from_millis(10)),
            )
            .script("mem://128kbps", Script::Hang(vec![b"audio".to_vec()]));
        let pipeline = pipeline(resolver, &dir, DEFAULT_FETCH_TIMEOUT);

        let started = std::time::Instant::now();
        let err = pipeline
            .fetch("https://youtu.be/dQw4w9WgXcQ", MediaKind::Video, QualityTier::Highest)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Stream(_)));
        // the hanging audio leg was dropped rather than awaited
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(files_in(&dir).is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_timeout_closes_streams_and_cleans_up() {
        let dir = scratch_dir("fetch_timeout");
        let resolver = ScriptedResolver::new(sample_details())
            .script("mem://128kbps", Script::Hang(vec![b"some bytes".to_vec()]));
        let pipeline = pipeline(resolver, &dir, Duration::from_millis(200));

        let err = pipeline
            .fetch("https://youtu.be/dQw4w9WgXcQ", MediaKind::Audio, QualityTier::Highest)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout(_)));
        assert!(files_in(&dir).is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_timeout_with_both_legs_open() {
        let dir = scratch_dir("fetch_timeout_video");
        let resolver = ScriptedResolver::new(sample_details())
            .script("mem://720p", Script::Hang(vec![b"frames".to_vec()]))
            .script("mem://128kbps", Script::Hang(vec![b"sound".to_vec()]));
        let resolver = Arc::new(resolver);
        let pipeline = FetchPipeline::new(resolver.clone(), dir.clone(), Duration::from_millis(200));

        let err = pipeline
            .fetch("https://youtu.be/dQw4w9WgXcQ", MediaKind::Video, QualityTier::Highest)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout(_)));
        assert_eq!(resolver.opened(), 2);
        assert!(files_in(&dir).is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_hanging_resolution_times_out() {
        let dir = scratch_dir("fetch_resolve_hangs");
        let pipeline = pipeline(ScriptedResolver::hanging(), &dir, Duration::from_millis(200));

        let started = std::time::Instant::now();
        let err = pipeline
            .fetch("https://youtu.be/dQw4w9WgXcQ", MediaKind::Video, QualityTier::Highest)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(files_in(&dir).is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_resolution_failure_creates_no_files() {
        let dir = scratch_dir("fetch_private");
        let pipeline = pipeline(ScriptedResolver::failing("Private video"), &dir, DEFAULT_FETCH_TIMEOUT);

        let err = pipeline
            .fetch("https://youtu.be/dQw4w9WgXcQ", MediaKind::Video, QualityTier::Highest)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Resolution(_)));
        assert!(files_in(&dir).is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_no_audio_format_fails_before_any_write() {
        let dir = scratch_dir("fetch_no_audio");
        let mut details = sample_details();
        details.streams.retain(|s| s.kind != StreamKind::AudioOnly);
        let resolver = Arc::new(ScriptedResolver::new(details));
        let pipeline = FetchPipeline::new(resolver.clone(), dir.clone(), DEFAULT_FETCH_TIMEOUT);

        let err = pipeline
            .fetch("https://youtu.be/dQw4w9WgXcQ", MediaKind::Audio, QualityTier::Highest)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NoSuitableFormat("audio")));
        assert_eq!(resolver.opened(), 0);
        assert!(files_in(&dir).is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_no_video_only_format() {
        let dir = scratch_dir("fetch_no_video");
        let mut details = sample_details();
        details.streams.retain(|s| s.kind != StreamKind::VideoOnly);
        let pipeline = pipeline(ScriptedResolver::new(details), &dir, DEFAULT_FETCH_TIMEOUT);

        let err = pipeline
            .fetch("https://youtu.be/dQw4w9WgXcQ", MediaKind::Video, QualityTier::Highest)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NoSuitableFormat("video")));
        std::fs::remove_dir_all(&dir).ok();
    }
}
