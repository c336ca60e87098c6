//! Test doubles shared by the pipeline and orchestrator tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use parking_lot::Mutex;

use crate::delivery::{Delivery, Progress};
use crate::error::{Error, Result};
use crate::mux::Muxer;
use crate::resolver::{ByteStream, StreamResolver};
use crate::types::{Artifact, StreamDescriptor, StreamKind, StreamSource, VideoDetails};

/// How a scripted stream behaves once opened.
#[derive(Clone)]
pub enum Script {
    Chunks(Vec<Vec<u8>>),
    /// Yield the chunks, wait, then fail.
    FailAfter(Vec<Vec<u8>>, Duration),
    /// Yield the chunks, then never finish.
    Hang(Vec<Vec<u8>>),
}

/// In-memory resolver keyed by descriptor URL.
pub struct ScriptedResolver {
    details: Option<VideoDetails>,
    resolve_error: Option<String>,
    resolve_hangs: bool,
    scripts: HashMap<String, Script>,
    opened: AtomicUsize,
}

impl ScriptedResolver {
    pub fn new(details: VideoDetails) -> Self {
        Self {
            details: Some(details),
            resolve_error: None,
            resolve_hangs: false,
            scripts: HashMap::new(),
            opened: AtomicUsize::new(0),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            details: None,
            resolve_error: Some(reason.to_string()),
            resolve_hangs: false,
            scripts: HashMap::new(),
            opened: AtomicUsize::new(0),
        }
    }

    /// A resolver whose `resolve` never completes.
    pub fn hanging() -> Self {
        Self {
            resolve_hangs: true,
            ..Self::failing("never reached")
        }
    }

    pub fn script(mut self, url: &str, script: Script) -> Self {
        self.scripts.insert(url.to_string(), script);
        self
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamResolver for ScriptedResolver {
    async fn resolve(&self, _url: &str) -> Result<VideoDetails> {
        if self.resolve_hangs {
            std::future::pending::<()>().await;
        }
        match (&self.details, &self.resolve_error) {
            (_, Some(reason)) => Err(Error::Resolution(reason.clone())),
            (Some(details), None) => Ok(details.clone()),
            (None, None) => Err(Error::Resolution("nothing scripted".into())),
        }
    }

    async fn open(&self, descriptor: &StreamDescriptor) -> Result<ByteStream> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .get(&descriptor.source.url)
            .cloned()
            .unwrap_or(Script::Chunks(Vec::new()));

        let chunks = |parts: Vec<Vec<u8>>| stream::iter(parts.into_iter().map(|c| Ok(Bytes::from(c))));
        Ok(match script {
            Script::Chunks(parts) => chunks(parts).boxed(),
            Script::FailAfter(parts, delay) => chunks(parts)
                .chain(stream::once(async move {
                    tokio::time::sleep(delay).await;
                    Err(Error::Stream("connection reset".into()))
                }))
                .boxed(),
            Script::Hang(parts) => chunks(parts).chain(stream::pending()).boxed(),
        })
    }
}

pub fn descriptor(kind: StreamKind, label: &str, height: Option<u32>, kbps: f64, ext: &str) -> StreamDescriptor {
    StreamDescriptor {
        kind,
        quality_label: label.into(),
        content_length: None,
        height,
        bitrate_kbps: Some(kbps),
        extension: ext.into(),
        source: StreamSource {
            url: format!("mem://{label}"),
            headers: Vec::new(),
        },
    }
}

/// A video with 720p/144p video-only streams and one 128kbps audio-only stream.
pub fn sample_details() -> VideoDetails {
    VideoDetails {
        title: "Sample Clip".into(),
        duration_seconds: 75,
        channel: "Test Channel".into(),
        view_count: 4321,
        streams: vec![
            descriptor(StreamKind::VideoOnly, "720p", Some(720), 2000.0, "mp4"),
            descriptor(StreamKind::VideoOnly, "144p", Some(144), 100.0, "mp4"),
            descriptor(StreamKind::AudioOnly, "128kbps", None, 128.0, "m4a"),
        ],
    }
}

/// Unique, freshly created scratch directory for one test.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tubedrop_test_{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default()
}

/// Muxer that concatenates its inputs, or fails on demand.
#[derive(Default)]
pub struct ConcatMuxer {
    pub fail: bool,
}

#[async_trait]
impl Muxer for ConcatMuxer {
    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<()> {
        if self.fail {
            return Err(Error::Mux("ffmpeg exited with status 1".into()));
        }
        let mut bytes = tokio::fs::read(video).await?;
        bytes.extend(tokio::fs::read(audio).await?);
        tokio::fs::write(output, bytes).await?;
        Ok(())
    }
}

/// Delivery collaborator that records what it was handed.
#[derive(Default)]
pub struct RecordingDelivery {
    pub fail: bool,
    pub delivered: Mutex<Vec<Artifact>>,
    /// Whether each artifact existed on disk at hand-off time.
    pub existed: Mutex<Vec<bool>>,
    pub progress: Mutex<Vec<Progress>>,
}

impl RecordingDelivery {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl Delivery for RecordingDelivery {
    async fn progress(&self, stage: Progress) -> Result<()> {
        self.progress.lock().push(stage);
        Ok(())
    }

    async fn deliver(&self, artifact: &Artifact) -> Result<()> {
        self.existed.lock().push(artifact.path.exists());
        if self.fail {
            return Err(Error::Delivery("upload rejected".into()));
        }
        self.delivered.lock().push(artifact.clone());
        Ok(())
    }
}
