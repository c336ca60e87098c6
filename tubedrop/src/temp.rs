use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::types::sanitize_filename;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Build a per-job file name: `<title>_<nanos>_<seq>_<leg>.<ext>`.
///
/// The process-wide sequence keeps names distinct even for identical titles
/// created in the same instant.
pub fn temp_file_name(title: &str, leg: &str, extension: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let stem = match sanitize_filename(title) {
        s if s.is_empty() => "media".to_string(),
        s => s,
    };
    format!("{stem}_{nanos}_{seq}_{leg}.{}", sanitize_filename(extension))
}

/// RAII guard that removes every registered file when dropped.
///
/// A job registers each path before anything is written to it, so partial
/// downloads, mux output and the final artifact all disappear on every exit
/// path, including timeouts and cancellation.
#[derive(Debug, Default)]
pub struct TempFiles {
    paths: Vec<PathBuf>,
}

impl TempFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `path` for deletion and hand it back.
    pub fn register(&mut self, path: impl Into<PathBuf>) -> PathBuf {
        let path = path.into();
        self.paths.push(path.clone());
        path
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl Drop for TempFiles {
    fn drop(&mut self) {
        for path in &self.paths {
            remove_quietly(path);
        }
    }
}

fn remove_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "deleted temp file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to clean up temp file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_file_name_shape() {
        let name = temp_file_name("My Video: Part 1", "audio", "webm");
        assert!(name.starts_with("My_Video__Part_1_"));
        assert!(name.ends_with("_audio.webm"));
    }

    #[test]
    fn test_temp_file_name_unique_for_same_title() {
        let a = temp_file_name("same", "video", "mp4");
        let b = temp_file_name("same", "video", "mp4");
        assert_ne!(a, b);
    }

    #[test]
    fn test_temp_file_name_empty_title() {
        assert!(temp_file_name("", "muxed", "mp4").starts_with("media_"));
    }

    #[test]
    fn test_drop_removes_registered_files() {
        let dir = std::env::temp_dir().join(format!("tubedrop_test_temp_guard_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let written = dir.join("written.bin");
        let never_written = dir.join("never_written.bin");
        std::fs::write(&written, b"partial").unwrap();

        {
            let mut files = TempFiles::new();
            files.register(written.clone());
            files.register(never_written.clone());
            assert_eq!(files.paths().len(), 2);
        }

        assert!(!written.exists());
        assert!(!never_written.exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unregistered_files_survive() {
        let dir = std::env::temp_dir().join(format!("tubedrop_test_temp_keep_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let other = dir.join("other.bin");
        std::fs::write(&other, b"keep").unwrap();

        drop(TempFiles::new());

        assert!(other.exists());
        std::fs::remove_dir_all(&dir).ok();
    }
}
