use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

/// watch / embed / v / shorts / live links and youtu.be short links with an 11-char id.
static VIDEO_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:https?://)?(?:(?:www|m|music)\.)?(?:youtube\.com/(?:watch\?(?:[^#\s]*&)?v=|embed/|v/|shorts/|live/)|youtu\.be/)[A-Za-z0-9_-]{11}",
    )
    .expect("video URL pattern is valid")
});

/// Validate that a string looks like a URL.
/// Rejects anything that isn't http:// or https://.
pub fn validate_url(url: &str) -> Result<()> {
    let trimmed = url.trim();
    if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
        Ok(())
    } else {
        Err(Error::InvalidUrl(trimmed.to_string()))
    }
}

/// Find the first video link in free text and return it with an explicit scheme.
pub fn extract_video_url(text: &str) -> Option<String> {
    text.split_whitespace()
        .find(|word| VIDEO_URL.is_match(word))
        .map(|word| {
            if word.starts_with("http://") || word.starts_with("https://") {
                word.to_string()
            } else {
                format!("https://{word}")
            }
        })
}

/// Whether the text contains a recognisable video link.
pub fn is_video_url(text: &str) -> bool {
    extract_video_url(text).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url_https() {
        assert!(validate_url("https://youtube.com/watch?v=abc").is_ok());
    }

    #[test]
    fn test_validate_url_http() {
        assert!(validate_url("http://example.com/video").is_ok());
    }

    #[test]
    fn test_validate_url_rejects_no_scheme() {
        assert!(validate_url("youtube.com/watch?v=abc").is_err());
    }

    #[test]
    fn test_validate_url_rejects_file_scheme() {
        assert!(validate_url("file:///etc/passwd").is_err());
    }

    #[test]
    fn test_validate_url_rejects_command() {
        assert!(validate_url("$(whoami)").is_err());
    }

    #[test]
    fn test_extract_watch_url() {
        assert_eq!(
            extract_video_url("look at this https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42s !"),
            Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42s".to_string())
        );
    }

    #[test]
    fn test_extract_watch_url_with_leading_params() {
        assert!(is_video_url("https://www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ"));
    }

    #[test]
    fn test_extract_short_links() {
        assert_eq!(
            extract_video_url("youtu.be/dQw4w9WgXcQ"),
            Some("https://youtu.be/dQw4w9WgXcQ".to_string())
        );
        assert!(is_video_url("https://youtube.com/shorts/abcdefghijk"));
        assert!(is_video_url("https://music.youtube.com/watch?v=abcdefghijk"));
        assert!(is_video_url("https://m.youtube.com/embed/abcdefghijk"));
    }

    #[test]
    fn test_rejects_other_hosts() {
        assert!(!is_video_url("https://vimeo.com/123456789"));
        assert!(!is_video_url("https://notyoutube.com/watch?v=dQw4w9WgXcQ"));
        assert!(!is_video_url("hello there"));
    }

    #[test]
    fn test_rejects_short_ids() {
        assert!(!is_video_url("https://youtu.be/abc"));
    }
}
