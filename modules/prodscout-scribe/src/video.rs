//! Video URL recognition and stable artifact identifiers.

use sha2::{Digest, Sha256};
use url::Url;

const PLATFORM_HOSTS: [&str; 4] = ["youtube.com", "youtu.be", "www.youtube.com", "m.youtube.com"];
const GENERIC_VIDEO_HOSTS: [&str; 1] = ["video.twimg.com"];
const VIDEO_EXTENSIONS: [&str; 4] = [".mp4", ".mov", ".webm", ".mkv"];

/// URL shapes that carry no audio track (GIFs re-encoded as video).
const SILENT_PATTERNS: [&str; 1] = ["/tweet_video/"];

/// Non-video pages on the platform: live lobbies, channels, user pages.
const NON_VIDEO_PATHS: [&str; 5] = ["/streams", "/live", "/channel/", "/c/", "/user/"];

pub fn is_video_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let host = parsed.host_str().unwrap_or("").to_lowercase();
    let path = parsed.path().to_lowercase();

    PLATFORM_HOSTS.iter().any(|h| host_matches(&host, h))
        || GENERIC_VIDEO_HOSTS.iter().any(|h| host_matches(&host, h))
        || VIDEO_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

pub fn is_silent_video(url: &str) -> bool {
    SILENT_PATTERNS.iter().any(|p| url.contains(p))
}

/// Extract the platform video id from watch/short-link/embed URL shapes.
/// Returns `None` for non-video platform pages.
pub fn platform_video_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    if !PLATFORM_HOSTS.iter().any(|h| host_matches(&host, h)) {
        return None;
    }
    let path = parsed.path();
    if NON_VIDEO_PATHS.iter().any(|p| path.contains(p)) {
        return None;
    }

    if host_matches(&host, "youtu.be") {
        let id = path.trim_start_matches('/');
        return (!id.is_empty()).then(|| id.split('/').next().unwrap_or(id).to_string());
    }

    if path.starts_with("/watch") {
        return parsed
            .query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.to_string())
            .filter(|v| !v.is_empty());
    }
    if let Some(rest) = path.strip_prefix("/embed/") {
        let id = rest.split('/').next().unwrap_or("");
        return (!id.is_empty()).then(|| id.to_string());
    }
    None
}

pub fn canonical_watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

/// Resolve `(artifact_id, download_url)` for any recognized video URL.
/// Platform videos use their native id; everything else derives a stable
/// name from the post title or URL filename plus a short URL hash.
pub fn video_identity(url: &str, title: &str) -> (String, String) {
    if let Some(id) = platform_video_id(url) {
        let watch_url = canonical_watch_url(&id);
        return (id, watch_url);
    }
    (generic_video_id(url, title), url.to_string())
}

fn generic_video_id(url: &str, title: &str) -> String {
    let sanitized: String = title
        .chars()
        .take(50)
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    let base = if sanitized.trim_matches('_').is_empty() {
        Url::parse(url)
            .ok()
            .and_then(|u| {
                u.path_segments()
                    .and_then(|mut s| s.next_back().map(str::to_string))
            })
            .filter(|f| f.contains('.') && f.len() <= 80)
            .map(|f| {
                f.rsplit_once('.')
                    .map(|(stem, _)| stem.to_string())
                    .unwrap_or(f)
                    .chars()
                    .map(|c| if c.is_alphanumeric() { c } else { '_' })
                    .collect::<String>()
            })
            .unwrap_or_default()
    } else {
        sanitized
    };

    if base.is_empty() {
        url_hash(url, 12)
    } else {
        format!("{base}_{}", url_hash(url, 6))
    }
}

fn url_hash(url: &str, len: usize) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..len].to_string()
}

fn host_matches(host: &str, pattern: &str) -> bool {
    host == pattern || host.ends_with(&format!(".{pattern}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_platform_and_file_urls() {
        assert!(is_video_url("https://www.youtube.com/watch?v=abc123"));
        assert!(is_video_url("https://youtu.be/abc123"));
        assert!(is_video_url("https://video.twimg.com/clip/1.mp4"));
        assert!(is_video_url("https://cdn.example.com/talk.webm"));
        assert!(!is_video_url("https://blog.example.com/post"));
    }

    #[test]
    fn extracts_ids_from_all_url_shapes() {
        assert_eq!(
            platform_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            platform_video_id("https://youtu.be/dQw4w9WgXcQ?t=10"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            platform_video_id("https://www.youtube.com/embed/dQw4w9WgXcQ/extra"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn non_video_platform_pages_have_no_id() {
        assert_eq!(
            platform_video_id("https://www.youtube.com/channel/UCabc"),
            None
        );
        assert_eq!(platform_video_id("https://www.youtube.com/c/someone"), None);
        assert_eq!(
            platform_video_id("https://www.youtube.com/@handle/streams"),
            None
        );
    }

    #[test]
    fn generic_identity_uses_title_and_hash() {
        let (id, download) = video_identity("https://cdn.example.com/v/clip.mp4", "Great Demo!");
        assert!(id.starts_with("Great_Demo_"));
        assert_eq!(download, "https://cdn.example.com/v/clip.mp4");
    }

    #[test]
    fn generic_identity_without_title_uses_filename() {
        let (id, _) = video_identity("https://cdn.example.com/v/clip.mp4", "");
        assert!(id.starts_with("clip_"));
    }

    #[test]
    fn silent_video_patterns_detected() {
        assert!(is_silent_video(
            "https://video.twimg.com/tweet_video/abc.mp4"
        ));
        assert!(!is_silent_video("https://video.twimg.com/clip/abc.mp4"));
    }

    #[test]
    fn identity_is_stable() {
        let a = video_identity("https://cdn.example.com/x.mp4", "t");
        let b = video_identity("https://cdn.example.com/x.mp4", "t");
        assert_eq!(a, b);
    }
}
