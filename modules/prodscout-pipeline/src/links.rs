//! Embedded-URL extraction and classification for the enricher.

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use prodscout_core::SourceType;
use prodscout_scribe::video;

/// Image/asset CDNs: recorded as external links but never fetched.
const MEDIA_HOSTS: [&str; 2] = ["twimg.com", "pbs.twimg.com"];

/// Hosts a post of the given source type links back into its own
/// platform; these never count as external content.
pub fn self_link_hosts(source_type: SourceType) -> &'static [&'static str] {
    match source_type {
        SourceType::Microblog => &["twitter.com", "x.com", "t.co", "pic.twitter.com"],
        _ => &[],
    }
}

/// Pull URLs out of free text (or HTML), trimming trailing punctuation
/// and de-duplicating while preserving order.
pub fn extract_urls(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    static URL_RE: OnceLock<Regex> = OnceLock::new();
    let re = URL_RE.get_or_init(|| {
        Regex::new(r#"https?://[^\s<>"{}|\\^`\[\]]+"#).expect("url regex")
    });

    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for m in re.find_iter(text) {
        let url = m
            .as_str()
            .trim_end_matches(['.', ',', ';', ':', '!', '?', ')'])
            .to_string();
        if seen.insert(url.clone()) {
            out.push(url);
        }
    }
    out
}

#[derive(Debug, Default)]
pub struct ClassifiedUrls {
    pub videos: Vec<String>,
    pub pages: Vec<String>,
    pub media: Vec<String>,
}

impl ClassifiedUrls {
    /// All retained URLs in classification order, for `extra_urls`.
    pub fn all(&self) -> Vec<String> {
        self.videos
            .iter()
            .chain(self.pages.iter())
            .chain(self.media.iter())
            .cloned()
            .collect()
    }
}

/// Split URLs into videos, renderable pages, and media assets, dropping
/// anything that points back at the originating platform.
pub fn classify(urls: &[String], source_type: SourceType) -> ClassifiedUrls {
    let mut classified = ClassifiedUrls::default();
    let self_hosts = self_link_hosts(source_type);

    for url in urls {
        let Some(host) = host_of(url) else {
            continue;
        };
        if self_hosts.iter().any(|h| host_matches(&host, h)) {
            continue;
        }

        if video::is_video_url(url) {
            classified.videos.push(url.clone());
        } else if MEDIA_HOSTS.iter().any(|h| host_matches(&host, h)) {
            classified.media.push(url.clone());
        } else {
            classified.pages.push(url.clone());
        }
    }
    classified
}

pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
}

fn host_matches(host: &str, pattern: &str) -> bool {
    host == pattern || host.ends_with(&format!(".{pattern}"))
}
