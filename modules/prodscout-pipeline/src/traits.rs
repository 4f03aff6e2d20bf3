//! Capability seams the pipeline consumes. Production wires ecosystem
//! implementations; tests inject fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// One item from a syndication feed, already reduced to what the fetcher
/// needs.
#[derive(Debug, Clone)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub published: Option<DateTime<Utc>>,
    pub content: String,
}

#[async_trait]
pub trait FeedParser: Send + Sync {
    async fn fetch(&self, url: &str) -> anyhow::Result<Vec<FeedItem>>;
}

#[async_trait]
pub trait WebRenderer: Send + Sync {
    /// Fetch a URL through dynamic rendering and return its main text.
    async fn render_text(&self, url: &str) -> anyhow::Result<String>;
}

#[async_trait]
pub trait VideoTranscriber: Send + Sync {
    /// Transcribe a linked video. Empty string means the video produced
    /// nothing usable; enrichment continues without it.
    async fn transcribe(&self, url: &str, title: &str, context: &str, source_name: &str)
        -> String;
}
