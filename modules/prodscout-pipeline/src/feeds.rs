//! Syndication feed fetching behind the [`FeedParser`] seam.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;

use crate::traits::{FeedItem, FeedParser};

pub struct HttpFeedParser {
    client: reqwest::Client,
}

impl HttpFeedParser {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building feed HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedParser for HttpFeedParser {
    async fn fetch(&self, url: &str) -> anyhow::Result<Vec<FeedItem>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("requesting feed {url}"))?
            .error_for_status()
            .with_context(|| format!("feed {url} returned an error status"))?;
        let bytes = response.bytes().await.context("reading feed body")?;

        let feed = feed_rs::parser::parse(bytes.as_ref())
            .with_context(|| format!("parsing feed {url}"))?;

        Ok(feed
            .entries
            .into_iter()
            .map(|entry| {
                // Content body beats the summary; microblog and video
                // bridges often only fill one of the two.
                let content = entry
                    .content
                    .and_then(|c| c.body)
                    .filter(|b| !b.trim().is_empty())
                    .or_else(|| entry.summary.map(|s| s.content))
                    .unwrap_or_default();

                FeedItem {
                    title: entry.title.map(|t| t.content).unwrap_or_default(),
                    link: entry
                        .links
                        .first()
                        .map(|l| l.href.clone())
                        .unwrap_or_default(),
                    published: entry.published.or(entry.updated),
                    content,
                }
            })
            .collect())
    }
}
