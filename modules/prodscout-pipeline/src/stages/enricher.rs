//! Enricher stage: resolve embedded links and linked videos into
//! `extra_content`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use prodscout_core::{EnricherConfig, ErrorKind, ErrorLog, Post, SourceType};

use crate::links;
use crate::queue::{SharedReceiver, Slot};
use crate::traits::{VideoTranscriber, WebRenderer};

/// Rendered pages are clipped before entering `extra_content`.
const MAX_EXCERPT_CHARS: usize = 50_000;

pub struct EnricherStage {
    renderer: Arc<dyn WebRenderer>,
    transcriber: Arc<dyn VideoTranscriber>,
    config: EnricherConfig,
    errlog: ErrorLog,
}

impl EnricherStage {
    pub fn new(
        renderer: Arc<dyn WebRenderer>,
        transcriber: Arc<dyn VideoTranscriber>,
        config: EnricherConfig,
        errlog: ErrorLog,
    ) -> Self {
        Self {
            renderer,
            transcriber,
            config,
            errlog,
        }
    }

    /// One worker: consume until sentinel (or cancellation), forwarding
    /// every post downstream whether or not enrichment succeeded.
    pub async fn worker(
        self: Arc<Self>,
        rx: SharedReceiver,
        tx: mpsc::Sender<Slot>,
        cancel: CancellationToken,
    ) {
        loop {
            let slot = tokio::select! {
                _ = cancel.cancelled() => break,
                slot = rx.recv() => slot,
            };
            let Some(mut post) = slot else { break };

            debug!(source = %post.source_name, link = %post.link, "Enriching post");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.enrich(&mut post) => {}
            }

            if tx.send(Some(post)).await.is_err() {
                break;
            }
        }
    }

    async fn enrich(&self, post: &mut Post) {
        // Scraper-provided URLs plus whatever the content itself links.
        let mut urls = post.extra_urls.clone();
        for url in links::extract_urls(&post.content) {
            if !urls.contains(&url) {
                urls.push(url);
            }
        }

        let classified = links::classify(&urls, post.source_type);
        post.extra_urls = classified.all();

        let mut sections: Vec<String> = Vec::new();
        let mut budget = self.config.max_urls_per_post;

        // A video source's own link is the video to transcribe; it does
        // not count against the embedded-URL budget.
        if post.source_type == SourceType::Video {
            let transcript = self
                .transcriber
                .transcribe(&post.link, &post.title, &post.content, &post.source_name)
                .await;
            if !transcript.is_empty() {
                sections.push(format!("[Video Transcript]\n{transcript}"));
            }
        }

        for url in &classified.videos {
            if budget == 0 {
                break;
            }
            budget -= 1;
            let transcript = self
                .transcriber
                .transcribe(url, &post.title, &post.content, &post.source_name)
                .await;
            if transcript.is_empty() {
                debug!(url = %url, "Video yielded no transcript");
            } else {
                sections.push(format!("[Video Transcript]\n{transcript}"));
            }
        }

        for url in &classified.pages {
            if budget == 0 {
                break;
            }
            budget -= 1;
            match tokio::time::timeout(
                Duration::from_secs(self.config.url_timeout_s),
                self.renderer.render_text(url),
            )
            .await
            {
                Ok(Ok(text)) => {
                    let host = links::host_of(url).unwrap_or_else(|| url.clone());
                    let excerpt: String = text.chars().take(MAX_EXCERPT_CHARS).collect();
                    sections.push(format!("[Embedded: {host}]\n{excerpt}"));
                }
                Ok(Err(e)) => {
                    self.errlog.record(
                        "enricher",
                        &post.source_name,
                        ErrorKind::Enrich,
                        format!("{url}: {e:#}"),
                    );
                }
                Err(_) => {
                    self.errlog.record(
                        "enricher",
                        &post.source_name,
                        ErrorKind::Enrich,
                        format!("{url}: timed out after {}s", self.config.url_timeout_s),
                    );
                }
            }
        }

        if !sections.is_empty() {
            post.extra_content = sections.join("\n\n");
            info!(
                source = %post.source_name,
                sections = sections.len(),
                urls = post.extra_urls.len(),
                "Post enriched"
            );
        }
    }
}
