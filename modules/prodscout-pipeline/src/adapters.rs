//! Production implementations of the capability traits.

use std::path::PathBuf;

use async_trait::async_trait;

use prodscout_scribe::VideoScribe;
use render_client::RenderClient;

use crate::traits::{VideoTranscriber, WebRenderer};

#[async_trait]
impl WebRenderer for RenderClient {
    async fn render_text(&self, url: &str) -> anyhow::Result<String> {
        Ok(self.text(url).await?)
    }
}

/// Scribe wired to the batch's raw artifact directory.
pub struct ScribeTranscriber {
    scribe: VideoScribe,
    raw_root: PathBuf,
}

impl ScribeTranscriber {
    pub fn new(scribe: VideoScribe, raw_root: PathBuf) -> Self {
        Self { scribe, raw_root }
    }
}

#[async_trait]
impl VideoTranscriber for ScribeTranscriber {
    async fn transcribe(
        &self,
        url: &str,
        title: &str,
        context: &str,
        source_name: &str,
    ) -> String {
        self.scribe
            .transcribe(url, title, context, source_name, &self.raw_root)
            .await
    }
}
