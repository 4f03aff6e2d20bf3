//! Transcription orchestrator: subtitle shortcut, audio + ASR fallback,
//! optimization, and per-video artifact persistence.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use llm_client::LlmClient;
use tracing::{info, warn};

use crate::asr::AsrBackend;
use crate::data::Transcript;
use crate::download;
use crate::error::{Result, ScribeError};
use crate::video;

pub struct VideoScribe {
    asr: Arc<dyn AsrBackend>,
    /// When absent, the raw transcript is returned unoptimized.
    llm: Option<Arc<dyn LlmClient>>,
    timeout: Duration,
    subtitle_lang: String,
}

impl VideoScribe {
    pub fn new(asr: Arc<dyn AsrBackend>) -> Self {
        Self {
            asr,
            llm: None,
            timeout: Duration::from_secs(600),
            subtitle_lang: "en".to_string(),
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_subtitle_lang(mut self, lang: impl Into<String>) -> Self {
        self.subtitle_lang = lang.into();
        self
    }

    /// Transcribe one video URL. Artifacts land under
    /// `<raw_root>/<source_name>_<video_id>/`. Any failure degrades to an
    /// empty string; the caller enriches with whatever else it has.
    pub async fn transcribe(
        &self,
        url: &str,
        title: &str,
        context: &str,
        source_name: &str,
        raw_root: &Path,
    ) -> String {
        if video::is_silent_video(url) {
            info!(url, "Skipping silent video");
            return String::new();
        }

        let (video_id, download_url) = video::video_identity(url, title);
        let artifact_dir = raw_root.join(format!(
            "{}_{video_id}",
            sanitize_component(source_name)
        ));

        let work = self.run(&download_url, context, &video_id, &artifact_dir);
        match tokio::time::timeout(self.timeout, work).await {
            Ok(Ok(text)) => text,
            Ok(Err(ScribeError::Silent)) => {
                info!(url, "Video has no audio track, skipping");
                String::new()
            }
            Ok(Err(e)) => {
                warn!(url, video_id = %video_id, error = %e, "Transcription failed");
                String::new()
            }
            Err(_) => {
                warn!(url, video_id = %video_id, timeout_s = self.timeout.as_secs(), "Transcription timed out");
                String::new()
            }
        }
    }

    async fn run(
        &self,
        download_url: &str,
        context: &str,
        video_id: &str,
        artifact_dir: &Path,
    ) -> Result<String> {
        tokio::fs::create_dir_all(artifact_dir).await?;

        let transcript = self.acquire_transcript(download_url, artifact_dir).await?;
        if transcript.is_empty() {
            return Err(ScribeError::Asr("recognizer produced no segments".into()));
        }

        let raw_text = transcript.to_plain_text();
        let base = artifact_dir.join(video_id);
        tokio::fs::write(base.with_extension("srt"), transcript.to_srt()).await?;
        tokio::fs::write(base.with_extension("txt"), &raw_text).await?;

        let Some(llm) = &self.llm else {
            return Ok(raw_text);
        };
        match crate::optimize::optimize_transcript(llm.as_ref(), &raw_text, context).await {
            Ok(optimized) => {
                let optimized_path = artifact_dir.join(format!("{video_id}_optimized.txt"));
                tokio::fs::write(optimized_path, &optimized).await?;
                Ok(optimized)
            }
            Err(e) => {
                // Raw transcript is still useful downstream.
                warn!(video_id = %video_id, error = %e, "Optimization failed, keeping raw transcript");
                Ok(raw_text)
            }
        }
    }

    /// Existing platform subtitle tracks beat running the recognizer.
    async fn acquire_transcript(&self, url: &str, artifact_dir: &Path) -> Result<Transcript> {
        if let Some(vtt_path) =
            download::download_platform_subtitles(url, artifact_dir, &self.subtitle_lang).await?
        {
            let raw = tokio::fs::read_to_string(&vtt_path).await?;
            let _ = tokio::fs::remove_file(&vtt_path).await;
            match Transcript::parse_vtt(&raw) {
                Ok(transcript) => {
                    info!(url, "Using existing subtitle track");
                    return Ok(transcript);
                }
                Err(e) => warn!(url, error = %e, "Subtitle track unusable, running ASR"),
            }
        }

        let audio = download::download_audio(url, artifact_dir).await?;
        let transcript = self.asr.transcribe(&audio).await;
        let _ = tokio::fs::remove_file(&audio).await;
        transcript
    }
}

fn sanitize_component(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
