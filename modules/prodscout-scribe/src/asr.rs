//! Speech-recognition backend seam.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use crate::data::Transcript;
use crate::error::{Result, ScribeError};

#[async_trait]
pub trait AsrBackend: Send + Sync {
    /// Transcribe an audio file into timed segments.
    async fn transcribe(&self, audio: &Path) -> Result<Transcript>;
}

/// Whisper-family CLI backend: runs the recognizer binary and parses the
/// SRT file it writes next to the audio.
pub struct WhisperCli {
    program: PathBuf,
    model: Option<PathBuf>,
    language: Option<String>,
}

impl WhisperCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            model: None,
            language: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<PathBuf>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

#[async_trait]
impl AsrBackend for WhisperCli {
    async fn transcribe(&self, audio: &Path) -> Result<Transcript> {
        let base = audio.with_extension("");
        let mut command = Command::new(&self.program);
        command
            .arg("-f")
            .arg(audio)
            .arg("-osrt")
            .arg("-of")
            .arg(&base);
        if let Some(model) = &self.model {
            command.arg("-m").arg(model);
        }
        if let Some(language) = &self.language {
            command.arg("-l").arg(language);
        }

        info!(audio = %audio.display(), "Running speech recognition");
        let output = command
            .output()
            .await
            .map_err(|e| ScribeError::Asr(format!("recognizer not runnable: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ScribeError::Asr(stderr.chars().take(300).collect()));
        }

        let srt_path = base.with_extension("srt");
        let raw = tokio::fs::read_to_string(&srt_path).await.map_err(|e| {
            ScribeError::Asr(format!("no SRT at {}: {e}", srt_path.display()))
        })?;
        Transcript::parse_srt(&raw)
    }
}
