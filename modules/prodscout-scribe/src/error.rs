use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScribeError>;

#[derive(Debug, Error)]
pub enum ScribeError {
    #[error("download failed: {0}")]
    Download(String),

    #[error("speech recognition failed: {0}")]
    Asr(String),

    #[error("subtitle parse error: {0}")]
    Subtitle(String),

    #[error("optimization failed: {0}")]
    Optimize(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transcription timed out after {0}s")]
    Timeout(u64),

    /// The media has no audio track (e.g. a GIF converted to video).
    #[error("video has no audio track")]
    Silent,
}
