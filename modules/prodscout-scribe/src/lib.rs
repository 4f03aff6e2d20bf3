//! Video transcription: audio extraction, speech recognition, and
//! context-aware subtitle cleanup.
//!
//! The scribe never fails a post: any sub-step error degrades to an
//! empty transcript and the enricher moves on.

pub mod asr;
pub mod data;
pub mod download;
pub mod error;
pub mod optimize;
pub mod scribe;
pub mod video;

pub use asr::{AsrBackend, WhisperCli};
pub use data::{SubtitleSegment, Transcript};
pub use error::{Result, ScribeError};
pub use scribe::VideoScribe;
