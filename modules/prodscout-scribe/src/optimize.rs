//! Context-aware transcript cleanup through the LLM.

use llm_client::LlmClient;
use tracing::debug;

use crate::error::{Result, ScribeError};

const SYSTEM_PROMPT: &str = "You are an expert transcript editor for technical product content. \
You receive a raw speech-recognition transcript and the text of the post that linked the video. \
Rewrite the transcript as flowing prose:\n\
- Correct misrecognized names and domain terms; the post text is your hint for the right forms.\n\
- Remove filler words, repetitions, and recognition artifacts.\n\
- Preserve every substantive statement; do not summarize or drop information.\n\
Output only the cleaned transcript text, nothing else.";

/// Rewrite a raw transcript, using the linking post's text as a hint for
/// domain terms the recognizer may have mangled.
pub async fn optimize_transcript(
    llm: &dyn LlmClient,
    raw_transcript: &str,
    context: &str,
) -> Result<String> {
    let user = if context.trim().is_empty() {
        format!("Raw transcript:\n{raw_transcript}")
    } else {
        format!("Context (the post linking this video):\n{context}\n\nRaw transcript:\n{raw_transcript}")
    };

    let optimized = llm
        .chat(SYSTEM_PROMPT, &user)
        .await
        .map_err(|e| ScribeError::Optimize(e.to_string()))?;
    if optimized.trim().is_empty() {
        return Err(ScribeError::Optimize("empty optimization result".into()));
    }
    debug!(
        raw_len = raw_transcript.len(),
        optimized_len = optimized.len(),
        "Transcript optimized"
    );
    Ok(optimized)
}
