//! Organizer stage: one LLM call per post produces the classification
//! fields, validated and clamped before the post moves on.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use llm_client::LlmClient;
use prodscout_core::{ErrorKind, ErrorLog, OrganizedFields, OrganizerConfig, Post};

use crate::queue::{SharedReceiver, Slot};

const SYSTEM_PROMPT: &str =
    "You are a helpful assistant for data organization. Output only valid JSON, no extra text.";

/// Fallback domain when the model wanders off the allowed list.
pub const FALLBACK_DOMAIN: &str = "Others";

const MAX_KEY_INFO: usize = 10;

pub struct OrganizerStage {
    llm: Arc<dyn LlmClient>,
    config: OrganizerConfig,
    llm_timeout: Duration,
    errlog: ErrorLog,
}

impl OrganizerStage {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        config: OrganizerConfig,
        llm_timeout: Duration,
        errlog: ErrorLog,
    ) -> Self {
        Self {
            llm,
            config,
            llm_timeout,
            errlog,
        }
    }

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

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.organize(&mut post) => {}
            }

            if tx.send(Some(post)).await.is_err() {
                break;
            }
        }
    }

    /// Classify one post, retrying transient failures. A post that still
    /// fails is marked excluded and forwarded; the writer files it under
    /// `excluded/` rather than dropping it.
    async fn organize(&self, post: &mut Post) {
        let prompt = self.build_prompt(post);
        let attempts = 1 + self.config.retry_on_failure;

        for attempt in 1..=attempts {
            let call = self.llm.chat_json(SYSTEM_PROMPT, &prompt);
            match tokio::time::timeout(self.llm_timeout, call).await {
                Ok(Ok(value)) => match self.validate(&value) {
                    Some(fields) => {
                        info!(
                            source = %post.source_name,
                            domain = %fields.domain,
                            score = fields.quality_score,
                            "Post organized"
                        );
                        post.set_organized(fields);
                        return;
                    }
                    None => {
                        warn!(attempt, source = %post.source_name, "Unusable organizer response")
                    }
                },
                Ok(Err(e)) => warn!(attempt, source = %post.source_name, error = %e, "LLM call failed"),
                Err(_) => warn!(
                    attempt,
                    timeout_s = self.llm_timeout.as_secs(),
                    source = %post.source_name,
                    "LLM call timed out"
                ),
            }
        }

        self.errlog.record(
            "organizer",
            &post.source_name,
            ErrorKind::Llm,
            format!("{}: classification failed after {attempts} attempts", post.link),
        );
        post.set_organized(OrganizedFields {
            quality_score: 0,
            quality_reason: "organizer_failed".to_string(),
            ..OrganizedFields::default()
        });
    }

    fn build_prompt(&self, post: &Post) -> String {
        let domains = self.config.domains.join(", ");
        let categories = self.config.categories.join(", ");
        format!(
            r#"You are a senior product-intelligence analyst for the data & AI industry.
Normalize the article below from [{source_name}] into one JSON object.

EXAMPLE JSON OUTPUT:
{{
    "event": "Vendor ships flagship model",
    "key_info": ["Supports multimodal input", "1M token context window"],
    "detail": "The vendor announced its newest flagship model...",
    "category": "product launch",
    "domain": "LLM Tech & Products",
    "quality_score": 5,
    "quality_reason": "Major release with concrete technical details"
}}

Field rules:
- "event": one line naming what happened; reuse the original title when it already describes the event.
- "key_info": 1-5 bullet strings with the core facts.
- "detail": a faithful long-form description. Keep short readable originals nearly verbatim (microblog posts especially); otherwise restructure the content, stripped of markup, preserving its line of reasoning. Do not over-summarize.
- "category": exactly one of: {categories}.
- "domain": exactly one of: {domains}.
- "quality_score": integer 0-5. 5 = major news, hard data, or deep insight; 4 = substantive and worth following; 3 = ordinary background; 2 = thin, low information density; 1 or 0 = no substance, pure marketing, or irrelevant.
- "quality_reason": one short sentence justifying the score.

Article:
Title: {title}
Date: {date}
Link: {link}
Source type: {source_type}
Content: {content}
Supplementary content: {extra_content}"#,
            source_name = post.source_name,
            categories = categories,
            domains = domains,
            title = post.title,
            date = post.date,
            link = post.link,
            source_type = post.source_type,
            content = post.content,
            extra_content = post.extra_content,
        )
    }

    /// Pull the seven fields out of the model's JSON, tolerating the
    /// common shape drift, and clamp to the contract: score in 0..=5,
    /// domain from the allowed set, at most ten key-info items.
    fn validate(&self, value: &Value) -> Option<OrganizedFields> {
        let event = text_field(value, "event")?;

        let quality_score = match value.get("quality_score") {
            Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        }
        .clamp(0, 5) as u8;

        let mut domain = text_field(value, "domain").unwrap_or_default();
        if !self.config.domains.iter().any(|d| d == &domain) {
            debug!(domain = %domain, "Domain outside allowed set, using fallback");
            domain = FALLBACK_DOMAIN.to_string();
        }

        let mut key_info = match value.get("key_info") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            // Some models emit the display form directly.
            Some(Value::String(s)) => s
                .split("<br>")
                .map(|part| {
                    part.trim()
                        .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ' ')
                        .to_string()
                })
                .filter(|s| !s.is_empty())
                .collect(),
            _ => Vec::new(),
        };
        key_info.truncate(MAX_KEY_INFO);

        Some(OrganizedFields {
            event,
            category: text_field(value, "category").unwrap_or_default(),
            domain,
            quality_score,
            quality_reason: text_field(value, "quality_reason").unwrap_or_default(),
            key_info,
            detail: text_field(value, "detail").unwrap_or_default(),
        })
    }
}

fn text_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
