//! Error taxonomy shared across pipeline stages.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal configuration problems. These abort the run before any stage
/// starts; every other failure class is handled near its source and
/// recorded in the run error log.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file unreadable: {0}")]
    Unreadable(String),

    #[error("missing required option: {0}")]
    Missing(String),

    #[error("invalid option: {0}")]
    Invalid(String),

    #[error("credential loading failed: {0}")]
    Credentials(String),
}

/// Classification of non-fatal failures, mirrored into `errors.log` and
/// the end-of-run stderr summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A single source failed to fetch or parse.
    Source,
    /// A credential exhausted its quota.
    RateLimited,
    /// A credential is invalid or expired.
    AuthFailure,
    /// All scraper credentials failing; scraper paused.
    CircuitOpen,
    /// A single URL or video enrichment failed.
    Enrich,
    /// The organizer LLM call failed after retries.
    Llm,
    /// A disk write failed after the retry.
    Write,
}

impl ErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Source => "source",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::AuthFailure => "auth_failure",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::Enrich => "enrich",
            ErrorKind::Llm => "llm",
            ErrorKind::Write => "write",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
