//! Credential pool: rotation, cooldowns, and permanent disabling.
//!
//! The pool is the only mutable shared state in the scraper. All
//! mutations go through the report methods; selection blocks (async)
//! while every credential is cooling.

use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::{Result, XClientError};

/// Default cooldown when the platform gives no usable retry-after: 15 min.
pub const DEFAULT_COOLDOWN_SECS: u64 = 900;

/// Snapshot handed to the client for one request. Reports reference the
/// credential by index.
#[derive(Debug, Clone)]
pub struct Credential {
    pub index: usize,
    pub auth_token: String,
    pub csrf_token: String,
}

#[derive(Debug)]
struct CredentialState {
    auth_token: String,
    csrf_token: String,
    cooldown_until: Option<Instant>,
    last_used: Option<Instant>,
    request_count: u64,
    failure_count: u64,
    is_disabled: bool,
    last_error: String,
}

impl CredentialState {
    fn new(auth_token: String, csrf_token: String) -> Self {
        Self {
            auth_token,
            csrf_token,
            cooldown_until: None,
            last_used: None,
            request_count: 0,
            failure_count: 0,
            is_disabled: false,
            last_error: String::new(),
        }
    }

    fn cooldown_remaining(&self, now: Instant) -> Duration {
        match self.cooldown_until {
            Some(until) if until > now => until - now,
            _ => Duration::ZERO,
        }
    }

    fn is_available(&self, now: Instant) -> bool {
        !self.is_disabled && self.cooldown_remaining(now).is_zero()
    }
}

/// Per-credential view with the token masked past its first 4 characters.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialStatus {
    pub index: usize,
    pub state: &'static str,
    pub request_count: u64,
    pub failure_count: u64,
    pub cooldown_remaining_s: u64,
    pub auth_token_hint: String,
}

pub struct CredentialPool {
    states: Mutex<Vec<CredentialState>>,
}

impl CredentialPool {
    pub fn new(credentials: Vec<(String, String)>) -> Result<Self> {
        if credentials.is_empty() {
            return Err(XClientError::Credentials(
                "at least one auth_token:csrf_token pair is required".into(),
            ));
        }
        let states = credentials
            .into_iter()
            .map(|(auth, csrf)| {
                CredentialState::new(auth.trim().to_string(), csrf.trim().to_string())
            })
            .collect::<Vec<_>>();
        info!(count = states.len(), "Credential pool initialized");
        Ok(Self {
            states: Mutex::new(states),
        })
    }

    /// Parse a pipe-delimited `token:csrf|token2:csrf2` list. Malformed
    /// pairs are skipped with a warning.
    pub fn from_delimited(raw: &str) -> Result<Self> {
        let mut pairs = Vec::new();
        for part in raw.split('|') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match part.split_once(':') {
                Some((auth, csrf)) if !auth.is_empty() && !csrf.is_empty() => {
                    pairs.push((auth.to_string(), csrf.to_string()));
                }
                _ => {
                    let hint: String = part.chars().take(12).collect();
                    warn!(pair = %hint, "Skipping malformed credential pair");
                }
            }
        }
        Self::new(pairs)
    }

    /// Load a single credential from an env-style file. Exact key match on
    /// `TWITTER_AUTH_TOKEN` and `TWITTER_CT0` (alias `XCSRF_TOKEN`).
    pub fn from_env_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            XClientError::Credentials(format!("cannot read {}: {e}", path.display()))
        })?;

        let mut auth_token = String::new();
        let mut csrf_token = String::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').trim_matches('\'');
            match key.trim() {
                "TWITTER_AUTH_TOKEN" => auth_token = value.to_string(),
                "TWITTER_CT0" | "XCSRF_TOKEN" => csrf_token = value.to_string(),
                _ => {}
            }
        }

        if auth_token.is_empty() || csrf_token.is_empty() {
            return Err(XClientError::Credentials(format!(
                "{} is missing TWITTER_AUTH_TOKEN or TWITTER_CT0",
                path.display()
            )));
        }
        Self::new(vec![(auth_token, csrf_token)])
    }

    /// Select the next usable credential, favoring the lowest failure
    /// count and then the least-recently used. Blocks until the earliest
    /// cooldown expires when every credential is cooling; errors when
    /// every credential is permanently disabled.
    pub async fn get_next(&self) -> Result<Credential> {
        loop {
            let wait = {
                let mut states = self.states.lock().expect("credential pool poisoned");
                let now = Instant::now();

                let pick = states
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.is_available(now))
                    .min_by_key(|(_, s)| (s.failure_count, s.last_used))
                    .map(|(i, _)| i);

                if let Some(index) = pick {
                    let state = &mut states[index];
                    state.request_count += 1;
                    state.last_used = Some(now);
                    return Ok(Credential {
                        index,
                        auth_token: state.auth_token.clone(),
                        csrf_token: state.csrf_token.clone(),
                    });
                }

                if states.iter().all(|s| s.is_disabled) {
                    error!("All credentials permanently disabled");
                    return Err(XClientError::PoolExhausted);
                }

                states
                    .iter()
                    .filter(|s| !s.is_disabled)
                    .map(|s| s.cooldown_remaining(now))
                    .min()
                    .unwrap_or(Duration::from_secs(1))
            };

            info!(wait_s = wait.as_secs(), "All credentials cooling, waiting");
            tokio::time::sleep(wait + Duration::from_millis(100)).await;
        }
    }

    pub fn report_rate_limited(&self, index: usize, cooldown_s: u64) {
        let mut states = self.states.lock().expect("credential pool poisoned");
        if let Some(state) = states.get_mut(index) {
            state.cooldown_until = Some(Instant::now() + Duration::from_secs(cooldown_s));
            state.failure_count += 1;
            state.last_error = format!("rate limited, cooldown {cooldown_s}s");
            warn!(
                credential = index,
                cooldown_s,
                requests = state.request_count,
                "Credential rate limited"
            );
        }
    }

    pub fn report_auth_failure(&self, index: usize, reason: &str) {
        let mut states = self.states.lock().expect("credential pool poisoned");
        if let Some(state) = states.get_mut(index) {
            state.is_disabled = true;
            state.failure_count += 1;
            state.last_error = reason.to_string();
            warn!(credential = index, reason, "Credential disabled");
        }
    }

    pub fn report_success(&self, index: usize) {
        let mut states = self.states.lock().expect("credential pool poisoned");
        if let Some(state) = states.get_mut(index) {
            state.failure_count = state.failure_count.saturating_sub(1);
        }
    }

    pub fn available_count(&self) -> usize {
        let states = self.states.lock().expect("credential pool poisoned");
        let now = Instant::now();
        states.iter().filter(|s| s.is_available(now)).count()
    }

    pub fn total_count(&self) -> usize {
        self.states.lock().expect("credential pool poisoned").len()
    }

    /// Masked per-credential snapshot for logs and the CLI.
    pub fn status(&self) -> Vec<CredentialStatus> {
        let states = self.states.lock().expect("credential pool poisoned");
        let now = Instant::now();
        states
            .iter()
            .enumerate()
            .map(|(index, s)| CredentialStatus {
                index,
                state: if s.is_disabled {
                    "disabled"
                } else if !s.cooldown_remaining(now).is_zero() {
                    "cooling"
                } else {
                    "available"
                },
                request_count: s.request_count,
                failure_count: s.failure_count,
                cooldown_remaining_s: s.cooldown_remaining(now).as_secs(),
                auth_token_hint: mask_token(&s.auth_token),
            })
            .collect()
    }
}

fn mask_token(token: &str) -> String {
    let prefix: String = token.chars().take(4).collect();
    format!("{prefix}****")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn pool(n: usize) -> CredentialPool {
        CredentialPool::new(
            (0..n)
                .map(|i| (format!("authtoken{i}"), format!("csrf{i}")))
                .collect(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn rotation_prefers_least_recently_used() {
        let pool = pool(2);
        let first = pool.get_next().await.unwrap();
        let second = pool.get_next().await.unwrap();
        assert_ne!(first.index, second.index);
    }

    #[tokio::test]
    async fn rotation_prefers_lowest_failure_count() {
        let pool = pool(2);
        let first = pool.get_next().await.unwrap();
        pool.report_rate_limited(first.index, 0);
        // Index with a failure on record loses even though it is older.
        let next = pool.get_next().await.unwrap();
        assert_ne!(next.index, first.index);
    }

    #[tokio::test]
    async fn cooling_credentials_are_skipped() {
        let pool = pool(2);
        pool.report_rate_limited(0, 900);
        let cred = pool.get_next().await.unwrap();
        assert_eq!(cred.index, 1);
        assert_eq!(pool.available_count(), 1);
    }

    #[tokio::test]
    async fn all_disabled_is_fatal() {
        let pool = pool(2);
        pool.report_auth_failure(0, "expired");
        pool.report_auth_failure(1, "expired");
        assert!(matches!(
            pool.get_next().await,
            Err(XClientError::PoolExhausted)
        ));
    }

    #[tokio::test]
    async fn blocks_until_earliest_cooldown_expires() {
        let pool = pool(1);
        pool.report_rate_limited(0, 1);
        let started = Instant::now();
        let cred = pool.get_next().await.unwrap();
        assert_eq!(cred.index, 0);
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[test]
    fn report_success_floors_failures_at_zero() {
        let pool = pool(1);
        pool.report_success(0);
        pool.report_rate_limited(0, 0);
        pool.report_success(0);
        pool.report_success(0);
        assert_eq!(pool.status()[0].failure_count, 0);
    }

    #[test]
    fn status_masks_tokens() {
        let pool = CredentialPool::new(vec![(
            "secrettoken123456".to_string(),
            "csrfvalue".to_string(),
        )])
        .unwrap();
        let status = pool.status();
        assert_eq!(status[0].auth_token_hint, "secr****");
        let rendered = serde_json::to_string(&status).unwrap();
        assert!(!rendered.contains("ettoken"));
        assert!(!rendered.contains("csrfvalue"));
    }

    #[test]
    fn delimited_parsing_skips_malformed_pairs() {
        let pool = CredentialPool::from_delimited("a1:c1|broken|a2:c2|").unwrap();
        assert_eq!(pool.total_count(), 2);
    }

    #[test]
    fn empty_delimited_list_errors() {
        assert!(CredentialPool::from_delimited("|||").is_err());
    }

    #[test]
    fn env_file_exact_key_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x-auth.env");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "# comment").unwrap();
        writeln!(f, "TWITTER_AUTH_TOKEN=\"tokenvalue\"").unwrap();
        writeln!(f, "XCSRF_TOKEN='csrfvalue'").unwrap();
        writeln!(f, "TWITTER_AUTH_TOKEN_BACKUP=nope").unwrap();

        let pool = CredentialPool::from_env_file(&path).unwrap();
        assert_eq!(pool.total_count(), 1);
        assert_eq!(pool.status()[0].auth_token_hint, "toke****");
    }

    #[test]
    fn env_file_missing_keys_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x-auth.env");
        std::fs::write(&path, "TWITTER_AUTH_TOKEN=only\n").unwrap();
        assert!(CredentialPool::from_env_file(&path).is_err());
    }
}
