//! GraphQL client: request construction, response policy, credential
//! rotation, and the circuit breaker.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::Rng;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::error::{Result, XClientError};
use crate::models::Tweet;
use crate::parser::TimelineParser;
use crate::pool::{Credential, CredentialPool, DEFAULT_COOLDOWN_SECS};
use crate::transport::{WireResponse, XTransport};

pub const GRAPHQL_BASE: &str = "https://x.com/i/api/graphql";

/// The web app's fixed bearer token, shared by every logged-in browser
/// session; authentication rides on the cookie pair.
pub const WEB_BEARER_TOKEN: &str = "Bearer AAAAAAAAAAAAAAAAAAAAANRILgAAAAAAnNwIzUejRCOuH5E6I8xnZz4puTs%3D1Zv7ttfk8LF81IUq16cHjhLTvJu4FA33AGWWjCpTnA";

/// Query ids change when the platform redeploys its frontend; both are
/// overridable from configuration.
pub fn default_query_ids() -> HashMap<String, String> {
    HashMap::from([
        (
            "UserByScreenName".to_string(),
            "xmU6X_CKVnQ5lSrCbAmJsg".to_string(),
        ),
        (
            "UserTweets".to_string(),
            "E3opETHurmVJflFsUBVuUQ".to_string(),
        ),
    ])
}

/// Feature flags must match what the web client sends; a missing flag
/// fails the whole request with "features cannot be null".
pub fn default_features() -> serde_json::Map<String, Value> {
    let value = json!({
        "rweb_tipjar_consumption_enabled": true,
        "responsive_web_graphql_exclude_directive_enabled": true,
        "verified_phone_label_enabled": false,
        "creator_subscriptions_tweet_preview_api_enabled": true,
        "responsive_web_graphql_timeline_navigation_enabled": true,
        "responsive_web_graphql_skip_user_profile_image_extensions_enabled": false,
        "communities_web_enable_tweet_community_results_fetch": true,
        "c9s_tweet_anatomy_moderator_badge_enabled": true,
        "articles_preview_enabled": true,
        "responsive_web_edit_tweet_api_enabled": true,
        "graphql_is_translatable_rweb_tweet_is_translatable_enabled": true,
        "view_counts_everywhere_api_enabled": true,
        "longform_notetweets_consumption_enabled": true,
        "responsive_web_twitter_article_tweet_consumption_enabled": true,
        "tweet_awards_web_tipping_enabled": false,
        "creator_subscriptions_quote_tweet_preview_enabled": false,
        "freedom_of_speech_not_reach_fetch_enabled": true,
        "standardized_nudges_misinfo": true,
        "tweet_with_visibility_results_prefer_gql_limited_actions_policy_enabled": true,
        "rweb_video_timestamps_enabled": true,
        "longform_notetweets_rich_text_read_enabled": true,
        "longform_notetweets_inline_media_enabled": true,
        "responsive_web_enhance_cards_enabled": false,
        "profile_label_improvements_pcf_label_in_post_enabled": false,
        "highlights_tweets_tab_ui_enabled": true,
        "subscriptions_verification_info_is_identity_verified_enabled": true,
        "subscriptions_verification_info_verified_since_enabled": true,
        "hidden_profile_subscriptions_enabled": true,
        "responsive_web_twitter_article_notes_tab_enabled": true,
        "subscriptions_feature_can_gift_premium": true,
    });
    match value {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

fn default_field_toggles() -> Value {
    json!({ "withArticlePlainText": false })
}

#[derive(Debug, Clone)]
pub struct XClientOptions {
    pub max_retries: u32,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_cooldown: Duration,
    /// Overrides merged over [`default_query_ids`].
    pub query_ids: Option<HashMap<String, String>>,
    /// Overrides merged over [`default_features`].
    pub features: Option<serde_json::Map<String, Value>>,
}

impl Default for XClientOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            circuit_breaker_threshold: 5,
            circuit_breaker_cooldown: Duration::from_secs(60),
            query_ids: None,
            features: None,
        }
    }
}

#[derive(Debug)]
struct Breaker {
    threshold: u32,
    cooldown: Duration,
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

pub struct XClient {
    pool: Arc<CredentialPool>,
    transport: Arc<dyn XTransport>,
    query_ids: HashMap<String, String>,
    features: serde_json::Map<String, Value>,
    max_retries: u32,
    breaker: Mutex<Breaker>,
    user_id_cache: Mutex<HashMap<String, String>>,
}

impl XClient {
    pub fn new(
        pool: Arc<CredentialPool>,
        transport: Arc<dyn XTransport>,
        options: XClientOptions,
    ) -> Self {
        let mut query_ids = default_query_ids();
        if let Some(overrides) = options.query_ids {
            query_ids.extend(overrides);
        }
        let mut features = default_features();
        if let Some(overrides) = options.features {
            features.extend(overrides);
        }

        Self {
            pool,
            transport,
            query_ids,
            features,
            max_retries: options.max_retries.max(1),
            breaker: Mutex::new(Breaker {
                threshold: options.circuit_breaker_threshold.max(1),
                cooldown: options.circuit_breaker_cooldown,
                consecutive_failures: 0,
                open_until: None,
            }),
            user_id_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    /// Resolve a username to its numeric id. Resolved once per run and
    /// cached. `None` means the account is unavailable.
    pub async fn user_id(&self, username: &str) -> Result<Option<String>> {
        if let Some(cached) = self
            .user_id_cache
            .lock()
            .expect("user id cache poisoned")
            .get(username)
        {
            return Ok(Some(cached.clone()));
        }

        let url = self.endpoint("UserByScreenName")?;
        let variables = json!({
            "screen_name": username,
            "withSafetyModeUserFields": true,
        });
        let response = self.request_with_retry(&url, &variables).await?;

        let user_id = TimelineParser::parse_user_id(&response);
        if let Some(ref id) = user_id {
            self.user_id_cache
                .lock()
                .expect("user id cache poisoned")
                .insert(username.to_string(), id.clone());
        }
        Ok(user_id)
    }

    /// Fetch one timeline page. The reply filter keeps self-reply threads
    /// regardless of `include_replies`.
    pub async fn user_tweets(
        &self,
        user_id: &str,
        count: usize,
        cursor: Option<&str>,
        include_replies: bool,
    ) -> Result<(Vec<Tweet>, Option<String>)> {
        let url = self.endpoint("UserTweets")?;
        let mut variables = json!({
            "userId": user_id,
            "count": count.min(100),
            "includePromotedContent": false,
            "withQuickPromoteEligibilityTweetFields": true,
            "withVoice": true,
            "withV2Timeline": true,
        });
        if let Some(cursor) = cursor {
            variables["cursor"] = json!(cursor);
        }

        let response = self.request_with_retry(&url, &variables).await?;
        let (mut tweets, next_cursor) = TimelineParser::parse_timeline(&response);

        if !include_replies {
            tweets.retain(|t| t.in_reply_to_id.is_none() || t.is_self_reply());
        }

        Ok((tweets, next_cursor))
    }

    fn endpoint(&self, operation: &str) -> Result<String> {
        let query_id = self
            .query_ids
            .get(operation)
            .ok_or_else(|| XClientError::Parse(format!("no query id for {operation}")))?;
        Ok(format!("{GRAPHQL_BASE}/{query_id}/{operation}"))
    }

    fn params(&self, variables: &Value) -> Vec<(String, String)> {
        vec![
            ("variables".to_string(), variables.to_string()),
            (
                "features".to_string(),
                Value::Object(self.features.clone()).to_string(),
            ),
            ("fieldToggles".to_string(), default_field_toggles().to_string()),
        ]
    }

    /// Issue a request with credential rotation, the response policy of
    /// the strict retry table, and circuit-breaker accounting.
    async fn request_with_retry(&self, url: &str, variables: &Value) -> Result<Value> {
        self.wait_for_breaker().await;

        let params = self.params(variables);
        let mut last_err = XClientError::Network("request not attempted".into());

        for attempt in 0..self.max_retries {
            let credential = self.pool.get_next().await?;

            match self.issue(url, &params, &credential).await {
                Ok(value) => {
                    self.pool.report_success(credential.index);
                    self.record_success();
                    return Ok(value);
                }
                Err(XClientError::RateLimited { retry_after }) => {
                    self.pool.report_rate_limited(credential.index, retry_after);
                    warn!(
                        credential = credential.index,
                        attempt = attempt + 1,
                        max = self.max_retries,
                        "Rate limited, rotating credential"
                    );
                    last_err = XClientError::RateLimited { retry_after };
                    if self.record_failure() {
                        return Err(XClientError::CircuitOpen);
                    }
                }
                Err(XClientError::Auth(message)) => {
                    self.pool.report_auth_failure(credential.index, &message);
                    last_err = XClientError::Auth(message);
                    if self.record_failure() {
                        return Err(XClientError::CircuitOpen);
                    }
                }
                Err(e) => {
                    warn!(attempt = attempt + 1, max = self.max_retries, error = %e, "Request failed");
                    last_err = e;
                    if self.record_failure() {
                        return Err(XClientError::CircuitOpen);
                    }
                    if attempt + 1 < self.max_retries {
                        let backoff = {
                            let mut rng = rand::thread_rng();
                            Duration::from_millis(
                                1000 * 2u64.pow(attempt) + rng.gen_range(0..500),
                            )
                        };
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        error!(retries = self.max_retries, "Request failed after all retries");
        Err(last_err)
    }

    async fn issue(
        &self,
        url: &str,
        params: &[(String, String)],
        credential: &Credential,
    ) -> Result<Value> {
        let headers = vec![
            ("authorization".to_string(), WEB_BEARER_TOKEN.to_string()),
            ("x-csrf-token".to_string(), credential.csrf_token.clone()),
            ("x-twitter-active-user".to_string(), "yes".to_string()),
            ("x-twitter-auth-type".to_string(), "OAuth2Session".to_string()),
            ("x-twitter-client-language".to_string(), "en".to_string()),
            ("content-type".to_string(), "application/json".to_string()),
            ("accept".to_string(), "*/*".to_string()),
            ("accept-language".to_string(), "en-US,en;q=0.9".to_string()),
            ("referer".to_string(), "https://x.com/".to_string()),
            ("origin".to_string(), "https://x.com".to_string()),
        ];
        let cookie = format!(
            "auth_token={}; ct0={}",
            credential.auth_token, credential.csrf_token
        );

        let response = self.transport.get(url, params, &headers, &cookie).await?;
        Self::interpret(response)
    }

    /// Map a wire response to the strict policy: 429 → RateLimited with a
    /// tolerant Retry-After parse, 401/403 → Auth, business errors on 200
    /// by code and message, partial data passes with a warning.
    fn interpret(response: WireResponse) -> Result<Value> {
        match response.status {
            200 => {
                let value: Value = serde_json::from_str(&response.body)
                    .map_err(|e| XClientError::Parse(e.to_string()))?;

                let errors = value
                    .get("errors")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let has_data = value.get("data").map(|d| !d.is_null()).unwrap_or(false);

                if !errors.is_empty() && !has_data {
                    return Err(Self::business_error(&errors));
                }
                if !errors.is_empty() {
                    warn!(
                        errors = errors.len(),
                        "GraphQL returned partial data with errors"
                    );
                }
                Ok(value)
            }
            429 => {
                let retry_after = match response.retry_after.as_deref() {
                    Some(raw) => raw.trim().parse::<u64>().unwrap_or_else(|_| {
                        warn!(raw, "Unparseable retry-after header, using default");
                        DEFAULT_COOLDOWN_SECS
                    }),
                    None => DEFAULT_COOLDOWN_SECS,
                };
                Err(XClientError::RateLimited { retry_after })
            }
            401 | 403 => Err(XClientError::Auth(format!(
                "HTTP {}: token expired or banned",
                response.status
            ))),
            status => Err(XClientError::Api {
                status,
                message: response.body.chars().take(200).collect(),
            }),
        }
    }

    fn business_error(errors: &[Value]) -> XClientError {
        let first = errors.first().cloned().unwrap_or(Value::Null);
        let code = first.get("code").and_then(Value::as_i64);
        let message = first
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_lowercase();

        let joined = errors
            .iter()
            .take(3)
            .map(|e| {
                e.get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| e.to_string())
            })
            .collect::<Vec<_>>()
            .join("; ");

        if code == Some(88) || message.contains("rate limit") {
            return XClientError::RateLimited {
                retry_after: DEFAULT_COOLDOWN_SECS,
            };
        }
        if matches!(code, Some(32) | Some(64) | Some(89))
            || ["unauthorized", "forbidden", "auth"]
                .iter()
                .any(|k| message.contains(k))
        {
            return XClientError::Auth(format!("GraphQL auth error: {joined}"));
        }
        XClientError::GraphQl(joined)
    }

    // --- circuit breaker ---

    /// If the breaker is open, sleep out the remaining window, then allow
    /// one probe request (half-open).
    async fn wait_for_breaker(&self) {
        let wait = {
            let breaker = self.breaker.lock().expect("breaker poisoned");
            breaker.open_until.and_then(|until| {
                let now = Instant::now();
                (until > now).then(|| (until - now).min(breaker.cooldown))
            })
        };
        if let Some(wait) = wait {
            warn!(wait_s = wait.as_secs(), "Circuit breaker open, waiting");
            tokio::time::sleep(wait).await;
        }
        let mut breaker = self.breaker.lock().expect("breaker poisoned");
        if breaker.open_until.is_some() {
            breaker.open_until = None;
            info!("Circuit breaker half-open, probing");
        }
    }

    fn record_success(&self) {
        let mut breaker = self.breaker.lock().expect("breaker poisoned");
        if breaker.consecutive_failures > 0 {
            info!(
                failures = breaker.consecutive_failures,
                "Circuit breaker recovered"
            );
        }
        breaker.consecutive_failures = 0;
        breaker.open_until = None;
    }

    /// Returns true when this failure opened the breaker.
    fn record_failure(&self) -> bool {
        let mut breaker = self.breaker.lock().expect("breaker poisoned");
        breaker.consecutive_failures += 1;
        if breaker.consecutive_failures >= breaker.threshold {
            breaker.open_until = Some(Instant::now() + breaker.cooldown);
            error!(
                failures = breaker.consecutive_failures,
                cooldown_s = breaker.cooldown.as_secs(),
                "Circuit breaker opened"
            );
            true
        } else {
            false
        }
    }
}
