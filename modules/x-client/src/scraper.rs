//! High-level scraper: resolves users, paginates timelines with the
//! date-window termination rules, paces requests, and projects tweets
//! into pipeline posts.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use prodscout_core::{Post, XScraperConfig};

use crate::client::{XClient, XClientOptions};
use crate::error::{Result, XClientError};
use crate::models::Tweet;
use crate::pool::CredentialPool;
use crate::transport::{ImpersonatedTransport, XTransport};

/// Timeline pages are requested in chunks of at most 20 tweets; larger
/// pages trip the platform's anomaly detection.
const MAX_PAGE_SIZE: usize = 20;

/// Consecutive pages adding nothing before pagination gives up.
const MAX_EMPTY_ADD_PAGES: u32 = 3;

/// When a page is at least this fraction out-of-window and added nothing,
/// further pages are not worth their request cost.
const NEAR_ALL_OLD_THRESHOLD: f64 = 0.9;

#[derive(Debug, Clone)]
pub struct XScraperOptions {
    pub max_tweets_per_user: usize,
    /// Pause between timeline pages of one user, seconds.
    pub request_delay: (f64, f64),
    /// Pause between users in a batch, seconds.
    pub user_switch_delay: (f64, f64),
    pub include_retweets: bool,
    pub include_replies: bool,
}

impl Default for XScraperOptions {
    fn default() -> Self {
        Self {
            max_tweets_per_user: 20,
            request_delay: (15.0, 25.0),
            user_switch_delay: (30.0, 60.0),
            include_retweets: false,
            include_replies: false,
        }
    }
}

pub struct XScraper {
    client: XClient,
    options: XScraperOptions,
    cancel: CancellationToken,
}

impl XScraper {
    pub fn new(client: XClient, options: XScraperOptions) -> Self {
        Self {
            client,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Build pool, impersonated transport, and client from configuration.
    /// Credentials come from the config's delimited list, falling back to
    /// the env-style file `x-auth.env` next to the config.
    pub fn from_config(config: &XScraperConfig, config_dir: &Path) -> Result<Self> {
        let pool = if config.auth_credentials.is_empty() {
            CredentialPool::from_env_file(&config_dir.join("x-auth.env"))?
        } else {
            CredentialPool::from_delimited(&config.auth_credentials)?
        };

        let transport: Arc<dyn XTransport> = Arc::new(ImpersonatedTransport::new(
            Duration::from_secs(config.request_timeout),
        )?);

        let client = XClient::new(
            Arc::new(pool),
            transport,
            XClientOptions {
                max_retries: config.max_retries,
                circuit_breaker_threshold: config.circuit_breaker_threshold,
                circuit_breaker_cooldown: Duration::from_secs(config.circuit_breaker_cooldown),
                query_ids: config.query_ids.clone(),
                features: config.features.clone(),
            },
        );

        Ok(Self::new(
            client,
            XScraperOptions {
                max_tweets_per_user: config.max_tweets_per_user,
                request_delay: (config.request_delay_min, config.request_delay_max),
                user_switch_delay: (config.user_switch_delay_min, config.user_switch_delay_max),
                include_retweets: config.include_retweets,
                include_replies: config.include_replies,
            },
        ))
    }

    /// Scraper aborts pacing sleeps and pagination when this token fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn client(&self) -> &XClient {
        &self.client
    }

    /// Fetch one user's recent tweets, newest first, bounded by `limit`
    /// and the cutoff date.
    pub async fn fetch_user_tweets(
        &self,
        username: &str,
        limit: usize,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<Tweet>> {
        let Some(user_id) = self.client.user_id(username).await? else {
            warn!(username, "Cannot resolve user id, skipping");
            return Ok(Vec::new());
        };

        let mut collected: Vec<Tweet> = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut seen_cursors: HashSet<String> = HashSet::new();
        let mut empty_add_pages = 0u32;
        let mut page = 0u32;

        while collected.len() < limit {
            if self.cancel.is_cancelled() {
                info!(username, "Scrape cancelled mid-pagination");
                break;
            }
            page += 1;
            let per_page = MAX_PAGE_SIZE.min(limit - collected.len());

            let (tweets, next_cursor) = self
                .client
                .user_tweets(
                    &user_id,
                    per_page,
                    cursor.as_deref(),
                    self.options.include_replies,
                )
                .await?;

            if tweets.is_empty() {
                info!(username, page, "Empty timeline page, stopping");
                break;
            }

            // Pagination termination looks at dates only; the
            // retweet/duplicate filters below must not mask a page that
            // still carries in-window tweets.
            let mut page_has_new_enough = false;
            let raw_count = tweets.len();
            let mut skipped_old = 0usize;
            let mut skipped_retweet = 0usize;
            let mut skipped_duplicate = 0usize;
            let mut added = 0usize;

            for tweet in tweets {
                let in_window = match (cutoff, tweet.created_at) {
                    (Some(cutoff), Some(at)) => at >= cutoff,
                    _ => true,
                };
                if in_window {
                    page_has_new_enough = true;
                } else {
                    skipped_old += 1;
                    continue;
                }

                if !self.options.include_retweets && tweet.is_retweet {
                    skipped_retweet += 1;
                    continue;
                }
                if !seen_ids.insert(tweet.id.clone()) {
                    skipped_duplicate += 1;
                    continue;
                }

                collected.push(tweet);
                added += 1;
                if collected.len() >= limit {
                    break;
                }
            }

            info!(
                username,
                page,
                raw = raw_count,
                added,
                skipped_old,
                skipped_retweet,
                skipped_duplicate,
                total = collected.len(),
                "Timeline page processed"
            );

            if added == 0 {
                empty_add_pages += 1;
            } else {
                empty_add_pages = 0;
            }

            // Pinned/duplicate entries dominating with no progress.
            if added == 0
                && skipped_duplicate > 0
                && skipped_old + skipped_retweet + skipped_duplicate >= raw_count
            {
                info!(username, "Duplicates dominate with no additions, stopping");
                break;
            }
            if added == 0
                && cutoff.is_some()
                && (skipped_old as f64 / raw_count as f64) >= NEAR_ALL_OLD_THRESHOLD
            {
                info!(username, "Page almost entirely out of window, stopping");
                break;
            }
            if empty_add_pages >= MAX_EMPTY_ADD_PAGES {
                info!(
                    username,
                    pages = empty_add_pages,
                    "No additions across consecutive pages, stopping"
                );
                break;
            }
            if cutoff.is_some() && !page_has_new_enough {
                info!(username, "Whole page older than cutoff, stopping");
                break;
            }

            let Some(next) = next_cursor else {
                break;
            };
            if Some(next.as_str()) == cursor.as_deref() {
                warn!(username, "Repeated pagination cursor, stopping");
                break;
            }
            if !seen_cursors.insert(next.clone()) {
                warn!(username, "Cursor loop detected, stopping");
                break;
            }
            cursor = Some(next);

            self.pause(self.options.request_delay).await;
        }

        info!(username, count = collected.len(), pages = page, "User fetch complete");
        Ok(collected)
    }

    /// Fetch and project one user's tweets into posts. Undated tweets are
    /// dropped here; the fetch window cannot be evaluated against them.
    pub async fn fetch_user_posts(
        &self,
        username: &str,
        source_name: &str,
        lookback_days: i64,
    ) -> Result<Vec<Post>> {
        let cutoff = Utc::now() - ChronoDuration::days(lookback_days);
        let tweets = self
            .fetch_user_tweets(username, self.options.max_tweets_per_user, Some(cutoff))
            .await?;
        Ok(tweets
            .iter()
            .filter_map(|t| t.to_post(source_name))
            .collect())
    }

    /// Batch over `(source_name, username)` pairs, serially, with the
    /// user-switch pause between accounts. A per-user failure yields an
    /// error entry and the batch continues; pool exhaustion and an open
    /// circuit abort the whole batch.
    pub async fn fetch_all(
        &self,
        accounts: &[(String, String)],
        lookback_days: i64,
    ) -> Vec<(String, Result<Vec<Post>>)> {
        let total = accounts.len();
        let mut results = Vec::with_capacity(total);

        for (i, (source_name, username)) in accounts.iter().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }
            info!(n = i + 1, total, source = %source_name, username = %username, "Fetching user");

            let outcome = self
                .fetch_user_posts(username, source_name, lookback_days)
                .await;

            let fatal = matches!(
                outcome,
                Err(XClientError::PoolExhausted) | Err(XClientError::CircuitOpen)
            );
            results.push((source_name.clone(), outcome));
            if fatal {
                warn!("Aborting scraper batch, remaining users skipped");
                break;
            }

            if i + 1 < total {
                self.pause(self.options.user_switch_delay).await;
            }
        }

        results
    }

    /// Uniform random pause, interruptible by cancellation.
    async fn pause(&self, range: (f64, f64)) {
        let (lo, hi) = (range.0.max(0.0), range.1.max(range.0.max(0.0)));
        let secs = {
            let mut rng = rand::thread_rng();
            if hi > lo {
                rng.gen_range(lo..=hi)
            } else {
                lo
            }
        };
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(Duration::from_secs_f64(secs)) => {}
        }
    }
}
