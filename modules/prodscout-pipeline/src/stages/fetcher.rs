//! Fetcher stage: heterogeneous source scheduling.
//!
//! RSS-style sources fan out on the general pool. Microblog sources run
//! strictly serially on the restricted path with a randomized pause
//! before each fetch; the target platform's rate limiting punishes any
//! parallelism inside a credential.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use futures::stream::{self, StreamExt};
use rand::Rng;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use prodscout_core::{Config, ErrorKind, ErrorLog, Post, SourceSpec, SourceType};
use x_client::{XClientError, XScraper};

use crate::queue::Slot;
use crate::traits::{FeedItem, FeedParser};

pub struct FetcherStage {
    config: Arc<Config>,
    feed_parser: Arc<dyn FeedParser>,
    x_scraper: Option<Arc<XScraper>>,
    errlog: ErrorLog,
    cancel: CancellationToken,
    raw_dir: PathBuf,
}

impl FetcherStage {
    pub fn new(
        config: Arc<Config>,
        feed_parser: Arc<dyn FeedParser>,
        x_scraper: Option<Arc<XScraper>>,
        errlog: ErrorLog,
        cancel: CancellationToken,
        raw_dir: PathBuf,
    ) -> Self {
        Self {
            config,
            feed_parser,
            x_scraper,
            errlog,
            cancel,
            raw_dir,
        }
    }

    /// Fetch every configured source and push normalized posts to the
    /// queue. Returns when all source tasks have finished.
    pub async fn run(&self, tx: mpsc::Sender<Slot>) {
        let (microblog, general): (Vec<&SourceSpec>, Vec<&SourceSpec>) = self
            .config
            .sources
            .iter()
            .partition(|s| s.source_type == SourceType::Microblog);

        info!(
            general = general.len(),
            microblog = microblog.len(),
            pool = self.config.fetcher.general_pool_size,
            "Fetcher starting"
        );

        let general_work = stream::iter(general)
            .for_each_concurrent(self.config.fetcher.general_pool_size.max(1), |spec| {
                let tx = tx.clone();
                async move {
                    if self.cancel.is_cancelled() {
                        return;
                    }
                    self.fetch_feed_source(spec, &tx).await;
                }
            });

        let restricted_work = self.run_restricted(&microblog, &tx);

        tokio::join!(general_work, restricted_work);
        info!("Fetcher finished");
    }

    /// Serial microblog path. Whether a source goes through the direct
    /// scraper or its feed URL, each fetch is preceded by a randomized
    /// pause.
    async fn run_restricted(&self, sources: &[&SourceSpec], tx: &mpsc::Sender<Slot>) {
        for spec in sources {
            if self.cancel.is_cancelled() {
                return;
            }
            self.restricted_pause().await;
            if self.cancel.is_cancelled() {
                return;
            }

            let use_scraper = self.x_scraper.is_some() && !spec.value.contains("://");
            if use_scraper {
                let scraper = self.x_scraper.as_ref().expect("checked above");
                let fetched = tokio::select! {
                    _ = self.cancel.cancelled() => return,
                    fetched = scraper.fetch_user_posts(
                        &spec.value,
                        &spec.name,
                        self.config.fetcher.lookback_days,
                    ) => fetched,
                };
                match fetched {
                    Ok(posts) => {
                        info!(source = %spec.name, count = posts.len(), "Microblog source fetched");
                        self.backup_raw(&spec.name, &posts).await;
                        for post in posts {
                            if tx.send(Some(Box::new(post))).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(XClientError::CircuitOpen) => {
                        self.errlog.record(
                            "fetcher",
                            &spec.name,
                            ErrorKind::CircuitOpen,
                            "scraper paused by circuit breaker; remaining microblog sources skipped",
                        );
                        warn!("Circuit open, abandoning microblog sources for this run");
                        return;
                    }
                    Err(XClientError::PoolExhausted) => {
                        self.errlog.record(
                            "fetcher",
                            &spec.name,
                            ErrorKind::AuthFailure,
                            "all credentials disabled; remaining microblog sources skipped",
                        );
                        return;
                    }
                    Err(e) => {
                        self.errlog
                            .record("fetcher", &spec.name, ErrorKind::Source, e.to_string());
                    }
                }
            } else {
                self.fetch_feed_source(spec, tx).await;
            }
        }
    }

    async fn fetch_feed_source(&self, spec: &SourceSpec, tx: &mpsc::Sender<Slot>) {
        info!(source = %spec.name, url = %spec.value, "Fetching feed");
        let fetched = tokio::select! {
            _ = self.cancel.cancelled() => return,
            fetched = self.feed_parser.fetch(&spec.value) => fetched,
        };
        let items = match fetched {
            Ok(items) => items,
            Err(e) => {
                self.errlog
                    .record("fetcher", &spec.name, ErrorKind::Source, format!("{e:#}"));
                return;
            }
        };

        let posts = self.recent_posts(spec, items);
        if posts.is_empty() {
            info!(source = %spec.name, "No recent items");
            return;
        }
        info!(source = %spec.name, count = posts.len(), "Source fetched");
        self.backup_raw(&spec.name, &posts).await;

        for post in posts {
            if tx.send(Some(Box::new(post))).await.is_err() {
                return;
            }
        }
    }

    /// Apply the lookback window and normalize into posts. Items without
    /// a parseable date are dropped.
    fn recent_posts(&self, spec: &SourceSpec, items: Vec<FeedItem>) -> Vec<Post> {
        let cutoff = Utc::now() - ChronoDuration::days(self.config.fetcher.lookback_days);
        items
            .into_iter()
            .filter_map(|item| {
                let Some(published) = item.published else {
                    warn!(source = %spec.name, title = %item.title, "Dropping undated item");
                    return None;
                };
                if published < cutoff || item.link.is_empty() {
                    return None;
                }
                Some(Post::new(
                    item.title,
                    published.date_naive(),
                    item.link,
                    spec.source_type,
                    spec.name.clone(),
                    item.content,
                ))
            })
            .collect()
    }

    /// Persist the source's normalized payload under `raw/` before the
    /// posts enter the queue.
    async fn backup_raw(&self, source_name: &str, posts: &[Post]) {
        if posts.is_empty() {
            return;
        }
        let safe: String = source_name
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let path = self.raw_dir.join(format!("{safe}.json"));
        match serde_json::to_vec_pretty(posts) {
            Ok(bytes) => {
                if let Err(e) = tokio::fs::write(&path, bytes).await {
                    warn!(source = source_name, error = %e, "Raw backup failed");
                }
            }
            Err(e) => warn!(source = source_name, error = %e, "Raw backup serialization failed"),
        }
    }

    async fn restricted_pause(&self) {
        let (lo, hi) = (
            self.config.fetcher.delay_min.max(0.0),
            self.config.fetcher.delay_max.max(self.config.fetcher.delay_min.max(0.0)),
        );
        let secs = {
            let mut rng = rand::thread_rng();
            if hi > lo {
                rng.gen_range(lo..=hi)
            } else {
                lo
            }
        };
        info!(pause_s = secs, "Pausing before microblog fetch");
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(Duration::from_secs_f64(secs)) => {}
        }
    }
}
