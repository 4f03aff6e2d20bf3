//! Full-pipeline scenarios with every external collaborator faked.
//!
//! Each test wires Pipeline with in-memory capabilities, runs it to
//! completion, and asserts on the on-disk corpus.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use llm_client::{LlmClient, LlmError, Result as LlmResult};
use prodscout_core::{
    BatchManifest, Config, EnricherConfig, Entity, FetcherConfig, LlmConfig, OrganizerConfig,
    SourceSpec, SourceType, XScraperConfig,
};
use prodscout_pipeline::{FeedItem, FeedParser, Pipeline, PipelineDeps, VideoTranscriber, WebRenderer};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

struct FakeFeed {
    feeds: HashMap<String, Vec<FeedItem>>,
    delay: Duration,
}

#[async_trait]
impl FeedParser for FakeFeed {
    async fn fetch(&self, url: &str) -> anyhow::Result<Vec<FeedItem>> {
        tokio::time::sleep(self.delay).await;
        match self.feeds.get(url) {
            Some(items) => Ok(items.clone()),
            None => anyhow::bail!("feed unreachable: {url}"),
        }
    }
}

struct FakeRenderer;

#[async_trait]
impl WebRenderer for FakeRenderer {
    async fn render_text(&self, url: &str) -> anyhow::Result<String> {
        Ok(format!("rendered body of {url}"))
    }
}

struct FakeTranscriber;

#[async_trait]
impl VideoTranscriber for FakeTranscriber {
    async fn transcribe(&self, _url: &str, _: &str, context: &str, _: &str) -> String {
        // Context-aware correction: the post text carries the proper
        // form of the term the recognizer mangles.
        if context.contains("Pythagorean theorem") {
            "A proof of the Pythagorean theorem in ninety seconds.".to_string()
        } else {
            "generic transcript".to_string()
        }
    }
}

/// Scores each post by a marker embedded in its content; echoes the
/// visible transcript back into the detail so E5 can assert on it.
struct MarkerLlm;

#[async_trait]
impl LlmClient for MarkerLlm {
    async fn chat(&self, _: &str, _: &str) -> LlmResult<String> {
        Err(LlmError::Parse("not used".into()))
    }

    async fn chat_json(&self, _: &str, user: &str) -> LlmResult<Value> {
        let score = if user.contains("marker-high") {
            5
        } else if user.contains("marker-pending") {
            3
        } else {
            0
        };
        Ok(json!({
            "event": "scored event",
            "key_info": ["one fact"],
            "detail": "organized detail",
            "category": "other",
            "domain": "LLM Tech & Products",
            "quality_score": score,
            "quality_reason": "marker driven"
        }))
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

fn item(title: &str, link: &str, content: &str, days_ago: i64) -> FeedItem {
    FeedItem {
        title: title.to_string(),
        link: link.to_string(),
        published: Some(Utc::now() - ChronoDuration::days(days_ago)),
        content: content.to_string(),
    }
}

fn test_config(data_dir: PathBuf, sources: Vec<SourceSpec>, entities: Vec<Entity>) -> Config {
    Config {
        llm: LlmConfig {
            api_key: "test".to_string(),
            base_url: "http://llm.invalid".to_string(),
            model: "test-model".to_string(),
        },
        fetcher: FetcherConfig {
            lookback_days: 7,
            general_pool_size: 3,
            delay_min: 0.0,
            delay_max: 0.0,
        },
        enricher: EnricherConfig {
            pool_size: 2,
            max_urls_per_post: 5,
            url_timeout_s: 5,
        },
        organizer: OrganizerConfig {
            pool_size: 2,
            retry_on_failure: 0,
            domains: vec!["LLM Tech & Products".to_string(), "Others".to_string()],
            categories: vec!["other".to_string()],
        },
        x_scraper: XScraperConfig {
            enabled: false,
            auth_credentials: String::new(),
            max_tweets_per_user: 20,
            request_delay_min: 0.0,
            request_delay_max: 0.0,
            user_switch_delay_min: 0.0,
            user_switch_delay_max: 0.0,
            request_timeout: 30,
            max_retries: 3,
            include_retweets: false,
            include_replies: false,
            circuit_breaker_threshold: 5,
            circuit_breaker_cooldown: 60,
            query_ids: None,
            features: None,
        },
        sources,
        entities,
        data_dir,
        config_dir: PathBuf::from("."),
    }
}

fn pipeline(
    config: Config,
    feeds: HashMap<String, Vec<FeedItem>>,
    feed_delay: Duration,
    cancel: CancellationToken,
) -> Pipeline {
    let deps = PipelineDeps {
        feed_parser: Arc::new(FakeFeed {
            feeds,
            delay: feed_delay,
        }),
        renderer: Arc::new(FakeRenderer),
        transcriber: Arc::new(FakeTranscriber),
        llm: Arc::new(MarkerLlm),
        x_scraper: None,
    };
    Pipeline::new(Arc::new(config), deps, "20260730_120000".to_string(), cancel)
}

fn collect_files(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    out
}

fn read_manifest(batch_dir: &Path) -> BatchManifest {
    let raw = std::fs::read_to_string(batch_dir.join("batch_manifest.json")).unwrap();
    serde_json::from_str(&raw).unwrap()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn quality_buckets_and_entity_views() {
    let dir = tempfile::tempdir().unwrap();
    let feed_url = "https://acme.example/feed";
    let feeds = HashMap::from([(
        feed_url.to_string(),
        vec![
            item("great", "https://acme.example/1", "marker-high Acme ships", 1),
            item("fine", "https://acme.example/2", "marker-pending Acme iterates", 2),
            item("junk", "https://acme.example/3", "nothing to see", 3),
        ],
    )]);
    let sources = vec![SourceSpec {
        source_type: SourceType::Blog,
        name: "Acme Blog".to_string(),
        value: feed_url.to_string(),
    }];
    let entities = vec![Entity {
        name: "Acme".to_string(),
        aliases: vec!["acme".to_string()],
    }];

    let config = test_config(dir.path().to_path_buf(), sources, entities);
    let summary = pipeline(config, feeds, Duration::ZERO, CancellationToken::new())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.counts_by_quality["high"], 1);
    assert_eq!(summary.counts_by_quality["pending"], 1);
    assert_eq!(summary.counts_by_quality["excluded"], 1);
    assert_eq!(summary.counts_by_source_type["Blog"], 3);

    let batch = dir.path().join("20260730_120000");
    let domain_root = batch.join("By-Domain/LLM_Tech___Products");
    assert_eq!(collect_files(&domain_root.join("high")).len(), 1);
    assert_eq!(collect_files(&domain_root.join("pending")).len(), 1);
    assert_eq!(collect_files(&domain_root.join("excluded")).len(), 1);

    // Posts mentioning the entity file under it; the third one does too
    // (source name matches), so Others stays empty here.
    assert_eq!(collect_files(&batch.join("By-Entity/Acme")).len(), 3);

    let manifest = read_manifest(&batch);
    assert!(!manifest.cancelled);
    assert_eq!(manifest.counts_by_bucket["high"], 1);

    // Invariant: the set of written paths has no duplicates.
    let all = collect_files(&batch);
    let unique: std::collections::HashSet<_> = all.iter().collect();
    assert_eq!(all.len(), unique.len());
}

#[tokio::test]
async fn bucket_paths_match_scores() {
    let dir = tempfile::tempdir().unwrap();
    let feed_url = "https://acme.example/feed";
    let feeds = HashMap::from([(
        feed_url.to_string(),
        vec![item("great", "https://acme.example/1", "marker-high x", 1)],
    )]);
    let sources = vec![SourceSpec {
        source_type: SourceType::Blog,
        name: "Acme Blog".to_string(),
        value: feed_url.to_string(),
    }];

    let config = test_config(dir.path().to_path_buf(), sources, vec![]);
    pipeline(config, feeds, Duration::ZERO, CancellationToken::new())
        .run()
        .await
        .unwrap();

    for file in collect_files(&dir.path().join("20260730_120000/By-Domain")) {
        let content = std::fs::read_to_string(&file).unwrap();
        let in_high = file.to_string_lossy().contains("/high/");
        assert_eq!(content.contains("(5/5)"), in_high);
    }
}

#[tokio::test]
async fn failed_source_is_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let good_url = "https://good.example/feed";
    let feeds = HashMap::from([(
        good_url.to_string(),
        vec![item("ok", "https://good.example/1", "marker-high fine", 1)],
    )]);
    let sources = vec![
        SourceSpec {
            source_type: SourceType::Blog,
            name: "Broken".to_string(),
            value: "https://broken.example/feed".to_string(),
        },
        SourceSpec {
            source_type: SourceType::Blog,
            name: "Good".to_string(),
            value: good_url.to_string(),
        },
    ];

    let config = test_config(dir.path().to_path_buf(), sources, vec![]);
    let summary = pipeline(config, feeds, Duration::ZERO, CancellationToken::new())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.sources_failed, 1);
    assert_eq!(summary.counts_by_source_type["Blog"], 1);

    let errors = std::fs::read_to_string(dir.path().join("20260730_120000/errors.log")).unwrap();
    assert!(errors.contains("Broken"));
    assert!(errors.contains("source"));
}

#[tokio::test]
async fn out_of_window_and_undated_items_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let feed_url = "https://acme.example/feed";
    let mut undated = item("undated", "https://acme.example/u", "marker-high x", 0);
    undated.published = None;
    let feeds = HashMap::from([(
        feed_url.to_string(),
        vec![
            item("fresh", "https://acme.example/1", "marker-high x", 1),
            item("stale", "https://acme.example/2", "marker-high x", 30),
            undated,
        ],
    )]);
    let sources = vec![SourceSpec {
        source_type: SourceType::Blog,
        name: "Acme Blog".to_string(),
        value: feed_url.to_string(),
    }];

    let config = test_config(dir.path().to_path_buf(), sources, vec![]);
    let summary = pipeline(config, feeds, Duration::ZERO, CancellationToken::new())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.counts_by_source_type["Blog"], 1);
}

#[tokio::test]
async fn enrichment_carries_corrected_transcript_into_markdown() {
    let dir = tempfile::tempdir().unwrap();
    let feed_url = "https://micro.example/feed";
    let feeds = HashMap::from([(
        feed_url.to_string(),
        vec![item(
            "math video",
            "https://micro.example/1",
            "marker-high A video about the Pythagorean theorem https://youtu.be/abc123",
            1,
        )],
    )]);
    let sources = vec![SourceSpec {
        source_type: SourceType::PublicAccount,
        name: "Math Account".to_string(),
        value: feed_url.to_string(),
    }];

    let config = test_config(dir.path().to_path_buf(), sources, vec![]);
    pipeline(config, feeds, Duration::ZERO, CancellationToken::new())
        .run()
        .await
        .unwrap();

    let files = collect_files(&dir.path().join("20260730_120000/By-Domain"));
    assert_eq!(files.len(), 1);
    let content = std::fs::read_to_string(&files[0]).unwrap();
    assert!(content.contains("[Video Transcript]"));
    assert!(content.contains("Pythagorean theorem"));
}

#[tokio::test]
async fn cancellation_still_emits_a_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let feed_url = "https://slow.example/feed";
    let feeds = HashMap::from([(
        feed_url.to_string(),
        vec![item("slow", "https://slow.example/1", "marker-high x", 1)],
    )]);
    let sources = vec![SourceSpec {
        source_type: SourceType::Blog,
        name: "Slow Blog".to_string(),
        value: feed_url.to_string(),
    }];

    let cancel = CancellationToken::new();
    let config = test_config(dir.path().to_path_buf(), sources, vec![]);
    // The feed takes 60s; cancellation fires long before it resolves.
    let run = pipeline(config, feeds, Duration::from_secs(60), cancel.clone()).run();

    let canceller = async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
    };

    let (summary, _) = tokio::join!(run, canceller);
    let summary = summary.unwrap();
    assert!(summary.cancelled);

    let manifest = read_manifest(&dir.path().join("20260730_120000"));
    assert!(manifest.cancelled);
}

#[tokio::test]
async fn every_fetched_post_is_written_or_logged() {
    // Sentinel safety: many posts across several sources, tiny pools,
    // nothing may vanish silently.
    let dir = tempfile::tempdir().unwrap();
    let mut feeds = HashMap::new();
    let mut sources = Vec::new();
    for s in 0..4 {
        let url = format!("https://s{s}.example/feed");
        feeds.insert(
            url.clone(),
            (0..10)
                .map(|i| {
                    item(
                        &format!("p{s}-{i}"),
                        &format!("https://s{s}.example/{i}"),
                        "marker-pending body",
                        1,
                    )
                })
                .collect(),
        );
        sources.push(SourceSpec {
            source_type: SourceType::Blog,
            name: format!("Source {s}"),
            value: url,
        });
    }

    let config = test_config(dir.path().to_path_buf(), sources, vec![]);
    let summary = pipeline(config, feeds, Duration::ZERO, CancellationToken::new())
        .run()
        .await
        .unwrap();

    let written: u64 = summary.counts_by_quality.values().sum();
    assert_eq!(written, 40);
    assert_eq!(summary.error_counts.values().sum::<u64>(), 0);
}
