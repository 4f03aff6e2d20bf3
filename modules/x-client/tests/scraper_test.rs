//! End-to-end scraper tests against a fake transport.
//!
//! Each test hand-crafts timeline GraphQL pages, scripts the transport's
//! responses, and asserts on pagination, rotation, and breaker behavior.
//! No network, no impersonation layer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};

use x_client::{
    CredentialPool, TimelineParser, WireResponse, XClient, XClientError, XClientOptions, XScraper,
    XScraperOptions, XTransport,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn tweet_date(days_ago: i64) -> String {
    (Utc::now() - ChronoDuration::days(days_ago))
        .format("%a %b %d %H:%M:%S +0000 %Y")
        .to_string()
}

fn tweet_result(id: &str, days_ago: i64, text: &str) -> Value {
    json!({
        "__typename": "Tweet",
        "rest_id": id,
        "core": {
            "user_results": {
                "result": {
                    "rest_id": "777",
                    "legacy": { "screen_name": "acme", "name": "Acme" }
                }
            }
        },
        "legacy": {
            "id_str": id,
            "full_text": text,
            "created_at": tweet_date(days_ago),
            "reply_count": 1,
            "retweet_count": 2,
            "favorite_count": 3,
            "entities": { "urls": [] }
        }
    })
}

fn tweet_entry(id: &str, days_ago: i64, text: &str) -> Value {
    json!({
        "entryId": format!("tweet-{id}"),
        "content": {
            "itemContent": {
                "tweet_results": { "result": tweet_result(id, days_ago, text) }
            }
        }
    })
}

fn cursor_entry(value: &str) -> Value {
    json!({
        "entryId": format!("cursor-bottom-{value}"),
        "content": { "value": value, "cursorType": "Bottom" }
    })
}

fn timeline_page(entries: Vec<Value>, pinned: Option<Value>) -> Value {
    let mut instructions = vec![json!({
        "type": "TimelineAddEntries",
        "entries": entries
    })];
    if let Some(pin) = pinned {
        instructions.push(json!({ "type": "TimelinePinEntry", "entry": pin }));
    }
    json!({
        "data": {
            "user": {
                "result": {
                    "timeline_v2": { "timeline": { "instructions": instructions } }
                }
            }
        }
    })
}

fn user_lookup_response() -> Value {
    json!({ "data": { "user": { "result": { "rest_id": "777" } } } })
}

fn ok(body: Value) -> WireResponse {
    WireResponse {
        status: 200,
        retry_after: None,
        body: body.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Fake transport
// ---------------------------------------------------------------------------

/// Scripted transport: a queue of timeline responses, the user lookup
/// served from a fixed body, and optional per-auth-token overrides that
/// take precedence (for rotation tests).
struct FakeTransport {
    lookup: Value,
    pages: Mutex<Vec<WireResponse>>,
    by_token: HashMap<String, WireResponse>,
    requests: Mutex<Vec<String>>,
}

impl FakeTransport {
    fn new(pages: Vec<WireResponse>) -> Self {
        Self {
            lookup: user_lookup_response(),
            pages: Mutex::new(pages),
            by_token: HashMap::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn with_token_response(mut self, auth_token: &str, response: WireResponse) -> Self {
        self.by_token.insert(auth_token.to_string(), response);
        self
    }
}

#[async_trait]
impl XTransport for FakeTransport {
    async fn get(
        &self,
        url: &str,
        _query: &[(String, String)],
        _headers: &[(String, String)],
        cookie: &str,
    ) -> Result<WireResponse, XClientError> {
        self.requests.lock().unwrap().push(cookie.to_string());

        for (token, response) in &self.by_token {
            if cookie.contains(&format!("auth_token={token};")) {
                return Ok(response.clone());
            }
        }
        if url.contains("UserByScreenName") {
            return Ok(ok(self.lookup.clone()));
        }
        let mut pages = self.pages.lock().unwrap();
        if pages.is_empty() {
            Ok(ok(timeline_page(vec![], None)))
        } else {
            Ok(pages.remove(0))
        }
    }
}

fn pool(n: usize) -> Arc<CredentialPool> {
    Arc::new(
        CredentialPool::new(
            (0..n)
                .map(|i| (format!("token{i}"), format!("csrf{i}")))
                .collect(),
        )
        .unwrap(),
    )
}

fn scraper(transport: FakeTransport, credentials: usize) -> XScraper {
    let client = XClient::new(pool(credentials), Arc::new(transport), XClientOptions::default());
    XScraper::new(
        client,
        XScraperOptions {
            max_tweets_per_user: 20,
            request_delay: (0.0, 0.0),
            user_switch_delay: (0.0, 0.0),
            include_retweets: false,
            include_replies: false,
        },
    )
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

#[tokio::test]
async fn old_page_short_circuits_by_date() {
    // Page 1: 10 tweets from today, cursor C. Page 2: 10 tweets from 10
    // days ago. With a 7-day window only page 1 survives.
    let page1 = timeline_page(
        (0..10)
            .map(|i| tweet_entry(&format!("1{i:02}"), 0, "fresh"))
            .chain(std::iter::once(cursor_entry("C")))
            .collect(),
        None,
    );
    let page2 = timeline_page(
        (0..10)
            .map(|i| tweet_entry(&format!("2{i:02}"), 10, "stale"))
            .collect(),
        None,
    );

    let scraper = scraper(FakeTransport::new(vec![ok(page1), ok(page2)]), 1);
    let posts = scraper.fetch_user_posts("acme", "X_Acme", 7).await.unwrap();

    assert_eq!(posts.len(), 10);
    assert!(posts.iter().all(|p| p.source_name == "X_Acme"));
}

#[tokio::test]
async fn retweet_only_page_does_not_stop_pagination() {
    // A page of fresh retweets adds nothing but must keep paginating:
    // termination is decided on dates alone.
    let mut retweet = tweet_result("500", 0, "RT body");
    retweet["legacy"]["retweeted_status_result"] =
        json!({ "result": tweet_result("400", 0, "original") });
    let rt_entry = json!({
        "entryId": "tweet-500",
        "content": { "itemContent": { "tweet_results": { "result": retweet } } }
    });

    let page1 = timeline_page(vec![rt_entry, cursor_entry("C")], None);
    let page2 = timeline_page(vec![tweet_entry("600", 0, "plain tweet")], None);

    let scraper = scraper(FakeTransport::new(vec![ok(page1), ok(page2)]), 1);
    let tweets = scraper
        .fetch_user_tweets("acme", 20, Some(Utc::now() - ChronoDuration::days(7)))
        .await
        .unwrap();

    assert_eq!(tweets.len(), 1);
    assert_eq!(tweets[0].id, "600");
}

#[tokio::test]
async fn pinned_tweet_deduplicated_against_feed() {
    let page = timeline_page(
        vec![tweet_entry("42", 0, "pinned and listed")],
        Some(tweet_entry("42", 0, "pinned and listed")),
    );

    let scraper = scraper(FakeTransport::new(vec![ok(page)]), 1);
    let tweets = scraper.fetch_user_tweets("acme", 20, None).await.unwrap();

    assert_eq!(tweets.len(), 1);
    assert_eq!(tweets[0].id, "42");
}

#[tokio::test]
async fn repeated_cursor_stops_pagination() {
    let page = |ids: std::ops::Range<u32>| {
        timeline_page(
            ids.map(|i| tweet_entry(&i.to_string(), 0, "t"))
                .chain(std::iter::once(cursor_entry("LOOP")))
                .collect(),
            None,
        )
    };

    let scraper = scraper(FakeTransport::new(vec![ok(page(0..5)), ok(page(5..10))]), 1);
    let tweets = scraper.fetch_user_tweets("acme", 100, None).await.unwrap();

    // Second page re-announces cursor LOOP; the loop guard stops there.
    assert_eq!(tweets.len(), 10);
}

#[test]
fn parser_is_idempotent() {
    let page = timeline_page(
        vec![
            tweet_entry("1", 0, "a"),
            tweet_entry("2", 1, "b"),
            cursor_entry("NEXT"),
        ],
        Some(tweet_entry("1", 0, "a")),
    );

    let (first_tweets, first_cursor) = TimelineParser::parse_timeline(&page);
    let (second_tweets, second_cursor) = TimelineParser::parse_timeline(&page);

    assert_eq!(first_cursor, second_cursor);
    assert_eq!(
        first_tweets.iter().map(|t| &t.id).collect::<Vec<_>>(),
        second_tweets.iter().map(|t| &t.id).collect::<Vec<_>>()
    );
}

// ---------------------------------------------------------------------------
// Reply filtering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn self_replies_survive_reply_exclusion() {
    let mut self_reply = tweet_result("2", 0, "thread continues");
    self_reply["legacy"]["in_reply_to_status_id_str"] = json!("1");
    self_reply["legacy"]["in_reply_to_screen_name"] = json!("acme");
    let mut other_reply = tweet_result("3", 0, "replying to someone");
    other_reply["legacy"]["in_reply_to_status_id_str"] = json!("9");
    other_reply["legacy"]["in_reply_to_screen_name"] = json!("stranger");

    let entries = vec![
        tweet_entry("1", 0, "thread root"),
        json!({
            "entryId": "tweet-2",
            "content": { "itemContent": { "tweet_results": { "result": self_reply } } }
        }),
        json!({
            "entryId": "tweet-3",
            "content": { "itemContent": { "tweet_results": { "result": other_reply } } }
        }),
    ];

    let scraper = scraper(FakeTransport::new(vec![ok(timeline_page(entries, None))]), 1);
    let tweets = scraper.fetch_user_tweets("acme", 20, None).await.unwrap();

    let ids: Vec<&str> = tweets.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2"]);
}

// ---------------------------------------------------------------------------
// Credential rotation and the breaker
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rate_limited_credential_rotates_to_healthy_one() {
    let transport = FakeTransport::new(vec![ok(timeline_page(
        vec![tweet_entry("1", 0, "hello")],
        None,
    ))])
    .with_token_response(
        "token0",
        WireResponse {
            status: 429,
            retry_after: Some("60".to_string()),
            body: String::new(),
        },
    );

    let scraper = scraper(transport, 2);
    let tweets = scraper.fetch_user_tweets("acme", 20, None).await.unwrap();
    assert_eq!(tweets.len(), 1);

    let status = scraper.client().pool().status();
    let limited = &status[0];
    assert_eq!(limited.state, "cooling");
    assert!(limited.cooldown_remaining_s > 0 && limited.cooldown_remaining_s <= 60);
    assert!(status[1].request_count >= 1);
}

#[tokio::test(start_paused = true)]
async fn consecutive_server_errors_open_the_breaker() {
    let server_error = WireResponse {
        status: 500,
        retry_after: None,
        body: "boom".to_string(),
    };
    let transport = FakeTransport::new(vec![])
        .with_token_response("token0", server_error.clone())
        .with_token_response("token1", server_error);

    let client = XClient::new(
        pool(2),
        Arc::new(transport),
        XClientOptions {
            max_retries: 3,
            circuit_breaker_threshold: 5,
            circuit_breaker_cooldown: Duration::from_secs(60),
            ..XClientOptions::default()
        },
    );
    let scraper = XScraper::new(
        client,
        XScraperOptions {
            request_delay: (0.0, 0.0),
            user_switch_delay: (0.0, 0.0),
            ..XScraperOptions::default()
        },
    );

    // 3 failed attempts per call; the second call crosses the threshold.
    let first = scraper.fetch_user_tweets("acme", 20, None).await;
    assert!(matches!(first, Err(XClientError::Api { status: 500, .. })));

    let second = scraper.fetch_user_tweets("acme", 20, None).await;
    assert!(matches!(second, Err(XClientError::CircuitOpen)));
}

#[tokio::test]
async fn batch_continues_after_single_user_failure() {
    // User lookup succeeds; the timeline page for the first user is a
    // business error, the second user's page is fine.
    let business_error = WireResponse {
        status: 200,
        retry_after: None,
        body: json!({ "errors": [{ "code": 17, "message": "broken" }] }).to_string(),
    };
    let transport = FakeTransport::new(vec![
        business_error.clone(),
        business_error.clone(),
        business_error,
        ok(timeline_page(vec![tweet_entry("1", 0, "fine")], None)),
    ]);

    let scraper = scraper(transport, 1);
    let accounts = vec![
        ("X_Bad".to_string(), "bad".to_string()),
        ("X_Good".to_string(), "good".to_string()),
    ];
    let results = scraper.fetch_all(&accounts, 7).await;

    assert_eq!(results.len(), 2);
    assert!(results[0].1.is_err());
    assert_eq!(results[1].1.as_ref().unwrap().len(), 1);
}
