//! Parser for the deeply nested timeline GraphQL responses.
//!
//! Flattens `data.user.result.timeline_v2.timeline.instructions[]` into
//! [`Tweet`] records plus the bottom pagination cursor. Pinned tweets can
//! also appear in the main feed, so every page is de-duplicated by id.

use std::collections::HashSet;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::{MediaKind, Tweet, TweetMedia};

/// Platform timestamp shape: `Mon Feb 10 12:34:56 +0000 2026`.
const TWITTER_DATE_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

pub struct TimelineParser;

impl TimelineParser {
    /// Extract the numeric user id from a `UserByScreenName` response.
    pub fn parse_user_id(response: &Value) -> Option<String> {
        let result = response.pointer("/data/user/result")?;
        if result.get("__typename").and_then(Value::as_str) == Some("UserUnavailable") {
            warn!("User unavailable (suspended or protected)");
            return None;
        }
        result
            .get("rest_id")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Parse one timeline page into `(tweets, next_cursor)`.
    pub fn parse_timeline(response: &Value) -> (Vec<Tweet>, Option<String>) {
        let mut tweets = Vec::new();
        let mut next_cursor = None;
        let mut seen_ids: HashSet<String> = HashSet::new();

        let instructions = response
            .pointer("/data/user/result/timeline_v2/timeline/instructions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for instruction in &instructions {
            match instruction.get("type").and_then(Value::as_str).unwrap_or("") {
                "TimelineAddEntries" => {
                    let entries = instruction
                        .get("entries")
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default();
                    for entry in &entries {
                        let entry_id = entry.get("entryId").and_then(Value::as_str).unwrap_or("");

                        if entry_id.starts_with("tweet-") {
                            if let Some(tweet) = Self::parse_tweet_entry(entry) {
                                if seen_ids.insert(tweet.id.clone()) {
                                    tweets.push(tweet);
                                }
                            }
                        } else if entry_id.starts_with("cursor-bottom-") {
                            if let Some(value) =
                                entry.pointer("/content/value").and_then(Value::as_str)
                            {
                                if !value.is_empty() {
                                    next_cursor = Some(value.to_string());
                                }
                            }
                        } else if entry_id.starts_with("profile-conversation-")
                            || entry_id.starts_with("homeConversation-")
                        {
                            for tweet in Self::parse_module_entry(entry) {
                                if seen_ids.insert(tweet.id.clone()) {
                                    tweets.push(tweet);
                                }
                            }
                        }
                    }
                }
                "TimelinePinEntry" => {
                    if let Some(tweet) = instruction.get("entry").and_then(Self::parse_tweet_entry)
                    {
                        if seen_ids.insert(tweet.id.clone()) {
                            tweets.push(tweet);
                        }
                    }
                }
                _ => {}
            }
        }

        (tweets, next_cursor)
    }

    fn parse_tweet_entry(entry: &Value) -> Option<Tweet> {
        let item_content = entry.pointer("/content/itemContent")?;
        if item_content.get("promotedMetadata").is_some() {
            return None;
        }
        let result = item_content.pointer("/tweet_results/result")?;
        Self::parse_tweet_result(result)
    }

    /// Thread modules carry several tweets per entry.
    fn parse_module_entry(entry: &Value) -> Vec<Tweet> {
        let Some(items) = entry.pointer("/content/items").and_then(Value::as_array) else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|item| {
                let result = item.pointer("/item/itemContent/tweet_results/result")?;
                Self::parse_tweet_result(result)
            })
            .collect()
    }

    fn parse_tweet_result(result: &Value) -> Option<Tweet> {
        if result.is_null() {
            return None;
        }

        let typename = result.get("__typename").and_then(Value::as_str).unwrap_or("");
        if matches!(typename, "TweetTombstone" | "TweetUnavailable") {
            return None;
        }
        // Visibility wrappers nest the real tweet one level down.
        let result = if typename == "TweetWithVisibilityResults" {
            result.get("tweet")?
        } else {
            result
        };

        let legacy = result.get("legacy")?;
        if !legacy.is_object() {
            return None;
        }

        let id = legacy
            .get("id_str")
            .and_then(Value::as_str)
            .or_else(|| result.get("rest_id").and_then(Value::as_str))
            .unwrap_or("")
            .to_string();
        if id.is_empty() {
            debug!("Skipping tweet entry without an id");
            return None;
        }

        let user_result = result.pointer("/core/user_results/result");
        let user_legacy = user_result.and_then(|u| u.get("legacy"));

        let mut tweet = Tweet {
            id,
            text: Self::extract_full_text(result, legacy),
            created_at: Self::parse_date(legacy.get("created_at").and_then(Value::as_str)),
            user_id: user_result
                .and_then(|u| u.get("rest_id"))
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            username: user_legacy
                .and_then(|u| u.get("screen_name"))
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            display_name: user_legacy
                .and_then(|u| u.get("name"))
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            reply_count: count(legacy, "reply_count"),
            retweet_count: count(legacy, "retweet_count"),
            like_count: count(legacy, "favorite_count"),
            quote_count: count(legacy, "quote_count"),
            bookmark_count: count(legacy, "bookmark_count"),
            view_count: result
                .pointer("/views/count")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            in_reply_to_id: str_field(legacy, "in_reply_to_status_id_str"),
            in_reply_to_username: str_field(legacy, "in_reply_to_screen_name"),
            conversation_id: str_field(legacy, "conversation_id_str"),
            lang: legacy
                .get("lang")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            source: Self::clean_source(result.get("source").and_then(Value::as_str).unwrap_or("")),
            ..Tweet::default()
        };

        tweet.urls = Self::extract_urls(legacy);
        tweet.media = Self::extract_media(legacy);

        if let Some(retweeted) = legacy.pointer("/retweeted_status_result/result") {
            tweet.is_retweet = true;
            tweet.retweeted_tweet = Self::parse_tweet_result(retweeted).map(Box::new);
        }

        if let Some(quoted) = result.pointer("/quoted_status_result/result") {
            tweet.is_quote = true;
            tweet.quoted_tweet = Self::parse_tweet_result(quoted).map(Box::new);
        }

        Some(tweet)
    }

    /// Prefer the long-form note tweet body over the truncated full_text.
    fn extract_full_text(result: &Value, legacy: &Value) -> String {
        if let Some(note_text) = result
            .pointer("/note_tweet/note_tweet_results/result/text")
            .and_then(Value::as_str)
        {
            if !note_text.is_empty() {
                return note_text.to_string();
            }
        }
        legacy
            .get("full_text")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string()
    }

    fn parse_date(raw: Option<&str>) -> Option<DateTime<Utc>> {
        let raw = raw?;
        match DateTime::parse_from_str(raw, TWITTER_DATE_FORMAT) {
            Ok(dt) => Some(dt.with_timezone(&Utc)),
            Err(_) => {
                debug!(raw, "Unparseable tweet date");
                None
            }
        }
    }

    /// The `source` field is an HTML anchor, e.g.
    /// `<a href="..." rel="nofollow">Twitter Web App</a>`.
    fn clean_source(source_html: &str) -> String {
        if source_html.is_empty() {
            return String::new();
        }
        static ANCHOR: OnceLock<Regex> = OnceLock::new();
        let re = ANCHOR.get_or_init(|| Regex::new(r">(.+?)</a>").expect("anchor regex"));
        re.captures(source_html)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| source_html.to_string())
    }

    /// Expanded external URLs from entities, minus the tweet's own status
    /// link.
    fn extract_urls(legacy: &Value) -> Vec<String> {
        let own_id = legacy.get("id_str").and_then(Value::as_str).unwrap_or("");
        let Some(entities) = legacy.pointer("/entities/urls").and_then(Value::as_array) else {
            return Vec::new();
        };

        entities
            .iter()
            .filter_map(|e| e.get("expanded_url").and_then(Value::as_str))
            .filter(|expanded| {
                if expanded.contains("/status/")
                    && (expanded.contains("x.com") || expanded.contains("twitter.com"))
                {
                    let linked_id = expanded
                        .split("/status/")
                        .next_back()
                        .unwrap_or("")
                        .split('?')
                        .next()
                        .unwrap_or("");
                    linked_id != own_id
                } else {
                    true
                }
            })
            .map(str::to_string)
            .collect()
    }

    fn extract_media(legacy: &Value) -> Vec<TweetMedia> {
        let Some(items) = legacy
            .pointer("/extended_entities/media")
            .and_then(Value::as_array)
        else {
            return Vec::new();
        };

        items
            .iter()
            .filter_map(|item| {
                let kind = match item.get("type").and_then(Value::as_str)? {
                    "photo" => MediaKind::Photo,
                    "video" => MediaKind::Video,
                    "animated_gif" => MediaKind::Gif,
                    _ => return None,
                };

                let preview = item
                    .get("media_url_https")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();

                let (url, duration_ms) = match kind {
                    MediaKind::Photo => (preview.clone(), 0),
                    MediaKind::Video | MediaKind::Gif => {
                        let variants = item
                            .pointer("/video_info/variants")
                            .and_then(Value::as_array)
                            .cloned()
                            .unwrap_or_default();
                        let best = variants
                            .iter()
                            .filter(|v| {
                                v.get("content_type").and_then(Value::as_str)
                                    == Some("video/mp4")
                            })
                            .max_by_key(|v| {
                                v.get("bitrate").and_then(Value::as_u64).unwrap_or(0)
                            })
                            .and_then(|v| v.get("url").and_then(Value::as_str))
                            .unwrap_or("")
                            .to_string();
                        let duration = item
                            .pointer("/video_info/duration_millis")
                            .and_then(Value::as_u64)
                            .unwrap_or(0);
                        (best, duration)
                    }
                };

                Some(TweetMedia {
                    kind,
                    url,
                    preview_url: preview,
                    alt_text: item
                        .get("ext_alt_text")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string(),
                    width: item
                        .pointer("/original_info/width")
                        .and_then(Value::as_u64)
                        .unwrap_or(0) as u32,
                    height: item
                        .pointer("/original_info/height")
                        .and_then(Value::as_u64)
                        .unwrap_or(0) as u32,
                    duration_ms,
                })
            })
            .collect()
    }
}

fn count(legacy: &Value, key: &str) -> u64 {
    legacy.get(key).and_then(Value::as_u64).unwrap_or(0)
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
