//! Tweet records parsed from the timeline endpoint, plus the projection
//! into pipeline [`Post`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use prodscout_core::{Post, SourceType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
    Gif,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TweetMedia {
    pub kind: MediaKind,
    pub url: String,
    #[serde(default)]
    pub preview_url: String,
    #[serde(default)]
    pub alt_text: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tweet {
    pub id: String,
    /// Full text; expanded note-tweet body when present.
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
    pub user_id: String,
    pub username: String,
    pub display_name: String,

    pub reply_count: u64,
    pub retweet_count: u64,
    pub like_count: u64,
    pub view_count: u64,
    pub bookmark_count: u64,
    pub quote_count: u64,

    /// External URLs from entities, expanded and self-links removed.
    pub urls: Vec<String>,
    pub media: Vec<TweetMedia>,

    pub is_retweet: bool,
    pub is_quote: bool,
    pub quoted_tweet: Option<Box<Tweet>>,
    pub retweeted_tweet: Option<Box<Tweet>>,

    pub in_reply_to_id: Option<String>,
    pub in_reply_to_username: Option<String>,
    pub conversation_id: Option<String>,

    pub lang: String,
    /// Publishing client, stripped of its anchor markup.
    pub source: String,
}

impl Tweet {
    pub fn permalink(&self) -> String {
        format!("https://x.com/{}/status/{}", self.username, self.id)
    }

    /// True for replies a user posted under their own thread.
    pub fn is_self_reply(&self) -> bool {
        self.in_reply_to_id.is_some()
            && self.in_reply_to_username.as_deref() == Some(self.username.as_str())
    }

    /// Project into a pipeline post. Returns `None` when the tweet has no
    /// parseable creation date; the fetch window cannot be applied to it.
    pub fn to_post(&self, source_name: &str) -> Option<Post> {
        let date = self.created_at?.date_naive();

        let title = if self.is_retweet {
            match &self.retweeted_tweet {
                Some(original) => format!(
                    "RT @{}: {}",
                    original.username,
                    truncate_chars(&original.text, 80)
                ),
                None => truncate_chars(&self.text, 100),
            }
        } else if self.text.is_empty() {
            "(No text)".to_string()
        } else {
            truncate_chars(&self.text, 100)
        };

        let mut post = Post::new(
            title,
            date,
            self.permalink(),
            SourceType::Microblog,
            source_name,
            self.content_html(),
        );

        post.extra_urls = self.urls.clone();
        if let Some(quoted) = &self.quoted_tweet {
            for url in &quoted.urls {
                if !post.extra_urls.contains(url) {
                    post.extra_urls.push(url.clone());
                }
            }
        }

        Some(post)
    }

    /// HTML rendering of the tweet so downstream link extraction treats
    /// every source type uniformly.
    fn content_html(&self) -> String {
        let mut text = escape_html(&self.text);
        let mut trailing = Vec::new();

        for url in &self.urls {
            let escaped = escape_html(url);
            let anchor = format!("<a href=\"{escaped}\">{escaped}</a>");
            if text.contains(&escaped) {
                text = text.replace(&escaped, &anchor);
            } else {
                // Shortened in the body; keep the expanded form visible.
                trailing.push(anchor);
            }
        }

        let mut parts = vec![format!("<p>{text}</p>")];
        parts.extend(trailing);

        for media in &self.media {
            let url = escape_html(&media.url);
            match media.kind {
                MediaKind::Photo => parts.push(format!("<img src=\"{url}\" />")),
                MediaKind::Video | MediaKind::Gif => {
                    parts.push(format!("<video src=\"{url}\"></video>"))
                }
            }
        }

        if let Some(quoted) = &self.quoted_tweet {
            let permalink = escape_html(&quoted.permalink());
            parts.push(format!(
                "<blockquote><p><b>@{}</b>: {}</p><a href=\"{permalink}\">{permalink}</a></blockquote>",
                escape_html(&quoted.username),
                escape_html(&truncate_chars(&quoted.text, 200)),
            ));
        }

        parts.join("\n")
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dated_tweet() -> Tweet {
        Tweet {
            id: "100".to_string(),
            text: "Check https://blog.example/post out".to_string(),
            created_at: Some(Utc.with_ymd_and_hms(2026, 7, 30, 12, 0, 0).unwrap()),
            username: "acme".to_string(),
            user_id: "1".to_string(),
            urls: vec!["https://blog.example/post".to_string()],
            ..Tweet::default()
        }
    }

    #[test]
    fn to_post_fills_identity_fields() {
        let post = dated_tweet().to_post("X_Acme").unwrap();
        assert_eq!(post.source_type, SourceType::Microblog);
        assert_eq!(post.source_name, "X_Acme");
        assert_eq!(post.link, "https://x.com/acme/status/100");
        assert_eq!(post.date.to_string(), "2026-07-30");
        assert_eq!(post.extra_urls, vec!["https://blog.example/post"]);
        assert!(post.content.contains("<a href=\"https://blog.example/post\">"));
    }

    #[test]
    fn undated_tweet_projects_to_none() {
        let mut tweet = dated_tweet();
        tweet.created_at = None;
        assert!(tweet.to_post("X_Acme").is_none());
    }

    #[test]
    fn retweet_title_names_original_author() {
        let mut tweet = dated_tweet();
        tweet.is_retweet = true;
        tweet.retweeted_tweet = Some(Box::new(Tweet {
            username: "upstream".to_string(),
            text: "the original words".to_string(),
            ..Tweet::default()
        }));
        let post = tweet.to_post("X_Acme").unwrap();
        assert!(post.title.starts_with("RT @upstream: the original words"));
    }

    #[test]
    fn quoted_tweet_urls_merge_without_duplicates() {
        let mut tweet = dated_tweet();
        tweet.is_quote = true;
        tweet.quoted_tweet = Some(Box::new(Tweet {
            username: "other".to_string(),
            id: "99".to_string(),
            urls: vec![
                "https://blog.example/post".to_string(),
                "https://docs.example/page".to_string(),
            ],
            ..Tweet::default()
        }));
        let post = tweet.to_post("X_Acme").unwrap();
        assert_eq!(
            post.extra_urls,
            vec!["https://blog.example/post", "https://docs.example/page"]
        );
    }

    #[test]
    fn html_escapes_markup_in_text() {
        let mut tweet = dated_tweet();
        tweet.text = "a < b & c".to_string();
        tweet.urls.clear();
        let post = tweet.to_post("X_Acme").unwrap();
        assert!(post.content.contains("a &lt; b &amp; c"));
    }

    #[test]
    fn self_reply_detection_compares_usernames() {
        let mut tweet = dated_tweet();
        tweet.in_reply_to_id = Some("42".to_string());
        tweet.in_reply_to_username = Some("acme".to_string());
        assert!(tweet.is_self_reply());

        tweet.in_reply_to_username = Some("someone_else".to_string());
        assert!(!tweet.is_self_reply());
    }
}
