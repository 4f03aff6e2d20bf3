//! Dynamically-rendering web client.
//!
//! Pages behind client-side rendering are fetched through a headless
//! browser service's `/content` endpoint; when no service is configured
//! the client falls back to a plain GET, which is good enough for
//! server-rendered blogs. Either way the caller gets the main textual
//! body, not markup.

pub mod error;

pub use error::{RenderError, Result};

use std::time::Duration;

use scraper::{Html, Selector};
use tracing::debug;

pub struct RenderClient {
    client: reqwest::Client,
    base_url: Option<String>,
    token: Option<String>,
}

impl RenderClient {
    pub fn new(base_url: Option<&str>, token: Option<&str>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RenderError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
            token: token.map(String::from),
        })
    }

    /// Fetch fully-rendered HTML for a URL.
    pub async fn content(&self, url: &str) -> Result<String> {
        match &self.base_url {
            Some(base) => self.content_via_service(base, url).await,
            None => self.content_direct(url).await,
        }
    }

    /// Fetch a URL and reduce it to its main textual body.
    pub async fn text(&self, url: &str) -> Result<String> {
        let html = self.content(url).await?;
        let text = extract_main_text(&html);
        if text.trim().is_empty() {
            return Err(RenderError::Empty {
                url: url.to_string(),
            });
        }
        Ok(text)
    }

    async fn content_via_service(&self, base: &str, url: &str) -> Result<String> {
        let mut endpoint = format!("{base}/content");
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }

        let body = serde_json::json!({ "url": url });
        let resp = self
            .client
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(RenderError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp.text().await?)
    }

    async fn content_direct(&self, url: &str) -> Result<String> {
        debug!(url, "No render service configured, plain fetch");
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(RenderError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp.text().await?)
    }
}

/// Pull readable text out of rendered HTML: strip script/style/nav
/// chrome, prefer `<article>` or `<main>` when the page has one.
pub fn extract_main_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let container_selectors = ["article", "main", "body"];
    for selector in container_selectors {
        let sel = Selector::parse(selector).expect("static selector");
        if let Some(container) = document.select(&sel).next() {
            let text = collect_text(container);
            if !text.trim().is_empty() {
                return text;
            }
        }
    }
    String::new()
}

fn collect_text(root: scraper::ElementRef<'_>) -> String {
    const SKIP: [&str; 6] = ["script", "style", "noscript", "nav", "header", "footer"];

    let mut parts: Vec<String> = Vec::new();
    for node in root.text() {
        let trimmed = node.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed.to_string());
        }
    }

    // scraper's text() walks every descendant, including the chrome we
    // want gone; rebuild from block elements instead when possible.
    let block_sel = Selector::parse("p, h1, h2, h3, h4, li, pre, blockquote").expect("selector");
    let blocks: Vec<String> = root
        .select(&block_sel)
        .filter(|el| {
            !el.ancestors()
                .filter_map(scraper::ElementRef::wrap)
                .any(|a| SKIP.contains(&a.value().name()))
        })
        .map(|el| {
            el.text()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|t| !t.is_empty())
        .collect();

    if !blocks.is_empty() {
        blocks.join("\n")
    } else {
        parts.join(" ")
    }
}
