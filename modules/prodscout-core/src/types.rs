use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Where a post came from. Determines fetch scheduling (microblog sources
/// run on the restricted serial pool) and the self-link filter applied
/// during enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceType {
    Microblog,
    PublicAccount,
    Video,
    Blog,
}

impl SourceType {
    pub const ALL: [SourceType; 4] = [
        SourceType::Microblog,
        SourceType::PublicAccount,
        SourceType::Video,
        SourceType::Blog,
    ];

    /// Config section holding this source type's account catalog.
    pub fn accounts_section(&self) -> &'static str {
        match self {
            SourceType::Microblog => "microblog_accounts",
            SourceType::PublicAccount => "public_accounts",
            SourceType::Video => "video_accounts",
            SourceType::Blog => "blog_accounts",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SourceType::Microblog => "Microblog",
            SourceType::PublicAccount => "PublicAccount",
            SourceType::Video => "Video",
            SourceType::Blog => "Blog",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One configured source: display name plus either a feed URL or an
/// account handle (microblog direct scraping).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    pub source_type: SourceType,
    pub name: String,
    pub value: String,
}

/// The unit flowing through all pipeline queues.
///
/// Field ownership follows the stage order: the fetcher populates identity
/// and raw content, the enricher appends resolved link/video material, the
/// organizer fills the classification fields, the writer derives the file
/// identity. Unknown fields at ingress are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Post {
    pub title: String,
    pub date: NaiveDate,
    pub link: String,
    pub source_type: SourceType,
    pub source_name: String,
    pub content: String,

    #[serde(default)]
    pub extra_urls: Vec<String>,
    #[serde(default)]
    pub extra_content: String,

    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub quality_score: u8,
    #[serde(default)]
    pub quality_reason: String,
    #[serde(default)]
    pub key_info: Vec<String>,
    #[serde(default)]
    pub detail: String,
}

impl Post {
    pub fn new(
        title: impl Into<String>,
        date: NaiveDate,
        link: impl Into<String>,
        source_type: SourceType,
        source_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            date,
            link: link.into(),
            source_type,
            source_name: source_name.into(),
            content: content.into(),
            extra_urls: Vec::new(),
            extra_content: String::new(),
            event: String::new(),
            category: String::new(),
            domain: String::new(),
            quality_score: 0,
            quality_reason: String::new(),
            key_info: Vec::new(),
            detail: String::new(),
        }
    }

    pub fn bucket(&self) -> Bucket {
        Bucket::from_score(self.quality_score)
    }

    /// Apply the organizer's classification onto this post.
    pub fn set_organized(&mut self, fields: OrganizedFields) {
        self.event = fields.event;
        self.category = fields.category;
        self.domain = fields.domain;
        self.quality_score = fields.quality_score;
        self.quality_reason = fields.quality_reason;
        self.key_info = fields.key_info;
        self.detail = fields.detail;
    }
}

/// Quality bucket derived from the organizer's score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    High,
    Pending,
    Excluded,
}

impl Bucket {
    pub fn from_score(score: u8) -> Self {
        match score {
            s if s >= 4 => Bucket::High,
            2 | 3 => Bucket::Pending,
            _ => Bucket::Excluded,
        }
    }

    pub fn dir_name(&self) -> &'static str {
        match self {
            Bucket::High => "high",
            Bucket::Pending => "pending",
            Bucket::Excluded => "excluded",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Structured output of the single organizer LLM call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrganizedFields {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub quality_score: u8,
    #[serde(default)]
    pub quality_reason: String,
    #[serde(default)]
    pub key_info: Vec<String>,
    #[serde(default)]
    pub detail: String,
}

/// A tracked organization or person. Posts mentioning any alias are filed
/// under `By-Entity/<name>/` in addition to their domain directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub aliases: Vec<String>,
}

impl Entity {
    /// Case-insensitive substring match against any alias.
    pub fn matches(&self, text: &str) -> bool {
        let haystack = text.to_lowercase();
        self.aliases
            .iter()
            .any(|alias| !alias.is_empty() && haystack.contains(&alias.to_lowercase()))
    }
}

/// Final manifest written by the writer as its last act.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchManifest {
    pub batch_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub cancelled: bool,
    pub counts_by_source_type: BTreeMap<String, u64>,
    pub counts_by_bucket: BTreeMap<String, u64>,
    pub counts_by_domain: BTreeMap<String, u64>,
    pub counts_by_entity: BTreeMap<String, u64>,
}

/// Pointer file at `data/latest_batch.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestBatch {
    pub batch_id: String,
    pub path: String,
}

/// Returned by the coordinator after a full run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub batch_id: String,
    pub counts_by_source_type: BTreeMap<String, u64>,
    pub counts_by_quality: BTreeMap<String, u64>,
    pub elapsed: std::time::Duration,
    pub cancelled: bool,
    pub sources_total: usize,
    pub sources_failed: usize,
    pub error_counts: BTreeMap<crate::error::ErrorKind, u64>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total: u64 = self.counts_by_quality.values().sum();
        write!(
            f,
            "batch {}: {} posts written in {:.1}s ({} sources, {} failed)",
            self.batch_id,
            total,
            self.elapsed.as_secs_f64(),
            self.sources_total,
            self.sources_failed,
        )
    }
}
