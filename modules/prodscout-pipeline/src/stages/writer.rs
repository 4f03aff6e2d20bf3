//! Writer stage: canonical on-disk layout, running statistics, and the
//! batch manifest.
//!
//! Single-threaded by design; serializing writes keeps the directory
//! tree consistent without locks.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use prodscout_core::{BatchManifest, Entity, ErrorKind, ErrorLog, LatestBatch, Post};

use crate::queue::SharedReceiver;

/// Unmatched posts are grouped here in the entity view, and posts the
/// organizer left without a domain fall back to the same name in the
/// domain view.
const OTHERS: &str = "Others";

#[derive(Debug, Default, Clone)]
pub struct WriterReport {
    pub written: u64,
    pub counts_by_source_type: BTreeMap<String, u64>,
    pub counts_by_bucket: BTreeMap<String, u64>,
    pub counts_by_domain: BTreeMap<String, u64>,
    pub counts_by_entity: BTreeMap<String, u64>,
    pub cancelled: bool,
}

pub struct WriterStage {
    data_dir: PathBuf,
    batch_dir: PathBuf,
    batch_id: String,
    started_at: DateTime<Utc>,
    entities: Vec<Entity>,
    errlog: ErrorLog,
}

impl WriterStage {
    pub fn new(
        data_dir: PathBuf,
        batch_id: String,
        started_at: DateTime<Utc>,
        entities: Vec<Entity>,
        errlog: ErrorLog,
    ) -> Self {
        let batch_dir = data_dir.join(&batch_id);
        Self {
            data_dir,
            batch_dir,
            batch_id,
            started_at,
            entities,
            errlog,
        }
    }

    /// Consume until the sentinel (or cancellation), then emit the batch
    /// manifest as the last act.
    pub async fn run(self, rx: SharedReceiver, cancel: CancellationToken) -> WriterReport {
        let mut report = WriterReport::default();
        let mut written_paths: HashSet<PathBuf> = HashSet::new();

        loop {
            let slot = tokio::select! {
                _ = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                slot = rx.recv() => slot,
            };
            let Some(post) = slot else { break };
            self.write_post(&post, &mut report, &mut written_paths).await;
        }

        if cancel.is_cancelled() {
            report.cancelled = true;
        }
        self.finalize(&mut report).await;
        report
    }

    async fn write_post(
        &self,
        post: &Post,
        report: &mut WriterReport,
        written_paths: &mut HashSet<PathBuf>,
    ) {
        let content_hash = link_hash(&post.link);
        let domain = if post.domain.is_empty() {
            OTHERS.to_string()
        } else {
            post.domain.clone()
        };
        let bucket = post.bucket();
        let filename = format!(
            "{}_{}_{}.md",
            sanitize(&post.source_name),
            post.date,
            content_hash
        );

        let domain_path = self
            .batch_dir
            .join("By-Domain")
            .join(sanitize(&domain))
            .join(bucket.dir_name())
            .join(&filename);
        if !written_paths.insert(domain_path.clone()) {
            warn!(path = %domain_path.display(), "Duplicate post path, skipping");
            return;
        }

        let markdown = render_markdown(post, &domain);
        if !self.persist(&domain_path, &markdown).await {
            return;
        }

        // Entity view: substring match over content, enrichment, and the
        // source label; the unmatched go under Others regardless of
        // bucket.
        let matched: Vec<&Entity> = self
            .entities
            .iter()
            .filter(|e| {
                e.matches(&post.content)
                    || e.matches(&post.extra_content)
                    || e.matches(&post.source_name)
            })
            .collect();

        let entity_names: Vec<String> = if matched.is_empty() {
            vec![OTHERS.to_string()]
        } else {
            matched.iter().map(|e| e.name.clone()).collect()
        };

        for name in &entity_names {
            let entity_path = self
                .batch_dir
                .join("By-Entity")
                .join(sanitize(name))
                .join(&filename);
            if written_paths.insert(entity_path.clone()) {
                self.persist(&entity_path, &markdown).await;
            }
            *report.counts_by_entity.entry(name.clone()).or_insert(0) += 1;
        }

        report.written += 1;
        *report
            .counts_by_source_type
            .entry(post.source_type.label().to_string())
            .or_insert(0) += 1;
        *report
            .counts_by_bucket
            .entry(bucket.dir_name().to_string())
            .or_insert(0) += 1;
        *report.counts_by_domain.entry(domain).or_insert(0) += 1;

        info!(
            bucket = bucket.dir_name(),
            file = %filename,
            source = %post.source_name,
            "Post written"
        );
    }

    /// One retry on a failed write; a second failure drops the post and
    /// logs it.
    async fn persist(&self, path: &Path, markdown: &str) -> bool {
        for attempt in 0..2 {
            if let Some(parent) = path.parent() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    warn!(attempt, error = %e, "Cannot create output directory");
                    continue;
                }
            }
            match tokio::fs::write(path, markdown).await {
                Ok(()) => return true,
                Err(e) if attempt == 0 => {
                    warn!(path = %path.display(), error = %e, "Write failed, retrying once")
                }
                Err(e) => {
                    self.errlog.record(
                        "writer",
                        path.to_string_lossy().as_ref(),
                        ErrorKind::Write,
                        e.to_string(),
                    );
                    return false;
                }
            }
        }
        false
    }

    async fn finalize(&self, report: &mut WriterReport) {
        let manifest = BatchManifest {
            batch_id: self.batch_id.clone(),
            started_at: self.started_at,
            ended_at: Utc::now(),
            cancelled: report.cancelled,
            counts_by_source_type: report.counts_by_source_type.clone(),
            counts_by_bucket: report.counts_by_bucket.clone(),
            counts_by_domain: report.counts_by_domain.clone(),
            counts_by_entity: report.counts_by_entity.clone(),
        };

        if let Err(e) = self.write_json(
            &self.batch_dir.join("batch_manifest.json"),
            &manifest,
        )
        .await
        {
            warn!(error = %e, "Manifest write failed");
        }

        let latest = LatestBatch {
            batch_id: self.batch_id.clone(),
            path: self.batch_dir.to_string_lossy().to_string(),
        };
        if let Err(e) = self
            .write_json(&self.data_dir.join("latest_batch.json"), &latest)
            .await
        {
            warn!(error = %e, "Latest-batch pointer write failed");
        }

        info!(
            written = report.written,
            cancelled = report.cancelled,
            "Batch manifest emitted"
        );
    }

    async fn write_json<T: serde::Serialize>(&self, path: &Path, value: &T) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }
}

/// First 6 hex characters of the link digest; the file identity is
/// `(source_name, date, hash)`.
pub fn link_hash(link: &str) -> String {
    let digest = Sha256::digest(link.as_bytes());
    digest
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>()[..6]
        .to_string()
}

pub fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        OTHERS.to_string()
    } else {
        cleaned
    }
}

pub fn render_markdown(post: &Post, domain: &str) -> String {
    let score = post.quality_score.min(5);
    let stars = "⭐".repeat(score as usize) + &"☆".repeat(5 - score as usize);

    let key_info = post
        .key_info
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {item}", i + 1))
        .collect::<Vec<_>>()
        .join("<br>");

    let mut lines = vec![
        format!("# {}", post.event),
        String::new(),
        format!("- **Date**: {}", post.date),
        format!("- **Category**: {}", post.category),
        format!("- **Domain**: {domain}"),
        format!("- **Quality**: {stars} ({score}/5)"),
        format!("- **Reason**: {}", post.quality_reason),
        format!("- **Source_Type**: {}", post.source_type),
        format!("- **Source**: {}", post.source_name),
        format!("- **Link**: {}", post.link),
        String::new(),
        "## Key Info".to_string(),
        key_info,
        String::new(),
        "## Details".to_string(),
        post.detail.clone(),
        String::new(),
    ];

    if !post.extra_content.is_empty() {
        lines.push("## Extra Content".to_string());
        lines.push(post.extra_content.clone());
        lines.push(String::new());
    }
    if !post.extra_urls.is_empty() {
        lines.push("## External Links".to_string());
        for url in &post.extra_urls {
            lines.push(format!("- {url}"));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}
