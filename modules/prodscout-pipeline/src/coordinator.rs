//! Pipeline coordinator: wire the queues and stages, run to completion,
//! and drive the cascading-sentinel shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use llm_client::LlmClient;
use prodscout_core::{Config, ErrorLog, RunSummary};
use x_client::XScraper;

use crate::queue::{self, Slot};
use crate::stages::{EnricherStage, FetcherStage, OrganizerStage, WriterStage};
use crate::traits::{FeedParser, VideoTranscriber, WebRenderer};

/// How long cancelled stages get before their tasks are aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

const LLM_TIMEOUT: Duration = Duration::from_secs(120);

/// External collaborators, injected so tests can fake every one of them.
pub struct PipelineDeps {
    pub feed_parser: Arc<dyn FeedParser>,
    pub renderer: Arc<dyn WebRenderer>,
    pub transcriber: Arc<dyn VideoTranscriber>,
    pub llm: Arc<dyn LlmClient>,
    pub x_scraper: Option<Arc<XScraper>>,
}

pub struct Pipeline {
    config: Arc<Config>,
    deps: PipelineDeps,
    batch_id: String,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(
        config: Arc<Config>,
        deps: PipelineDeps,
        batch_id: String,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            deps,
            batch_id,
            cancel,
        }
    }

    pub fn batch_dir(&self) -> PathBuf {
        self.config.data_dir.join(&self.batch_id)
    }

    /// Run the full pipeline. The shutdown sequence is strictly ordered:
    /// fetcher completion, N_e sentinels to the enrichers, N_o sentinels
    /// to the organizers, one sentinel to the writer, manifest.
    pub async fn run(self) -> Result<RunSummary> {
        let started_at = Utc::now();
        let started = Instant::now();

        let batch_dir = self.batch_dir();
        let raw_dir = batch_dir.join("raw");
        tokio::fs::create_dir_all(&raw_dir)
            .await
            .with_context(|| format!("creating batch directory {}", batch_dir.display()))?;

        let errlog = ErrorLog::open(&batch_dir);
        info!(batch_id = %self.batch_id, "Pipeline batch starting");

        let n_enrichers = self.config.enricher.pool_size.max(1);
        let n_organizers = self.config.organizer.pool_size.max(1);

        let (tx_f, rx_f) = queue::channel();
        let (tx_e, rx_e) = queue::channel();
        let (tx_w, rx_w) = queue::channel();

        // Stages start downstream-first so queues always have consumers.
        let writer = WriterStage::new(
            self.config.data_dir.clone(),
            self.batch_id.clone(),
            started_at,
            self.config.entities.clone(),
            errlog.clone(),
        );
        let writer_handle = tokio::spawn(writer.run(rx_w, self.cancel.clone()));

        let organizer = Arc::new(OrganizerStage::new(
            self.deps.llm.clone(),
            self.config.organizer.clone(),
            LLM_TIMEOUT,
            errlog.clone(),
        ));
        let mut organizer_set = JoinSet::new();
        for _ in 0..n_organizers {
            organizer_set.spawn(organizer.clone().worker(
                rx_e.clone(),
                tx_w.clone(),
                self.cancel.clone(),
            ));
        }

        let enricher = Arc::new(EnricherStage::new(
            self.deps.renderer.clone(),
            self.deps.transcriber.clone(),
            self.config.enricher.clone(),
            errlog.clone(),
        ));
        let mut enricher_set = JoinSet::new();
        for _ in 0..n_enrichers {
            enricher_set.spawn(enricher.clone().worker(
                rx_f.clone(),
                tx_e.clone(),
                self.cancel.clone(),
            ));
        }

        let fetcher = FetcherStage::new(
            self.config.clone(),
            self.deps.feed_parser.clone(),
            self.deps.x_scraper.clone(),
            errlog.clone(),
            self.cancel.clone(),
            raw_dir,
        );
        fetcher.run(tx_f.clone()).await;

        // Cascade: one sentinel per worker, then wait the stage out
        // before signalling the next one.
        self.send_sentinels(&tx_f, n_enrichers).await;
        drop(tx_f);
        self.join_stage(&mut enricher_set, "enricher").await;

        self.send_sentinels(&tx_e, n_organizers).await;
        drop(tx_e);
        self.join_stage(&mut organizer_set, "organizer").await;

        self.send_sentinels(&tx_w, 1).await;
        drop(tx_w);

        let mut writer_handle = writer_handle;
        let report = tokio::select! {
            joined = &mut writer_handle => match joined {
                Ok(report) => report,
                Err(e) => {
                    warn!(error = %e, "Writer task failed");
                    Default::default()
                }
            },
            _ = self.cancel.cancelled() => {
                match tokio::time::timeout(SHUTDOWN_GRACE, &mut writer_handle).await {
                    Ok(Ok(report)) => report,
                    Ok(Err(e)) => {
                        warn!(error = %e, "Writer task failed");
                        Default::default()
                    }
                    Err(_) => {
                        warn!("Writer did not stop within the grace window, aborting");
                        writer_handle.abort();
                        Default::default()
                    }
                }
            }
        };

        let summary = RunSummary {
            batch_id: self.batch_id.clone(),
            counts_by_source_type: report.counts_by_source_type.clone(),
            counts_by_quality: report.counts_by_bucket.clone(),
            elapsed: started.elapsed(),
            cancelled: report.cancelled || self.cancel.is_cancelled(),
            sources_total: self.config.sources.len(),
            sources_failed: errlog.failed_source_count(),
            error_counts: errlog.counts(),
        };
        info!("{summary}");
        Ok(summary)
    }

    async fn send_sentinels(&self, tx: &mpsc::Sender<Slot>, count: usize) {
        for _ in 0..count {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                result = tx.send(None) => {
                    if result.is_err() {
                        return;
                    }
                }
            }
        }
    }

    /// Wait a stage's workers out. Unbounded while the run is healthy;
    /// after cancellation they get the grace window, then are aborted.
    async fn join_stage(&self, set: &mut JoinSet<()>, stage: &str) {
        {
            let drain = Self::drain(set, stage);
            tokio::select! {
                _ = drain => return,
                _ = self.cancel.cancelled() => {}
            }
        }
        if tokio::time::timeout(SHUTDOWN_GRACE, Self::drain(set, stage))
            .await
            .is_err()
        {
            warn!(stage, "Workers did not stop within the grace window, aborting");
            set.abort_all();
            while set.join_next().await.is_some() {}
        }
    }

    async fn drain(set: &mut JoinSet<()>, stage: &str) {
        while let Some(result) = set.join_next().await {
            if let Err(e) = result {
                warn!(stage, error = %e, "Stage worker panicked");
            }
        }
    }
}
