use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use llm_client::OpenAiClient;
use prodscout_core::{Config, RunSummary, SourceType};
use prodscout_pipeline::adapters::ScribeTranscriber;
use prodscout_pipeline::feeds::HttpFeedParser;
use prodscout_pipeline::{Pipeline, PipelineDeps};
use prodscout_scribe::{VideoScribe, WhisperCli};
use render_client::RenderClient;
use x_client::XScraper;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const LLM_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Parser)]
#[command(name = "prodscout", about = "Product-intelligence reconnaissance pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full fetch → enrich → organize → write pipeline.
    Pipeline {
        /// Path to the INI configuration (default: ./config.ini).
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Run only the microblog scraper; one JSON file per user.
    Scraper {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let (command, config_path) = match cli.command {
        Commands::Pipeline { config } => ("pipeline", config),
        Commands::Scraper { config } => ("scraper", config),
    };
    let config_path = config_path.unwrap_or_else(|| PathBuf::from("config.ini"));

    let config = match Config::load(&config_path) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!(path = %config_path.display(), error = %e, "Configuration error");
            eprintln!("configuration error: {e}");
            return ExitCode::from(1);
        }
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling run");
                cancel.cancel();
            }
        });
    }

    let result = match command {
        "pipeline" => run_pipeline(config, cancel).await,
        _ => run_scraper(config, cancel).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Fatal error");
            eprintln!("fatal error: {e:#}");
            ExitCode::from(3)
        }
    }
}

async fn run_pipeline(config: Arc<Config>, cancel: CancellationToken) -> Result<ExitCode> {
    let batch_id = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let raw_root = config.data_dir.join(&batch_id).join("raw");

    let llm: Arc<dyn llm_client::LlmClient> = Arc::new(OpenAiClient::new(
        config.llm.api_key.clone(),
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        LLM_TIMEOUT,
    )?);

    let render_service = std::env::var("RENDER_SERVICE_URL").ok();
    let render_token = std::env::var("RENDER_SERVICE_TOKEN").ok();
    let renderer = RenderClient::new(
        render_service.as_deref(),
        render_token.as_deref(),
        HTTP_TIMEOUT,
    )?;

    let whisper_program =
        std::env::var("WHISPER_PROGRAM").unwrap_or_else(|_| "whisper-cli".to_string());
    let mut whisper = WhisperCli::new(whisper_program);
    if let Ok(model) = std::env::var("WHISPER_MODEL") {
        whisper = whisper.with_model(model);
    }
    let scribe = VideoScribe::new(Arc::new(whisper)).with_llm(llm.clone());

    let x_scraper = if config.x_scraper.enabled {
        match XScraper::from_config(&config.x_scraper, &config.config_dir) {
            Ok(scraper) => Some(Arc::new(scraper.with_cancel(cancel.clone()))),
            Err(e) => {
                // The direct scraper failing to initialize degrades those
                // sources, it does not abort the run.
                warn!(error = %e, "Microblog scraper unavailable for this run");
                None
            }
        }
    } else {
        None
    };

    let deps = PipelineDeps {
        feed_parser: Arc::new(HttpFeedParser::new(HTTP_TIMEOUT)?),
        renderer: Arc::new(renderer),
        transcriber: Arc::new(ScribeTranscriber::new(scribe, raw_root)),
        llm,
        x_scraper,
    };

    let pipeline = Pipeline::new(config.clone(), deps, batch_id, cancel);
    let summary = pipeline.run().await?;

    print_summary(&summary);
    let failure_ratio = if summary.sources_total == 0 {
        0.0
    } else {
        summary.sources_failed as f64 / summary.sources_total as f64
    };
    if failure_ratio > 0.10 {
        return Ok(ExitCode::from(2));
    }
    Ok(ExitCode::SUCCESS)
}

fn print_summary(summary: &RunSummary) {
    eprintln!("==== Run Summary ====");
    eprintln!("batch:   {}", summary.batch_id);
    eprintln!(
        "elapsed: {:.1}s{}",
        summary.elapsed.as_secs_f64(),
        if summary.cancelled { " (cancelled)" } else { "" }
    );
    eprintln!(
        "sources: {} total, {} failed",
        summary.sources_total, summary.sources_failed
    );
    for (source_type, count) in &summary.counts_by_source_type {
        eprintln!("  {source_type}: {count}");
    }
    eprintln!("quality:");
    for bucket in ["high", "pending", "excluded"] {
        let count = summary.counts_by_quality.get(bucket).copied().unwrap_or(0);
        eprintln!("  {bucket}: {count}");
    }
    if !summary.error_counts.is_empty() {
        eprintln!("errors:");
        for (kind, count) in &summary.error_counts {
            eprintln!("  {kind}: {count}");
        }
    }
}

/// Standalone scraper mode: fetch every configured microblog account and
/// dump each user's posts as JSON.
async fn run_scraper(config: Arc<Config>, cancel: CancellationToken) -> Result<ExitCode> {
    let batch_id = Local::now().format("%Y%m%d_%H%M%S").to_string();

    let accounts: Vec<(String, String)> = config
        .sources_of(SourceType::Microblog)
        .into_iter()
        .filter(|s| !s.value.contains("://"))
        .map(|s| (s.name.clone(), s.value.clone()))
        .collect();
    if accounts.is_empty() {
        anyhow::bail!("no microblog account handles configured in [microblog_accounts]");
    }

    let scraper = XScraper::from_config(&config.x_scraper, &config.config_dir)
        .context("initializing microblog scraper")?
        .with_cancel(cancel);

    let out_dir = config.data_dir.join(format!("x_scraper_{batch_id}"));
    tokio::fs::create_dir_all(&out_dir).await?;

    let results = scraper
        .fetch_all(&accounts, config.fetcher.lookback_days)
        .await;

    let mut users_ok = 0usize;
    let mut total_posts = 0usize;
    let mut users_failed = 0usize;
    for (source_name, outcome) in &results {
        match outcome {
            Ok(posts) => {
                users_ok += 1;
                total_posts += posts.len();
                if posts.is_empty() {
                    continue;
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
                let path = out_dir.join(format!("{safe}.json"));
                tokio::fs::write(&path, serde_json::to_vec_pretty(posts)?).await?;
            }
            Err(e) => {
                users_failed += 1;
                warn!(source = %source_name, error = %e, "User fetch failed");
            }
        }
    }

    for status in scraper.client().pool().status() {
        info!(
            credential = status.index,
            state = status.state,
            requests = status.request_count,
            failures = status.failure_count,
            token = %status.auth_token_hint,
            "Credential status"
        );
    }

    eprintln!(
        "scraper batch {batch_id}: {users_ok}/{} users, {total_posts} posts, output {}",
        results.len(),
        out_dir.display()
    );
    if users_ok == 0 && users_failed > 0 {
        return Ok(ExitCode::from(3));
    }
    if users_failed > 0 {
        return Ok(ExitCode::from(2));
    }
    Ok(ExitCode::SUCCESS)
}
