//! news-ranker binary entrypoint.
//! Loads config, opens the data directory and dispatches one CLI subcommand.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;

use news_ranker::cli::{Cli, Command};
use news_ranker::models::parse_day;
use news_ranker::notify::{NoopNotifier, RegionReceiver, SocketNotifier};
use news_ranker::ranking::{load_snapshot, TopKEngine};
use news_ranker::telemetry::{ensure_metrics_described, init_tracing};
use news_ranker::{FsStore, Pipeline, PipelineConfig, RegionPipeline, Store};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();
    ensure_metrics_described();

    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => PipelineConfig::load_from(path)?,
        None => PipelineConfig::load_default()?,
    };
    let store: Arc<dyn Store> = Arc::new(FsStore::new(cfg.data_dir.clone()));
    let pipeline = Arc::new(Pipeline::from_config(&cfg, store.clone())?);
    let now = Utc::now();

    match cli.command {
        Command::Fetch { region } => {
            let notifier = Arc::new(
                SocketNotifier::from_registry(&cfg.receiver_host, pipeline.registry())
                    .with_timeout(cfg.notify_timeout()),
            );
            let providers = pipeline.providers(region.as_deref())?;
            let report = pipeline.fetch_stage(notifier).run(&providers, now).await;
            println!("{}", serde_json::to_string_pretty(&report.batches)?);
        }
        Command::Summarize { region, date } => {
            let day = match date {
                Some(d) => parse_day(&d).with_context(|| format!("invalid date '{d}', expected YYYY-MM-DD"))?,
                None => now.date_naive(),
            };
            let report = pipeline.summarize(&region, day, now).await?;
            tracing::info!(%region, scored = report.scored, reused = report.reused, "summarize finished");
        }
        Command::Topk {
            region,
            rerun_window_days,
        } => {
            let regions = (!region.is_empty()).then_some(region);
            let outcomes = match rerun_window_days {
                Some(window) => TopKEngine::new(store.clone(), pipeline.registry().clone(), cfg.top_k)
                    .recompute(regions.as_deref(), window, now)?,
                None => pipeline.recompute(regions.as_deref(), now)?,
            };
            println!("{}", serde_json::to_string_pretty(&outcomes)?);
        }
        Command::Receive { region } => {
            let port = pipeline.registry().port(&region)?;
            let receiver = RegionReceiver::bind(&region, (cfg.receiver_host.as_str(), port)).await?;
            let handler = RegionPipeline::new(&region, pipeline.clone());
            receiver.serve(&handler).await?;
        }
        Command::Show { region, date } => {
            let snapshot = load_snapshot(store.as_ref(), pipeline.registry(), &region, &date)?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Command::RunAll => {
            let providers = pipeline.providers(None)?;
            let report = pipeline.run_all(&providers, Arc::new(NoopNotifier), now).await;
            tracing::info!(
                batches = report.fetch.batches.len(),
                new = report.fetch.new_articles,
                region_runs = report.runs.len(),
                "run-all finished"
            );
            if !report.failed_regions.is_empty() {
                anyhow::bail!("run-all failed for regions: {}", report.failed_regions.join(", "));
            }
        }
    }
    Ok(())
}
