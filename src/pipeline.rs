// src/pipeline.rs
//! Wiring of the stages: what a region receiver runs per notification, and the
//! inline `run-all` path used for manual re-triggers.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use metrics::{counter, gauge};

use crate::cluster::{ClusterStage, RunReport};
use crate::config::{PipelineConfig, RegionRegistry};
use crate::ingest::providers::RssFeedProvider;
use crate::ingest::types::FeedProvider;
use crate::ingest::{FetchReport, FetchStage};
use crate::models::parse_day;
use crate::notify::{Notification, NotificationHandler, Notifier};
use crate::ranking::{SnapshotOutcome, TopKEngine};
use crate::scoring::{build_scorer, DynScorer};
use crate::store::{join_key, Store};

/// Result of one clustering pass followed by the region's top-K recompute.
#[derive(Debug, Clone)]
pub struct RegionRun {
    pub cluster: RunReport,
    pub snapshots: Vec<SnapshotOutcome>,
}

pub struct Pipeline {
    store: Arc<dyn Store>,
    registry: Arc<RegionRegistry>,
    cluster: ClusterStage,
    topk: TopKEngine,
    rerun_window_days: i64,
    fingerprint_max_age_days: i64,
    fetch_limit: usize,
}

impl Pipeline {
    pub fn new(store: Arc<dyn Store>, registry: Arc<RegionRegistry>, scorer: DynScorer, cfg: &PipelineConfig) -> Self {
        let cluster = ClusterStage::new(
            store.clone(),
            registry.clone(),
            scorer,
            cfg.similarity_threshold,
            cfg.scoring.timeout(),
        );
        let topk = TopKEngine::new(store.clone(), registry.clone(), cfg.top_k);
        Self {
            store,
            registry,
            cluster,
            topk,
            rerun_window_days: cfg.rerun_window_days,
            fingerprint_max_age_days: cfg.fingerprint_max_age_days,
            fetch_limit: cfg.fetch_limit,
        }
    }

    /// Build registry and scorer from config.
    pub fn from_config(cfg: &PipelineConfig, store: Arc<dyn Store>) -> Result<Self> {
        let registry = Arc::new(RegionRegistry::from_config(cfg)?);
        let scorer = build_scorer(&cfg.scoring)?;
        Ok(Self::new(store, registry, scorer, cfg))
    }

    pub fn registry(&self) -> &Arc<RegionRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn fetch_stage(&self, notifier: Arc<dyn Notifier>) -> FetchStage {
        FetchStage::new(
            self.store.clone(),
            self.registry.clone(),
            self.fingerprint_max_age_days,
            notifier,
            self.fetch_limit,
        )
    }

    /// HTTP providers for one region's feeds, or every feed when `None`.
    pub fn providers(&self, region: Option<&str>) -> Result<Vec<Box<dyn FeedProvider>>> {
        let mut out: Vec<Box<dyn FeedProvider>> = Vec::new();
        for (feed, url) in self.registry.feeds_for(region)? {
            out.push(Box::new(RssFeedProvider::from_url(&feed, &url)?));
        }
        Ok(out)
    }

    /// Cluster `day` for `region`, then recompute that region's snapshots.
    pub async fn run_region(&self, region: &str, day: NaiveDate, now: DateTime<Utc>) -> Result<RegionRun> {
        let cluster = self.cluster.update(region, day, now).await?;
        let only = [region.to_string()];
        let snapshots = self.recompute(Some(&only[..]), now)?;
        gauge!("pipeline_last_run_ts").set(now.timestamp() as f64);
        Ok(RegionRun { cluster, snapshots })
    }

    pub async fn summarize(&self, region: &str, day: NaiveDate, now: DateTime<Utc>) -> Result<RunReport> {
        self.cluster.update(region, day, now).await
    }

    pub fn recompute(&self, regions: Option<&[String]>, now: DateTime<Utc>) -> Result<Vec<SnapshotOutcome>> {
        self.topk.recompute(regions, self.rerun_window_days, now)
    }

    /// Day partitions that still hold unarchived raw batches for `region`.
    pub fn pending_days(&self, region: &str) -> Result<Vec<NaiveDate>> {
        self.registry.get(region)?;
        let prefix = join_key(&["raw", region]);
        let days: BTreeSet<NaiveDate> = self
            .store
            .list(&prefix)?
            .iter()
            .filter_map(|k| k.split('/').nth(2).and_then(parse_day))
            .collect();
        Ok(days.into_iter().collect())
    }

    /// Inline fetch, then every pending day of every region, then top-K.
    ///
    /// A region that fails is logged and listed in `failed_regions`; the
    /// remaining regions are still clustered and ranked.
    pub async fn run_all(
        &self,
        providers: &[Box<dyn FeedProvider>],
        notifier: Arc<dyn Notifier>,
        now: DateTime<Utc>,
    ) -> RunAllReport {
        let fetch = self.fetch_stage(notifier).run(providers, now).await;

        let mut report = RunAllReport {
            fetch,
            runs: Vec::new(),
            snapshots: Vec::new(),
            failed_regions: Vec::new(),
        };
        for region in self.registry.names() {
            if let Err(e) = self.run_pending(&region, now, &mut report).await {
                let error = format!("{e:#}");
                tracing::error!(target: "cluster", %region, %error, "region run failed");
                counter!("pipeline_region_failures_total").increment(1);
                report.failed_regions.push(region.clone());
                continue;
            }
            // Regions with no pending batches still get their window refreshed.
            let only = [region.clone()];
            match self.recompute(Some(&only[..]), now) {
                Ok(snapshots) => report.snapshots.extend(snapshots),
                Err(e) => {
                    let error = format!("{e:#}");
                    tracing::error!(target: "topk", %region, %error, "top-k refresh failed");
                    counter!("pipeline_region_failures_total").increment(1);
                    report.failed_regions.push(region.clone());
                }
            }
        }
        tracing::info!(
            target: "topk",
            regions = self.registry.names().len(),
            runs = report.runs.len(),
            snapshots = report.snapshots.len(),
            failed = report.failed_regions.len(),
            "run-all finished"
        );
        report
    }

    async fn run_pending(&self, region: &str, now: DateTime<Utc>, report: &mut RunAllReport) -> Result<()> {
        for day in self.pending_days(region)? {
            report.runs.push(self.run_region(region, day, now).await?);
        }
        Ok(())
    }
}

/// Outcome of [`Pipeline::run_all`].
#[derive(Debug, Clone)]
pub struct RunAllReport {
    pub fetch: FetchReport,
    pub runs: Vec<RegionRun>,
    /// Snapshots from the closing per-region refresh.
    pub snapshots: Vec<SnapshotOutcome>,
    pub failed_regions: Vec<String>,
}

/// Notification handler bound to one region.
pub struct RegionPipeline {
    region: String,
    pipeline: Arc<Pipeline>,
}

impl RegionPipeline {
    pub fn new(region: &str, pipeline: Arc<Pipeline>) -> Self {
        Self {
            region: region.to_string(),
            pipeline,
        }
    }
}

#[async_trait]
impl NotificationHandler for RegionPipeline {
    async fn handle(&self, note: &Notification) -> Result<()> {
        let now = Utc::now();
        let day = note.batch_day().unwrap_or_else(|| now.date_naive());
        let run = self.pipeline.run_region(&self.region, day, now).await?;
        tracing::info!(
            target: "notify",
            region = %self.region,
            day = %run.cluster.day,
            scored = run.cluster.scored,
            snapshots = run.snapshots.len(),
            "notification processed"
        );
        Ok(())
    }
}
