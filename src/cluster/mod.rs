// src/cluster/mod.rs
//! Clustering & scoring stage.
//!
//! Reads a region's raw batches for one day, drops links the status ledger already
//! marks done, groups near-duplicates, scores each new group once and records the
//! result in the content-addressed cache. Re-running over the same inputs is a no-op.

pub mod cache;
pub mod grouping;
pub mod similarity;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use metrics::counter;
use serde_json::Value;

use crate::config::RegionRegistry;
use crate::models::{day_key, ProcessLog, RawArticle, ScoredArticle, STAMP_FORMAT};
use crate::scoring::{score_or_fallback, DynScorer, ScoreRequest};
use crate::store::{join_key, key_stem, write_json, Store};
use crate::telemetry::ensure_metrics_described;
use crate::tracking::StatusLedger;

pub use cache::{article_id, ScoreCache};
pub use grouping::{group_articles, DEFAULT_THRESHOLD};
pub use similarity::token_set_ratio;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub region: String,
    pub day: String,
    pub batches_read: usize,
    pub batches_failed: usize,
    pub batches_archived: usize,
    /// Pending (not yet done) unique articles.
    pub articles: usize,
    pub groups: usize,
    pub scored: usize,
    pub reused: usize,
    pub cluster_ids: Vec<String>,
    /// Key of the process log, when one was written.
    pub process_log: Option<String>,
}

struct RawBatch {
    key: String,
    articles: Vec<RawArticle>,
}

pub struct ClusterStage {
    store: Arc<dyn Store>,
    registry: Arc<RegionRegistry>,
    scorer: DynScorer,
    cache: ScoreCache,
    threshold: f64,
    timeout: Duration,
}

impl ClusterStage {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<RegionRegistry>,
        scorer: DynScorer,
        threshold: f64,
        timeout: Duration,
    ) -> Self {
        let cache = ScoreCache::new(store.clone());
        Self {
            store,
            registry,
            scorer,
            cache,
            threshold,
            timeout,
        }
    }

    pub fn raw_prefix(region: &str, day: NaiveDate) -> String {
        join_key(&["raw", region, &day_key(day)])
    }

    pub fn archive_key(raw_key: &str) -> String {
        join_key(&["archive", raw_key])
    }

    /// Process every raw batch of `region` for `day`.
    pub async fn update(&self, region: &str, day: NaiveDate, now: DateTime<Utc>) -> Result<RunReport> {
        ensure_metrics_described();
        self.registry.get(region)?;

        let mut report = RunReport {
            region: region.to_string(),
            day: day_key(day),
            ..RunReport::default()
        };

        let batches = self.load_batches(region, day, &mut report)?;
        let mut ledger = StatusLedger::load(self.store.clone(), region);

        let mut seen = HashSet::new();
        let pending: Vec<RawArticle> = batches
            .iter()
            .flat_map(|b| b.articles.iter())
            .filter(|a| !ledger.is_done(&a.link))
            .filter(|a| seen.insert(a.link.clone()))
            .cloned()
            .collect();
        report.articles = pending.len();
        counter!("cluster_articles_total").increment(pending.len() as u64);

        if !pending.is_empty() {
            let groups = group_articles(&pending, self.threshold, token_set_ratio);
            report.groups = groups.len();
            counter!("cluster_groups_total").increment(groups.len() as u64);

            let mut index = self.cache.index(region)?;
            let regions = self.registry.names();

            for group in &groups {
                let members: Vec<&RawArticle> = group.iter().map(|&i| &pending[i]).collect();
                let seed = members[0];
                let id = article_id(&seed.title, &seed.link);

                if self.cache.get(&index, &id).is_some() {
                    counter!("score_cache_hits_total").increment(1);
                    tracing::debug!(target: "cluster", %region, %id, "cluster already scored; reusing cache entry");
                    report.reused += 1;
                } else {
                    let req = ScoreRequest {
                        title: seed.title.clone(),
                        summary: seed.summary.clone(),
                        region: region.to_string(),
                        regions: regions.clone(),
                    };
                    let outcome = score_or_fallback(self.scorer.as_ref(), &req, self.timeout).await;
                    let scored = ScoredArticle {
                        id: id.clone(),
                        title: seed.title.clone(),
                        summary: outcome.summary,
                        link: seed.link.clone(),
                        source_url: seed.source_url.clone(),
                        published: members.iter().map(|a| a.published).min().unwrap_or(seed.published),
                        frequency: members.len() as u32,
                        impact: outcome.impact,
                    };
                    self.cache.put(&mut index, region, day, &scored)?;
                    report.scored += 1;
                }

                for a in &members {
                    ledger.mark_done(&a.link, &id);
                }
                ledger
                    .save()
                    .with_context(|| format!("saving status ledger for {region}"))?;
                report.cluster_ids.push(id);
            }
        }

        self.archive_finished(&batches, &ledger, &mut report);

        if report.articles > 0 {
            report.process_log = Some(self.write_process_log(&report, &batches, now)?);
        }

        tracing::info!(
            target: "cluster",
            %region,
            day = %report.day,
            batches = report.batches_read,
            failed = report.batches_failed,
            articles = report.articles,
            groups = report.groups,
            scored = report.scored,
            reused = report.reused,
            archived = report.batches_archived,
            "clustering run finished"
        );
        Ok(report)
    }

    fn load_batches(&self, region: &str, day: NaiveDate, report: &mut RunReport) -> Result<Vec<RawBatch>> {
        let prefix = Self::raw_prefix(region, day);
        let keys = self
            .store
            .list(&prefix)
            .with_context(|| format!("listing {prefix}"))?;

        let mut batches = Vec::new();
        for key in keys {
            if !key_stem(&key).starts_with("fetched_") || !key.ends_with(".json") {
                continue;
            }
            match self.read_batch(&key) {
                Ok(articles) => {
                    report.batches_read += 1;
                    batches.push(RawBatch { key, articles });
                }
                Err(e) => {
                    counter!("raw_batch_errors_total").increment(1);
                    report.batches_failed += 1;
                    let error = format!("{e:#}");
                    tracing::warn!(target: "cluster", %key, %error, "skipping unreadable raw batch");
                }
            }
        }
        Ok(batches)
    }

    /// Parse one batch. Records that fail to decode are dropped individually.
    fn read_batch(&self, key: &str) -> Result<Vec<RawArticle>> {
        let bytes = self
            .store
            .read(key)?
            .with_context(|| format!("{key} vanished while listing"))?;
        let records: Vec<Value> = serde_json::from_slice(&bytes).with_context(|| format!("decoding {key}"))?;

        let mut out = Vec::with_capacity(records.len());
        for (i, rec) in records.into_iter().enumerate() {
            match serde_json::from_value::<RawArticle>(rec) {
                Ok(a) if !a.link.is_empty() => out.push(a),
                Ok(_) => tracing::debug!(target: "cluster", %key, record = i, "record without link dropped"),
                Err(e) => tracing::warn!(target: "cluster", %key, record = i, error = %e, "malformed record dropped"),
            }
        }
        Ok(out)
    }

    fn archive_finished(&self, batches: &[RawBatch], ledger: &StatusLedger, report: &mut RunReport) {
        for batch in batches {
            if !batch.articles.iter().all(|a| ledger.is_done(&a.link)) {
                continue;
            }
            let dest = Self::archive_key(&batch.key);
            match self.store.rename(&batch.key, &dest) {
                Ok(()) => {
                    counter!("raw_batches_archived_total").increment(1);
                    report.batches_archived += 1;
                }
                Err(e) => {
                    tracing::warn!(target: "cluster", key = %batch.key, error = %e, "could not archive raw batch")
                }
            }
        }
    }

    fn write_process_log(&self, report: &RunReport, batches: &[RawBatch], now: DateTime<Utc>) -> Result<String> {
        let run_time = now.format(STAMP_FORMAT).to_string();
        let log = ProcessLog {
            run_time: run_time.clone(),
            region: report.region.clone(),
            day: report.day.clone(),
            raw_batches_consumed: batches.iter().map(|b| b.key.clone()).collect(),
            cluster_ids_produced: report.cluster_ids.clone(),
            articles: report.articles,
            groups: report.groups,
            scored: report.scored,
            reused: report.reused,
        };
        let key = join_key(&[
            "log",
            "process_log",
            &format!("summarizer_{}_{run_time}.json", report.region),
        ]);
        write_json(self.store.as_ref(), &key, &log)?;
        Ok(key)
    }
}
