// src/ranking/topk.rs
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use metrics::counter;
use serde::Serialize;

use crate::cluster::ScoreCache;
use crate::config::RegionRegistry;
use crate::models::{day_key, ScoredArticle};
use crate::store::{join_key, write_json, Store};
use crate::telemetry::ensure_metrics_described;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotStatus {
    Written,
    /// Snapshot exists and the day is older than the rerun window.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotOutcome {
    pub region: String,
    pub day: NaiveDate,
    pub status: SnapshotStatus,
}

/// Region-local calendar day of a UTC instant.
pub fn local_day(published: DateTime<Utc>, tz: Tz) -> NaiveDate {
    published.with_timezone(&tz).date_naive()
}

/// Top `k` by `impact[region] + frequency`, descending. Ties keep input order.
pub fn rank(mut articles: Vec<ScoredArticle>, region: &str, k: usize) -> Vec<ScoredArticle> {
    articles.sort_by_key(|a| Reverse(a.rank_score(region)));
    articles.truncate(k);
    articles
}

pub fn snapshot_key(region: &str, day: NaiveDate) -> String {
    join_key(&["top_k_cache", region, &format!("{}.json", day_key(day))])
}

/// Rebuilds per-day top-K snapshots from the score cache.
pub struct TopKEngine {
    store: Arc<dyn Store>,
    registry: Arc<RegionRegistry>,
    cache: ScoreCache,
    top_k: usize,
}

impl TopKEngine {
    pub fn new(store: Arc<dyn Store>, registry: Arc<RegionRegistry>, top_k: usize) -> Self {
        let cache = ScoreCache::new(store.clone());
        Self {
            store,
            registry,
            cache,
            top_k,
        }
    }

    /// Recompute snapshots for `regions` (all configured regions when `None`).
    ///
    /// A day whose snapshot already exists is left alone once it is more than
    /// `rerun_window_days` behind the region's local today.
    pub fn recompute(
        &self,
        regions: Option<&[String]>,
        rerun_window_days: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<SnapshotOutcome>> {
        ensure_metrics_described();
        let targets = match regions {
            Some(list) => {
                for r in list {
                    self.registry.get(r)?;
                }
                list.to_vec()
            }
            None => self.registry.names(),
        };

        let mut outcomes = Vec::new();
        for region in &targets {
            outcomes.extend(self.recompute_region(region, rerun_window_days, now)?);
        }
        Ok(outcomes)
    }

    fn recompute_region(
        &self,
        region: &str,
        rerun_window_days: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<SnapshotOutcome>> {
        let tz = self.registry.timezone(region)?;
        let today = self.registry.local_today(region, now)?;

        let mut buckets: BTreeMap<NaiveDate, Vec<ScoredArticle>> = BTreeMap::new();
        for article in self.cache.load_region(region)? {
            buckets
                .entry(local_day(article.published, tz))
                .or_default()
                .push(article);
        }

        let mut outcomes = Vec::with_capacity(buckets.len());
        for (day, articles) in buckets {
            let key = snapshot_key(region, day);
            let age = (today - day).num_days();
            let status = if age > rerun_window_days && self.store.exists(&key) {
                counter!("topk_snapshots_frozen_total").increment(1);
                SnapshotStatus::Skipped
            } else {
                let ranked = rank(articles, region, self.top_k);
                write_json(self.store.as_ref(), &key, &ranked)?;
                counter!("topk_snapshots_written_total").increment(1);
                tracing::debug!(target: "topk", %region, day = %day_key(day), entries = ranked.len(), "snapshot written");
                SnapshotStatus::Written
            };
            outcomes.push(SnapshotOutcome {
                region: region.to_string(),
                day,
                status,
            });
        }

        let written = outcomes.iter().filter(|o| o.status == SnapshotStatus::Written).count();
        tracing::info!(
            target: "topk",
            %region,
            written,
            skipped = outcomes.len() - written,
            "top-k recompute finished"
        );
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn scored(id: &str, impact: i64, frequency: u32) -> ScoredArticle {
        ScoredArticle {
            id: id.into(),
            title: id.into(),
            summary: String::new(),
            link: format!("https://x/{id}"),
            source_url: "https://x/rss".into(),
            published: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            frequency,
            impact: [("us".to_string(), impact)].into_iter().collect(),
        }
    }

    #[test]
    fn ties_keep_input_order() {
        let ranked = rank(vec![scored("a", 5, 1), scored("b", 3, 3), scored("c", 2, 1)], "us", 2);
        let ids: Vec<_> = ranked.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn missing_region_impact_ranks_on_frequency() {
        let ranked = rank(vec![scored("a", 10, 1), scored("b", 0, 4)], "eu", 5);
        let ids: Vec<_> = ranked.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
    }

    #[test]
    fn local_day_follows_region_timezone() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 23, 30, 0).unwrap();
        assert_eq!(local_day(t, chrono_tz::Etc::GMTMinus2), NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(local_day(t, chrono_tz::America::New_York), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    }

    #[test]
    fn snapshot_keys() {
        let d = NaiveDate::from_ymd_opt(2024, 2, 3).unwrap();
        assert_eq!(snapshot_key("us", d), "top_k_cache/us/2024-02-03.json");
    }
}
