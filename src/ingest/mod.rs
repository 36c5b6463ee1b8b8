// src/ingest/mod.rs
//! Fetch stage: pull feeds, drop what was already seen or scored, persist a raw
//! batch per feed and signal the region's receiver.

pub mod providers;
pub mod types;

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};

use crate::config::RegionRegistry;
use crate::models::{day_key, RawArticle, STAMP_FORMAT};
use crate::notify::{Notification, Notifier};
use crate::store::{join_key, write_json, Store};
use crate::telemetry::ensure_metrics_described;
use crate::tracking::{FingerprintStore, StatusLedger};
use types::{FeedEntry, FeedProvider};

/// Normalize feed text: decode entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap: 1500 chars
    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }

    out
}

/// Raw batch key: `raw/<region>/<utc day>/<feed>/fetched_<utc stamp>.json`.
pub fn raw_batch_key(region: &str, feed: &str, fetched_at: DateTime<Utc>) -> String {
    join_key(&[
        "raw",
        region,
        &day_key(fetched_at.date_naive()),
        feed,
        &format!("fetched_{}.json", fetched_at.format(STAMP_FORMAT)),
    ])
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FetchReport {
    pub batches: Vec<String>,
    pub new_articles: usize,
    pub suppressed: usize,
    pub failed_sources: Vec<String>,
}

pub struct FetchStage {
    store: Arc<dyn Store>,
    registry: Arc<RegionRegistry>,
    fingerprints: FingerprintStore,
    notifier: Arc<dyn Notifier>,
    limit: usize,
}

impl FetchStage {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<RegionRegistry>,
        fingerprint_max_age_days: i64,
        notifier: Arc<dyn Notifier>,
        limit: usize,
    ) -> Self {
        let fingerprints = FingerprintStore::new(store.clone(), fingerprint_max_age_days);
        Self {
            store,
            registry,
            fingerprints,
            notifier,
            limit,
        }
    }

    /// Fetch every provider in order. One failing feed never stops the others.
    pub async fn run(&self, providers: &[Box<dyn FeedProvider>], now: DateTime<Utc>) -> FetchReport {
        ensure_metrics_described();
        let mut report = FetchReport::default();

        for p in providers {
            let Some(region) = self.registry.region_of_feed(p.name()) else {
                tracing::error!(target: "fetch", feed = p.name(), "feed is not assigned to any region; skipping");
                report.failed_sources.push(p.name().to_string());
                continue;
            };

            let entries = match p.fetch_entries().await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(target: "fetch", error = ?e, feed = p.name(), "feed error");
                    counter!("fetch_source_errors_total").increment(1);
                    report.failed_sources.push(p.name().to_string());
                    continue;
                }
            };

            match self.ingest_feed(p.as_ref(), region, entries, now).await {
                Ok(Some((key, kept, dropped))) => {
                    report.batches.push(key);
                    report.new_articles += kept;
                    report.suppressed += dropped;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(target: "fetch", error = ?e, feed = p.name(), "could not persist raw batch");
                    report.failed_sources.push(p.name().to_string());
                }
            }
        }

        gauge!("fetch_last_run_ts").set(now.timestamp() as f64);
        tracing::info!(
            target: "fetch",
            batches = report.batches.len(),
            new = report.new_articles,
            suppressed = report.suppressed,
            failed = report.failed_sources.len(),
            "fetch run finished"
        );
        report
    }

    /// Filter one feed's entries and persist the survivors.
    /// Returns `(batch key, kept, dropped)` or `None` when nothing was new.
    async fn ingest_feed(
        &self,
        p: &dyn FeedProvider,
        region: &str,
        entries: Vec<FeedEntry>,
        now: DateTime<Utc>,
    ) -> Result<Option<(String, usize, usize)>> {
        let today = now.date_naive();
        let seen = self.fingerprints.recent_links(p.name(), today);
        let mut ledger = StatusLedger::load(self.store.clone(), region);

        let mut in_batch = HashSet::new();
        let mut fresh = Vec::new();
        let mut dropped = 0usize;
        for e in entries.into_iter().take(self.limit) {
            let link = e.link.trim().to_string();
            let keep = !link.is_empty()
                && !seen.contains(&link)
                && !ledger.is_done(&link)
                && in_batch.insert(link.clone());
            let Some(published) = e.published.filter(|_| keep) else {
                dropped += 1;
                continue;
            };
            fresh.push(RawArticle {
                title: normalize_text(&e.title),
                link,
                published,
                summary: normalize_text(&e.summary),
                source_name: p.name().to_string(),
                source_url: p.url().to_string(),
                region: region.to_string(),
            });
        }
        counter!("fetch_suppressed_total").increment(dropped as u64);

        if fresh.is_empty() {
            tracing::debug!(target: "fetch", feed = p.name(), dropped, "no new articles");
            return Ok(None);
        }

        let key = raw_batch_key(region, p.name(), now);
        write_json(self.store.as_ref(), &key, &fresh)?;
        self.fingerprints
            .record_seen(p.name(), today, fresh.iter().map(|a| a.link.clone()))?;
        for a in &fresh {
            ledger.mark_fetched(&a.link);
        }
        // Persist before notifying so the receiver never races an unsaved ledger.
        ledger.save()?;
        counter!("fetch_articles_new_total").increment(fresh.len() as u64);

        tracing::info!(target: "fetch", feed = p.name(), region, count = fresh.len(), %key, "saved raw batch");
        self.notifier
            .send(&Notification::summarize(region, p.name(), &key))
            .await;

        Ok(Some((key, fresh.len(), dropped)))
    }
}
