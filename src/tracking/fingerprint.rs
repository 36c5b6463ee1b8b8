// src/tracking/fingerprint.rs
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, NaiveDate};

use crate::config::MAX_FINGERPRINT_AGE_DAYS;
use crate::models::{day_key, parse_day};
use crate::store::{join_key, key_stem, read_json, write_json, Store};

const ROOT: &str = "fingerprints";

/// Per-source, per-day sets of links already ingested.
///
/// Buckets older than `max_age_days` are not consulted. They are left on disk.
#[derive(Clone)]
pub struct FingerprintStore {
    store: Arc<dyn Store>,
    max_age_days: i64,
}

impl FingerprintStore {
    pub fn new(store: Arc<dyn Store>, max_age_days: i64) -> Self {
        Self {
            store,
            max_age_days: max_age_days.clamp(0, MAX_FINGERPRINT_AGE_DAYS),
        }
    }

    fn bucket_key(source: &str, day: NaiveDate) -> String {
        join_key(&[ROOT, source, &format!("{}.json", day_key(day))])
    }

    /// Union of every bucket for `source` dated within the window ending `today`.
    pub fn recent_links(&self, source: &str, today: NaiveDate) -> HashSet<String> {
        let cutoff = today
            .checked_sub_signed(Duration::days(self.max_age_days))
            .unwrap_or(NaiveDate::MIN);
        let keys = match self.store.list(&join_key(&[ROOT, source])) {
            Ok(k) => k,
            Err(e) => {
                tracing::warn!(target: "fetch", source, error = %e, "fingerprint listing failed");
                return HashSet::new();
            }
        };

        let mut seen = HashSet::new();
        for key in keys {
            let Some(day) = parse_day(key_stem(&key)) else {
                continue;
            };
            if day < cutoff {
                continue;
            }
            match read_json::<Vec<String>>(self.store.as_ref(), &key) {
                Ok(Some(links)) => seen.extend(links),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(target: "fetch", %key, error = %e, "skipping unreadable fingerprint bucket")
                }
            }
        }
        seen
    }

    pub fn has_seen(&self, source: &str, link: &str, today: NaiveDate) -> bool {
        self.recent_links(source, today).contains(link)
    }

    /// Merge `links` into the `(source, day)` bucket. Never drops existing entries.
    pub fn record_seen<I, S>(&self, source: &str, day: NaiveDate, links: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = Self::bucket_key(source, day);
        let mut all: BTreeSet<String> = match read_json::<Vec<String>>(self.store.as_ref(), &key) {
            Ok(existing) => existing.unwrap_or_default().into_iter().collect(),
            Err(e) => {
                tracing::warn!(target: "fetch", %key, error = %e, "fingerprint bucket unreadable; rebuilding");
                BTreeSet::new()
            }
        };
        let before = all.len();
        all.extend(links.into_iter().map(Into::into));
        if all.len() == before && self.store.exists(&key) {
            return Ok(());
        }
        let sorted: Vec<String> = all.into_iter().collect();
        write_json(self.store.as_ref(), &key, &sorted)
    }
}
