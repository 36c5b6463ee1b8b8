// src/cluster/cache.rs
//! Content-addressed score cache: `score_cache/<region>/<day>/<id>.json`.
//!
//! An id is scored at most once per region no matter which day partition the
//! entry landed in, so lookups go through an index over every partition.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sha2::{Digest, Sha256};

use crate::models::{day_key, ScoredArticle};
use crate::store::{join_key, key_stem, read_json, write_json, Store};

const CACHE_ROOT: &str = "score_cache";

/// Cluster id: lowercase hex SHA-256 of `"<title>-<link>"`.
pub fn article_id(title: &str, link: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"-");
    hasher.update(link.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

pub struct ScoreCache {
    store: Arc<dyn Store>,
}

/// id -> store key, over all day partitions of one region.
pub type CacheIndex = HashMap<String, String>;

impl ScoreCache {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn key_for(region: &str, day: NaiveDate, id: &str) -> String {
        join_key(&[CACHE_ROOT, region, &day_key(day), &format!("{id}.json")])
    }

    /// Every cached entry key for `region`, indexed by id.
    pub fn index(&self, region: &str) -> Result<CacheIndex> {
        let keys = self
            .store
            .list(&join_key(&[CACHE_ROOT, region]))
            .with_context(|| format!("listing score cache for {region}"))?;
        Ok(keys
            .into_iter()
            .filter(|k| k.ends_with(".json"))
            .map(|k| (key_stem(&k).to_string(), k))
            .collect())
    }

    /// Cached entry for `id`. Unreadable entries count as absent.
    pub fn get(&self, index: &CacheIndex, id: &str) -> Option<ScoredArticle> {
        let key = index.get(id)?;
        match read_json::<ScoredArticle>(self.store.as_ref(), key) {
            Ok(found) => found,
            Err(e) => {
                let error = format!("{e:#}");
                tracing::warn!(target: "cluster", %key, %error, "unreadable cache entry treated as absent");
                None
            }
        }
    }

    /// Write an entry and register it in `index`.
    pub fn put(
        &self,
        index: &mut CacheIndex,
        region: &str,
        day: NaiveDate,
        article: &ScoredArticle,
    ) -> Result<String> {
        let key = Self::key_for(region, day, &article.id);
        write_json(self.store.as_ref(), &key, article)?;
        index.insert(article.id.clone(), key.clone());
        Ok(key)
    }

    /// Every readable entry for `region`, in key order. Bad files are skipped.
    pub fn load_region(&self, region: &str) -> Result<Vec<ScoredArticle>> {
        let mut keys: Vec<String> = self.index(region)?.into_values().collect();
        keys.sort();
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            match read_json::<ScoredArticle>(self.store.as_ref(), &key) {
                Ok(Some(a)) => out.push(a),
                Ok(None) => {}
                Err(e) => {
                    let error = format!("{e:#}");
                    tracing::warn!(target: "topk", %key, %error, "skipping unreadable cache entry");
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn scored(id: &str) -> ScoredArticle {
        ScoredArticle {
            id: id.into(),
            title: "T".into(),
            summary: "S".into(),
            link: "https://x/1".into(),
            source_url: "https://x/rss".into(),
            published: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            frequency: 1,
            impact: BTreeMap::new(),
        }
    }

    #[test]
    fn id_is_sha256_of_title_dash_link() {
        assert_eq!(
            article_id("", ""),
            // sha256("-")
            "3973e022e93220f9212c18d0d0c543ae7c309e46640da93a4a0314de999f5112"
        );
        assert_eq!(article_id("a", "b").len(), 64);
        assert_ne!(article_id("a", "b"), article_id("a-b", ""));
    }

    #[test]
    fn lookup_spans_day_partitions() {
        let store = Arc::new(MemStore::new());
        let cache = ScoreCache::new(store.clone());
        let mut idx = cache.index("us").unwrap();
        assert!(idx.is_empty());

        let d1 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        cache.put(&mut idx, "us", d1, &scored("abc")).unwrap();

        let fresh = cache.index("us").unwrap();
        assert_eq!(fresh.get("abc").map(String::as_str), Some("score_cache/us/2024-01-01/abc.json"));
        assert_eq!(cache.get(&fresh, "abc").map(|a| a.id), Some("abc".to_string()));
        assert!(cache.index("eu").unwrap().is_empty());
    }

    #[test]
    fn corrupt_entries_are_absent_and_skipped() {
        let store = Arc::new(MemStore::new());
        store.write("score_cache/us/2024-01-01/bad.json", b"{oops").unwrap();
        let cache = ScoreCache::new(store.clone());
        let mut idx = cache.index("us").unwrap();
        assert!(cache.get(&idx, "bad").is_none());

        cache
            .put(&mut idx, "us", NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), &scored("good"))
            .unwrap();
        let all = cache.load_region("us").unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "good");
    }
}
