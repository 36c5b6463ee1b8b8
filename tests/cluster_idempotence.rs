// tests/cluster_idempotence.rs
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;

use news_ranker::cluster::{group_articles, ClusterStage, DEFAULT_THRESHOLD};
use news_ranker::scoring::{ScoreOutcome, ScoreRequest, Scorer};
use news_ranker::store::write_json;
use news_ranker::tracking::StatusLedger;
use news_ranker::{MemStore, RawArticle, RegionRegistry, Store};

/// Records every title it is asked to score.
#[derive(Default)]
struct CountingScorer {
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl Scorer for CountingScorer {
    async fn score(&self, req: &ScoreRequest) -> Result<ScoreOutcome> {
        self.calls.lock().push(req.title.clone());
        Ok(ScoreOutcome {
            summary: req.summary.clone(),
            impact: req.regions.iter().map(|r| (r.clone(), 1)).collect(),
        })
    }
    fn name(&self) -> &'static str {
        "counting"
    }
}

/// Delegates to a MemStore but refuses ledger writes while `ledger_down` is set.
struct CrashingStore {
    inner: Arc<MemStore>,
    ledger_down: Mutex<bool>,
}

impl Store for CrashingStore {
    fn read(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        self.inner.read(key)
    }
    fn write(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        if key.starts_with("ledger/") && *self.ledger_down.lock() {
            return Err(io::Error::new(io::ErrorKind::Other, "simulated crash"));
        }
        self.inner.write(key, bytes)
    }
    fn exists(&self, key: &str) -> bool {
        self.inner.exists(key)
    }
    fn list(&self, prefix: &str) -> io::Result<Vec<String>> {
        self.inner.list(prefix)
    }
    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        self.inner.rename(from, to)
    }
}

fn article(title: &str, link: &str, summary: &str) -> RawArticle {
    RawArticle {
        title: title.into(),
        link: link.into(),
        published: Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
        summary: summary.into(),
        source_name: "wire".into(),
        source_url: "https://wire.example/rss".into(),
        region: "us".into(),
    }
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn registry() -> Arc<RegionRegistry> {
    Arc::new(RegionRegistry::from_timezones([("us", "America/New_York")]).unwrap())
}

fn seed_batches(store: &dyn Store) {
    write_json(
        store,
        "raw/us/2024-01-01/wire/fetched_2024-01-01T10-00-00.json",
        &vec![
            article("Central bank raises rates", "https://wire.example/1", "Rates up"),
            article("Wildfire spreads in California", "https://wire.example/2", "Fire"),
        ],
    )
    .unwrap();
    write_json(
        store,
        "raw/us/2024-01-01/daily/fetched_2024-01-01T11-00-00.json",
        &vec![
            article("Central bank raises rates again", "https://daily.example/7", "More"),
            // Same link as in the first batch: collapsed.
            article("Wildfire spreads in California", "https://wire.example/2", "Fire"),
        ],
    )
    .unwrap();
}

#[tokio::test]
async fn second_run_changes_nothing() {
    let store = Arc::new(MemStore::new());
    seed_batches(store.as_ref());
    let scorer = Arc::new(CountingScorer::default());
    let stage = ClusterStage::new(
        store.clone(),
        registry(),
        scorer.clone(),
        DEFAULT_THRESHOLD,
        Duration::from_secs(5),
    );
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

    let first = stage.update("us", day(), now).await.unwrap();
    assert_eq!((first.articles, first.groups, first.scored), (3, 2, 2));
    assert_eq!(first.batches_archived, 2);
    let snapshot = store.dump();

    let second = stage.update("us", day(), now).await.unwrap();
    assert_eq!((second.articles, second.scored), (0, 0));
    assert_eq!(store.dump(), snapshot, "second run must not touch the store");
    assert_eq!(scorer.calls.lock().len(), 2);
}

#[tokio::test]
async fn interrupted_run_never_rescores() {
    let mem = Arc::new(MemStore::new());
    seed_batches(mem.as_ref());
    let crashing = Arc::new(CrashingStore {
        inner: mem.clone(),
        ledger_down: Mutex::new(true),
    });
    let scorer = Arc::new(CountingScorer::default());
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

    // Dies right after the first cluster is cached, before its links are marked done.
    let stage = ClusterStage::new(
        crashing.clone(),
        registry(),
        scorer.clone(),
        DEFAULT_THRESHOLD,
        Duration::from_secs(5),
    );
    assert!(stage.update("us", day(), now).await.is_err());
    assert_eq!(scorer.calls.lock().len(), 1);
    assert!(StatusLedger::load(mem.clone(), "us").is_empty());

    *crashing.ledger_down.lock() = false;
    let resumed = stage.update("us", day(), now).await.unwrap();
    assert_eq!((resumed.reused, resumed.scored), (1, 1));

    let calls = scorer.calls.lock().clone();
    let mut unique = calls.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(calls.len(), unique.len(), "a title was scored twice: {calls:?}");

    let ledger = StatusLedger::load(mem.clone(), "us");
    for link in ["https://wire.example/1", "https://wire.example/2", "https://daily.example/7"] {
        assert!(ledger.is_done(link), "{link} not done");
    }
}

#[test]
fn threshold_decides_grouping() {
    let items = vec![article("A", "https://x/1", "a"), article("B", "https://x/2", "b")];

    let above = |x: &str, _: &str| if x == "A" { 0.9 } else { 0.0 };
    assert_eq!(group_articles(&items, DEFAULT_THRESHOLD, above), vec![vec![0, 1]]);

    let below = |_: &str, _: &str| 0.80;
    assert_eq!(group_articles(&items, DEFAULT_THRESHOLD, below), vec![vec![0], vec![1]]);
}

#[tokio::test]
async fn scorer_sees_every_configured_region() {
    let store = Arc::new(MemStore::new());
    seed_batches(store.as_ref());
    let reg = Arc::new(RegionRegistry::from_timezones([("us", "America/New_York"), ("eu", "Europe/Paris")]).unwrap());
    let scorer = Arc::new(CountingScorer::default());
    let stage = ClusterStage::new(store.clone(), reg, scorer, DEFAULT_THRESHOLD, Duration::from_secs(5));
    stage.update("us", day(), Utc::now()).await.unwrap();

    let cached = store.list("score_cache/us").unwrap();
    assert_eq!(cached.len(), 2);
    for key in cached {
        let bytes = store.read(&key).unwrap().unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let impact: BTreeMap<String, i64> = serde_json::from_value(v["impact"].clone()).unwrap();
        assert_eq!(impact.keys().cloned().collect::<Vec<_>>(), ["eu", "us"]);
    }
}
