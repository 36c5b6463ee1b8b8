// tests/run_all_e2e.rs
use std::io;
use std::sync::Arc;

use chrono::{TimeZone, Utc};

use news_ranker::ingest::providers::RssFeedProvider;
use news_ranker::ingest::types::FeedProvider;
use news_ranker::notify::NoopNotifier;
use news_ranker::ranking::load_snapshot;
use news_ranker::store::write_json;
use news_ranker::{FsStore, MemStore, Pipeline, PipelineConfig, RawArticle, Store};

const CFG: &str = r#"
top_k = 2

[regions.us]
timezone = "America/New_York"
sources = ["wire", "daily"]

[sources]
wire = "https://wire.example/rss"
daily = "https://daily.example/rss"
"#;

fn feed(items: &[(&str, &str, &str)]) -> String {
    let body: String = items
        .iter()
        .map(|(title, link, date)| {
            format!("<item><title>{title}</title><link>{link}</link><pubDate>{date}</pubDate></item>")
        })
        .collect();
    format!(r#"<?xml version="1.0"?><rss version="2.0"><channel>{body}</channel></rss>"#)
}

#[tokio::test]
async fn fetch_cluster_rank_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn Store> = Arc::new(FsStore::new(dir.path()));
    let cfg: PipelineConfig = toml::from_str(CFG).unwrap();
    let pipeline = Pipeline::from_config(&cfg, store.clone()).unwrap();

    let wire = feed(&[
        ("Senate passes budget bill", "https://wire.example/1", "Mon, 01 Jan 2024 15:00:00 +0000"),
        ("Snowstorm closes schools", "https://wire.example/2", "Mon, 01 Jan 2024 16:00:00 +0000"),
        ("Local team wins title", "https://wire.example/3", "Mon, 01 Jan 2024 17:00:00 +0000"),
    ]);
    let daily = feed(&[(
        "Senate passes budget bill after long debate",
        "https://daily.example/9",
        "Mon, 01 Jan 2024 14:00:00 +0000",
    )]);
    let providers: Vec<Box<dyn FeedProvider>> = vec![
        Box::new(RssFeedProvider::from_fixture("wire", "https://wire.example/rss", &wire)),
        Box::new(RssFeedProvider::from_fixture("daily", "https://daily.example/rss", &daily)),
    ];

    let now = Utc.with_ymd_and_hms(2024, 1, 1, 20, 0, 0).unwrap();
    let report = pipeline.run_all(&providers, Arc::new(NoopNotifier), now).await;
    assert!(report.failed_regions.is_empty());
    assert_eq!(report.fetch.new_articles, 4);
    assert_eq!(report.runs.len(), 1);
    let cluster = &report.runs[0].cluster;
    assert_eq!((cluster.groups, cluster.scored), (3, 3));

    // Every raw batch archived, nothing left pending.
    assert!(store.list("raw").unwrap().is_empty());
    assert_eq!(store.list("archive/raw/us").unwrap().len(), 2);
    assert!(pipeline.pending_days("us").unwrap().is_empty());

    // Scoring is disabled: impact 0 everywhere, so frequency decides.
    let top = load_snapshot(store.as_ref(), pipeline.registry(), "us", "2024-01-01").unwrap();
    assert_eq!(top.len(), 2);
    assert_eq!(top[0].frequency, 2);
    assert_eq!(top[0].published, Utc.with_ymd_and_hms(2024, 1, 1, 14, 0, 0).unwrap());

    // A second pass over the same feeds is a no-op.
    let report = pipeline.run_all(&providers, Arc::new(NoopNotifier), now).await;
    assert_eq!(report.fetch.new_articles, 0);
    assert!(report.runs.is_empty());
    assert!(report.failed_regions.is_empty());
}

/// Refuses every write to one region's status ledger.
struct LedgerOutage {
    inner: MemStore,
    region: &'static str,
}

impl Store for LedgerOutage {
    fn read(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        self.inner.read(key)
    }
    fn write(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        if key == format!("ledger/article_status/{}.json", self.region) {
            return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
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

#[tokio::test]
async fn failing_region_does_not_block_the_others() {
    let store: Arc<dyn Store> = Arc::new(LedgerOutage {
        inner: MemStore::new(),
        region: "aa",
    });
    let cfg: PipelineConfig = toml::from_str(
        r#"
        [regions.aa]
        timezone = "UTC"

        [regions.zz]
        timezone = "UTC"
        "#,
    )
    .unwrap();
    let pipeline = Pipeline::from_config(&cfg, store.clone()).unwrap();

    for region in ["aa", "zz"] {
        let batch = vec![RawArticle {
            title: format!("Storm reaches {region}"),
            link: format!("https://wire.example/{region}"),
            published: Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
            summary: "Heavy rain".into(),
            source_name: "wire".into(),
            source_url: "https://wire.example/rss".into(),
            region: region.into(),
        }];
        let key = format!("raw/{region}/2024-01-01/wire/fetched_2024-01-01T10-00-00.json");
        write_json(store.as_ref(), &key, &batch).unwrap();
    }

    let providers: Vec<Box<dyn FeedProvider>> = Vec::new();
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 20, 0, 0).unwrap();
    let report = pipeline.run_all(&providers, Arc::new(NoopNotifier), now).await;

    assert_eq!(report.failed_regions, vec!["aa".to_string()]);
    assert_eq!(report.runs.len(), 1);
    assert_eq!(report.runs[0].cluster.region, "zz");
    assert_eq!(store.list("score_cache/zz").unwrap().len(), 1);
    assert!(store.exists("top_k_cache/zz/2024-01-01.json"));
    assert!(pipeline.pending_days("zz").unwrap().is_empty());

    // The failed region keeps its raw batch for the next run.
    assert_eq!(pipeline.pending_days("aa").unwrap().len(), 1);
}
