//! Records persisted by the pipeline.
//!
//! - [`RawArticle`]: one item of a fetched raw batch
//! - [`ScoredArticle`]: content-addressed cache entry for a cluster
//! - [`ProcessLog`]: per-run observability record

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Calendar day format used in every store key.
pub const DAY_FORMAT: &str = "%Y-%m-%d";
/// Run/fetch timestamp format used in file names (no colons).
pub const STAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

pub fn day_key(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

pub fn parse_day(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, DAY_FORMAT).ok()
}

/// An article as written by the fetch stage. Immutable once persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawArticle {
    pub title: String,
    pub link: String,
    pub published: DateTime<Utc>,
    #[serde(default)]
    pub summary: String,
    pub source_name: String,
    pub source_url: String,
    pub region: String,
}

/// One cluster after scoring. `id` is derived from the representative's title and link.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoredArticle {
    #[serde(alias = "uuid")]
    pub id: String,
    pub title: String,
    pub summary: String,
    pub link: String,
    pub source_url: String,
    /// Earliest publish time in the cluster.
    pub published: DateTime<Utc>,
    /// Cluster size.
    pub frequency: u32,
    #[serde(default)]
    pub impact: BTreeMap<String, i64>,
}

impl ScoredArticle {
    /// Ranking score for `region`: impact (0 when missing) plus cluster size.
    pub fn rank_score(&self, region: &str) -> i64 {
        self.impact
            .get(region)
            .copied()
            .unwrap_or(0)
            .saturating_add(i64::from(self.frequency))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessLog {
    pub run_time: String,
    pub region: String,
    pub day: String,
    pub raw_batches_consumed: Vec<String>,
    pub cluster_ids_produced: Vec<String>,
    pub articles: usize,
    pub groups: usize,
    pub scored: usize,
    pub reused: usize,
}
