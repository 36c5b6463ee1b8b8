// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};

/// One feed item as delivered by a provider, before dedup and normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    /// `None` when the feed's date could not be parsed; such entries are dropped.
    pub published: Option<DateTime<Utc>>,
    pub summary: String,
}

#[async_trait::async_trait]
pub trait FeedProvider: Send + Sync {
    async fn fetch_entries(&self) -> Result<Vec<FeedEntry>>;
    /// Feed name as configured, e.g. "cnn".
    fn name(&self) -> &str;
    fn url(&self) -> &str;
}
