// src/ingest/providers/rss.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use metrics::histogram;
use quick_xml::de::from_str;
use serde::Deserialize;
use std::time::Duration;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::ingest::types::{FeedEntry, FeedProvider};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

/// RFC 2822 (RSS) first, RFC 3339 as a fallback for feeds that use ISO dates.
pub fn parse_pub_date(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    if let Ok(dt) = OffsetDateTime::parse(ts, &Rfc2822) {
        return Utc.timestamp_opt(dt.unix_timestamp(), 0).single();
    }
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

const HEADERS_UA: &str = "Mozilla/5.0 (compatible; news-ranker/0.1)";

/// Generic RSS 2.0 feed. Either fetched over HTTP or parsed from an in-memory fixture.
pub struct RssFeedProvider {
    name: String,
    url: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http(reqwest::Client),
}

impl RssFeedProvider {
    pub fn from_url(name: &str, url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(HEADERS_UA)
            .timeout(Duration::from_secs(10))
            .build()
            .context("building feed http client")?;
        Ok(Self {
            name: name.to_string(),
            url: url.to_string(),
            mode: Mode::Http(client),
        })
    }

    /// Parse `xml` instead of fetching; `url` is still recorded as the source URL.
    pub fn from_fixture(name: &str, url: &str, xml: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn parse_items_from_str(s: &str) -> Result<Vec<FeedEntry>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;

        let out = rss
            .channel
            .item
            .into_iter()
            .map(|it| FeedEntry {
                title: it.title.unwrap_or_default(),
                link: it.link.unwrap_or_default().trim().to_string(),
                published: it.pub_date.as_deref().and_then(parse_pub_date),
                summary: it.description.unwrap_or_default(),
            })
            .collect();

        histogram!("fetch_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(out)
    }
}

#[async_trait]
impl FeedProvider for RssFeedProvider {
    async fn fetch_entries(&self) -> Result<Vec<FeedEntry>> {
        match &self.mode {
            Mode::Fixture(s) => Self::parse_items_from_str(s),
            Mode::Http(client) => {
                let body = client
                    .get(&self.url)
                    .send()
                    .await
                    .with_context(|| format!("GET {}", self.url))?
                    .error_for_status()
                    .with_context(|| format!("HTTP error for {}", self.url))?
                    .text()
                    .await
                    .with_context(|| format!("reading body of {}", self.url))?;
                Self::parse_items_from_str(&body)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self) -> &str {
        &self.url
    }
}

// quick-xml only knows the XML entities; feeds routinely carry HTML ones.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
