// src/config/regions.rs
//! Static region registry: timezone, receiver port and feeds per region.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

use super::PipelineConfig;
use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct RegionSpec {
    pub name: String,
    pub timezone: Tz,
    pub port: Option<u16>,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RegionRegistry {
    regions: BTreeMap<String, RegionSpec>,
    /// feed name -> URL
    feeds: BTreeMap<String, String>,
}

impl RegionRegistry {
    pub fn from_config(cfg: &PipelineConfig) -> Result<Self, ConfigError> {
        if cfg.regions.is_empty() {
            return Err(ConfigError::NoRegions);
        }
        let mut regions = BTreeMap::new();
        for (name, rc) in &cfg.regions {
            let timezone: Tz = rc.timezone.parse().map_err(|_| ConfigError::InvalidTimezone {
                region: name.clone(),
                timezone: rc.timezone.clone(),
            })?;
            for feed in &rc.sources {
                if !cfg.sources.contains_key(feed) {
                    return Err(ConfigError::UnknownFeed {
                        region: name.clone(),
                        feed: feed.clone(),
                    });
                }
            }
            regions.insert(
                name.clone(),
                RegionSpec {
                    name: name.clone(),
                    timezone,
                    port: rc.port,
                    sources: rc.sources.clone(),
                },
            );
        }
        Ok(Self {
            regions,
            feeds: cfg.sources.clone(),
        })
    }

    /// Registry built in code, for tests and embedding. No feeds.
    pub fn from_timezones<'a>(
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, ConfigError> {
        let mut regions = BTreeMap::new();
        for (name, tz) in pairs {
            let timezone: Tz = tz.parse().map_err(|_| ConfigError::InvalidTimezone {
                region: name.to_string(),
                timezone: tz.to_string(),
            })?;
            regions.insert(
                name.to_string(),
                RegionSpec {
                    name: name.to_string(),
                    timezone,
                    port: None,
                    sources: Vec::new(),
                },
            );
        }
        if regions.is_empty() {
            return Err(ConfigError::NoRegions);
        }
        Ok(Self {
            regions,
            feeds: BTreeMap::new(),
        })
    }

    pub fn with_feed(mut self, region: &str, feed: &str, url: &str) -> Result<Self, ConfigError> {
        let spec = self
            .regions
            .get_mut(region)
            .ok_or_else(|| ConfigError::UnknownRegion(region.to_string()))?;
        spec.sources.push(feed.to_string());
        self.feeds.insert(feed.to_string(), url.to_string());
        Ok(self)
    }

    pub fn get(&self, region: &str) -> Result<&RegionSpec, ConfigError> {
        self.regions
            .get(region)
            .ok_or_else(|| ConfigError::UnknownRegion(region.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.regions.keys().cloned().collect()
    }

    pub fn timezone(&self, region: &str) -> Result<Tz, ConfigError> {
        self.get(region).map(|r| r.timezone)
    }

    pub fn port(&self, region: &str) -> Result<u16, ConfigError> {
        self.get(region)?
            .port
            .ok_or_else(|| ConfigError::MissingPort(region.to_string()))
    }

    /// Region-local calendar date of `now`.
    pub fn local_today(&self, region: &str, now: DateTime<Utc>) -> Result<NaiveDate, ConfigError> {
        Ok(now.with_timezone(&self.timezone(region)?).date_naive())
    }

    /// Region owning a feed; the first region listing it wins.
    pub fn region_of_feed(&self, feed: &str) -> Option<&str> {
        self.regions
            .values()
            .find(|r| r.sources.iter().any(|s| s == feed))
            .map(|r| r.name.as_str())
    }

    /// `(feed, url)` pairs for one region, or for every region when `None`.
    pub fn feeds_for(&self, region: Option<&str>) -> Result<Vec<(String, String)>, ConfigError> {
        let specs: Vec<&RegionSpec> = match region {
            Some(r) => vec![self.get(r)?],
            None => self.regions.values().collect(),
        };
        Ok(specs
            .into_iter()
            .flat_map(|spec| spec.sources.iter())
            .filter_map(|feed| self.feeds.get(feed).map(|url| (feed.clone(), url.clone())))
            .collect())
    }
}
