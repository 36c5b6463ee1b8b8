// src/config/mod.rs
//! Pipeline configuration: data layout, ranking knobs, regions, feeds and scoring.
//!
//! Loaded once per process from TOML or JSON. Lookup order:
//! 1) `$PIPELINE_CONFIG_PATH`
//! 2) `config/pipeline.toml`
//! 3) `config/pipeline.json`

pub mod regions;
pub mod scoring;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

pub use regions::{RegionRegistry, RegionSpec};
pub use scoring::ScoringConfig;

pub const ENV_CONFIG_PATH: &str = "PIPELINE_CONFIG_PATH";
pub const ENV_DATA_DIR: &str = "PIPELINE_DATA_DIR";

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_top_k() -> usize {
    5
}
fn default_rerun_window_days() -> i64 {
    2
}
fn default_max_age_days() -> i64 {
    30
}
fn default_fetch_limit() -> usize {
    50
}
fn default_similarity_threshold() -> f64 {
    0.85
}
fn default_receiver_host() -> String {
    "127.0.0.1".to_string()
}
fn default_notify_timeout_secs() -> u64 {
    3
}

/// Upper bound for `fingerprint_max_age_days`; about ten years.
pub const MAX_FINGERPRINT_AGE_DAYS: i64 = 3650;

#[derive(Debug, Clone, Deserialize)]
pub struct RegionConfig {
    /// IANA timezone name, e.g. "America/New_York".
    pub timezone: String,
    /// TCP port of this region's receiver.
    pub port: Option<u16>,
    /// Feed names (keys of `[sources]`) that belong to this region.
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_rerun_window_days")]
    pub rerun_window_days: i64,
    #[serde(default = "default_max_age_days")]
    pub fingerprint_max_age_days: i64,
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_receiver_host")]
    pub receiver_host: String,
    /// Connect/write timeout for notification sends.
    #[serde(default = "default_notify_timeout_secs")]
    pub notify_timeout_secs: u64,
    #[serde(default)]
    pub regions: BTreeMap<String, RegionConfig>,
    /// Feed name -> RSS URL.
    #[serde(default)]
    pub sources: BTreeMap<String, String>,
    #[serde(default)]
    pub scoring: ScoringConfig,
}

impl PipelineConfig {
    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs.max(1))
    }

    /// Load from an explicit path. Format follows the extension (toml/json).
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut cfg = parse_config(&content, &ext)
            .with_context(|| format!("parsing pipeline config {}", path.display()))?;
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
            }
            return Self::load_from(&pb);
        }
        for candidate in ["config/pipeline.toml", "config/pipeline.json"] {
            let p = PathBuf::from(candidate);
            if p.exists() {
                return Self::load_from(&p);
            }
        }
        Err(anyhow!(
            "no pipeline config found (set {ENV_CONFIG_PATH} or create config/pipeline.toml)"
        ))
    }

    fn apply_env_overrides(&mut self) {
        if let Some(dir) = std::env::var(ENV_DATA_DIR).ok().filter(|v| !v.trim().is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "top_k",
                reason: "must be at least 1".into(),
            });
        }
        if self.rerun_window_days < 0 {
            return Err(ConfigError::InvalidSetting {
                name: "rerun_window_days",
                reason: "must not be negative".into(),
            });
        }
        if !(0..=MAX_FINGERPRINT_AGE_DAYS).contains(&self.fingerprint_max_age_days) {
            return Err(ConfigError::InvalidSetting {
                name: "fingerprint_max_age_days",
                reason: format!(
                    "{} is outside 0..={MAX_FINGERPRINT_AGE_DAYS}",
                    self.fingerprint_max_age_days
                ),
            });
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::InvalidSetting {
                name: "similarity_threshold",
                reason: format!("{} is outside 0.0..=1.0", self.similarity_threshold),
            });
        }
        // Timezones and feed references are checked when the registry is built.
        RegionRegistry::from_config(self).map(|_| ())
    }
}

fn parse_config(s: &str, hint_ext: &str) -> Result<PipelineConfig> {
    match hint_ext {
        "json" => Ok(serde_json::from_str(s)?),
        "toml" => Ok(toml::from_str(s)?),
        _ => {
            if let Ok(v) = serde_json::from_str(s) {
                return Ok(v);
            }
            Ok(toml::from_str(s)?)
        }
    }
}
