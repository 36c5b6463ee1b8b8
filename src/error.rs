// src/error.rs
use thiserror::Error;

/// Deployment defects. These are surfaced to the caller, never swallowed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown region '{0}'")]
    UnknownRegion(String),

    #[error("region '{region}' has invalid timezone '{timezone}'")]
    InvalidTimezone { region: String, timezone: String },

    #[error("region '{region}' lists feed '{feed}' which has no URL in [sources]")]
    UnknownFeed { region: String, feed: String },

    #[error("region '{0}' has no receiver port configured")]
    MissingPort(String),

    #[error("no regions configured")]
    NoRegions,

    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
}

/// Read-side lookup failures for the snapshot API.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("no snapshot for {region} on {date}")]
    NotFound { region: String, date: String },

    #[error("snapshot unreadable: {0}")]
    Unreadable(String),
}
