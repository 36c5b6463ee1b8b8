// src/notify/mod.rs
//! Point-to-point "work available" signal from the fetch stage to a region receiver.
//!
//! Delivery is fire-and-forget: at most once, no ack, no retry. Losing a message only
//! delays processing because every downstream stage is idempotent and can be
//! re-triggered by hand.

pub mod receiver;
pub mod socket;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::parse_day;

pub use receiver::{Delivery, NotificationHandler, RegionReceiver};
pub use socket::SocketNotifier;

pub const TASK_SUMMARIZE: &str = "summarize";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default = "default_task")]
    pub task: String,
    pub region: String,
    #[serde(default)]
    pub source: String,
    /// Store key of the raw batch that triggered the message.
    #[serde(default)]
    pub file: String,
}

fn default_task() -> String {
    TASK_SUMMARIZE.to_string()
}

impl Notification {
    pub fn summarize(region: &str, source: &str, file: &str) -> Self {
        Self {
            task: TASK_SUMMARIZE.to_string(),
            region: region.to_string(),
            source: source.to_string(),
            file: file.to_string(),
        }
    }

    /// Day partition named in the raw batch key (`raw/<region>/<day>/...`), if any.
    pub fn batch_day(&self) -> Option<NaiveDate> {
        let mut parts = self.file.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("raw"), Some(_region), Some(day)) => parse_day(day),
            _ => None,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Best effort. Implementations log failures instead of returning them.
    async fn send(&self, note: &Notification);
}

/// Drops every message. Used when stages run inline (`run-all`).
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, note: &Notification) {
        tracing::debug!(target: "notify", region = %note.region, file = %note.file, "notification dropped (inline run)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_day_from_key() {
        let n = Notification::summarize("us", "cnn", "raw/us/2024-01-02/cnn/fetched_x.json");
        assert_eq!(n.batch_day(), NaiveDate::from_ymd_opt(2024, 1, 2));
        let n = Notification::summarize("us", "cnn", "elsewhere/x.json");
        assert_eq!(n.batch_day(), None);
    }

    #[test]
    fn payload_defaults() {
        let n: Notification = serde_json::from_str(r#"{"region": "eu"}"#).unwrap();
        assert_eq!(n.task, "summarize");
        assert!(n.file.is_empty());
    }
}
