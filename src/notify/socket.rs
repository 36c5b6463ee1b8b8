// src/notify/socket.rs
use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use metrics::counter;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use super::{Notification, Notifier};
use crate::config::RegionRegistry;

/// Sends each notification as one JSON document over a fresh TCP connection.
#[derive(Debug, Clone)]
pub struct SocketNotifier {
    host: String,
    ports: BTreeMap<String, u16>,
    timeout: Duration,
}

impl SocketNotifier {
    pub fn new(host: impl Into<String>, ports: BTreeMap<String, u16>) -> Self {
        Self {
            host: host.into(),
            ports,
            timeout: Duration::from_secs(3),
        }
    }

    /// Ports of every region that has one configured.
    pub fn from_registry(host: &str, registry: &RegionRegistry) -> Self {
        let ports = registry
            .names()
            .into_iter()
            .filter_map(|r| registry.port(&r).ok().map(|p| (r, p)))
            .collect();
        Self::new(host, ports)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn try_send(&self, note: &Notification) -> Result<()> {
        let port = *self
            .ports
            .get(&note.region)
            .ok_or_else(|| anyhow!("region '{}' has no receiver port", note.region))?;
        let payload = serde_json::to_vec(note).context("encoding notification")?;

        let deliver = async {
            let mut stream = TcpStream::connect((self.host.as_str(), port))
                .await
                .with_context(|| format!("connect {}:{port}", self.host))?;
            stream.write_all(&payload).await.context("write notification")?;
            stream.shutdown().await.context("close notification stream")?;
            Ok::<(), anyhow::Error>(())
        };
        tokio::time::timeout(self.timeout, deliver)
            .await
            .map_err(|_| anyhow!("notification timed out after {:?}", self.timeout))?
    }
}

#[async_trait]
impl Notifier for SocketNotifier {
    async fn send(&self, note: &Notification) {
        match self.try_send(note).await {
            Ok(()) => {
                counter!("notify_sent_total").increment(1);
                tracing::debug!(target: "notify", region = %note.region, file = %note.file, "notification sent");
            }
            Err(e) => {
                counter!("notify_errors_total").increment(1);
                let error = format!("{e:#}");
                tracing::warn!(target: "notify", region = %note.region, %error, "could not deliver notification");
            }
        }
    }
}
