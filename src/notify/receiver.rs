// src/notify/receiver.rs
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, ToSocketAddrs};

use super::Notification;

/// Largest accepted message; anything beyond is truncated and fails to parse.
const MAX_MESSAGE_BYTES: u64 = 64 * 1024;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Work triggered by a notification addressed to this receiver's region.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn handle(&self, note: &Notification) -> Result<()>;
}

/// What happened to one accepted connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Handled,
    /// Addressed to another region.
    Ignored(String),
    Empty,
    Malformed(String),
    Failed(String),
}

/// Single-worker receiver for one region. Messages are handled one at a time,
/// fully, before the next connection is accepted.
pub struct RegionReceiver {
    region: String,
    listener: TcpListener,
    read_timeout: Duration,
}

impl RegionReceiver {
    pub async fn bind(region: &str, addr: impl ToSocketAddrs) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding receiver for region {region}"))?;
        Ok(Self {
            region: region.to_string(),
            listener,
            read_timeout: Duration::from_secs(5),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Accept and fully process one connection.
    pub async fn accept_one<H: NotificationHandler + ?Sized>(&self, handler: &H) -> Result<Delivery> {
        let (mut stream, peer) = self.listener.accept().await.context("accept")?;

        let mut buf = Vec::new();
        let read = tokio::time::timeout(
            self.read_timeout,
            (&mut stream).take(MAX_MESSAGE_BYTES).read_to_end(&mut buf),
        )
        .await;
        match read {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Ok(Delivery::Malformed(format!("read from {peer}: {e}"))),
            Err(_) => return Ok(Delivery::Malformed(format!("read from {peer} timed out"))),
        }
        if buf.iter().all(u8::is_ascii_whitespace) {
            return Ok(Delivery::Empty);
        }

        let note: Notification = match serde_json::from_slice(&buf) {
            Ok(n) => n,
            Err(e) => return Ok(Delivery::Malformed(e.to_string())),
        };
        if note.region != self.region {
            return Ok(Delivery::Ignored(note.region));
        }

        counter!("receiver_messages_total").increment(1);
        tracing::info!(target: "notify", region = %self.region, file = %note.file, source = %note.source, "received notification");
        match handler.handle(&note).await {
            Ok(()) => Ok(Delivery::Handled),
            Err(e) => Ok(Delivery::Failed(format!("{e:#}"))),
        }
    }

    /// Accept loop. Never returns; accept errors and per-message problems are
    /// logged and the next connection is awaited. Binding is the only fatal step.
    pub async fn serve<H: NotificationHandler + ?Sized>(&self, handler: &H) -> Result<()> {
        tracing::info!(target: "notify", region = %self.region, addr = ?self.listener.local_addr().ok(), "receiver listening");
        loop {
            let delivery = match self.accept_one(handler).await {
                Ok(d) => d,
                Err(e) => {
                    let error = format!("{e:#}");
                    counter!("receiver_accept_errors_total").increment(1);
                    tracing::warn!(target: "notify", region = %self.region, %error, "accept failed; retrying");
                    // EMFILE can persist for a while.
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };
            match delivery {
                Delivery::Handled => {}
                Delivery::Empty => {}
                Delivery::Ignored(other) => {
                    tracing::debug!(target: "notify", region = %self.region, %other, "ignoring message for another region")
                }
                Delivery::Malformed(reason) => {
                    tracing::warn!(target: "notify", region = %self.region, %reason, "malformed notification")
                }
                Delivery::Failed(error) => {
                    tracing::error!(target: "notify", region = %self.region, %error, "processing failed")
                }
            }
        }
    }
}
