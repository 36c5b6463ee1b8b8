// src/tracking/mod.rs
//! Idempotency tracking.
//!
//! Two independent guards:
//! - [`FingerprintStore`] stops the fetch stage from re-downloading a link it saw recently.
//! - [`StatusLedger`] stops the clustering stage from scoring a link twice, ever.

pub mod fingerprint;
pub mod status;

pub use fingerprint::FingerprintStore;
pub use status::{ArticleStatus, StatusEntry, StatusLedger};
