// src/ranking/mod.rs
//! Per-region, per-local-day top-K snapshots built from the score cache.

pub mod snapshot;
pub mod topk;

pub use snapshot::load_snapshot;
pub use topk::{local_day, rank, snapshot_key, SnapshotOutcome, SnapshotStatus, TopKEngine};
