// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod cli;
pub mod cluster;
pub mod config;
pub mod error;
pub mod ingest;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod ranking;
pub mod scoring;
pub mod store;
pub mod telemetry;
pub mod tracking;

// ---- Re-exports for stable public API ----
pub use crate::config::{PipelineConfig, RegionRegistry};
pub use crate::error::{ConfigError, LookupError};
pub use crate::models::{ProcessLog, RawArticle, ScoredArticle};
pub use crate::pipeline::{Pipeline, RegionPipeline, RunAllReport};
pub use crate::store::{FsStore, MemStore, Store};
