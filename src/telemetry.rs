// src/telemetry.rs
//! Tracing subscriber setup and metric descriptions.

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` drives the filter (default `info`). `LOG_FORMAT=json` switches to
/// one JSON object per line. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().compact().with_target(true)).try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// One-time metrics registration (so series show up once a recorder is installed).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("fetch_articles_new_total", "Articles written to raw batches.");
        describe_counter!(
            "fetch_suppressed_total",
            "Feed entries dropped as already seen, already scored or invalid."
        );
        describe_counter!("fetch_source_errors_total", "Feed fetch/parse errors.");
        describe_counter!("cluster_articles_total", "Pending articles entering clustering.");
        describe_counter!("cluster_groups_total", "Clusters formed.");
        describe_counter!("score_cache_hits_total", "Clusters served from the score cache.");
        describe_counter!("scoring_calls_total", "Calls made to the scoring function.");
        describe_counter!(
            "scoring_fallback_total",
            "Scoring calls that failed or timed out and used zero impact."
        );
        describe_counter!("raw_batch_errors_total", "Raw batch files that could not be read.");
        describe_counter!("raw_batches_archived_total", "Raw batch files moved to the archive.");
        describe_counter!("topk_snapshots_written_total", "Top-K snapshots (re)written.");
        describe_counter!(
            "topk_snapshots_frozen_total",
            "Top-K snapshots skipped because they are outside the rerun window."
        );
        describe_counter!("notify_sent_total", "Notifications delivered to a receiver socket.");
        describe_counter!("notify_errors_total", "Notifications that could not be delivered.");
        describe_counter!("receiver_messages_total", "Messages accepted by a region receiver.");
        describe_counter!("receiver_accept_errors_total", "Failed accepts on a receiver socket.");
        describe_counter!("pipeline_region_failures_total", "Regions that failed during run-all.");
        describe_histogram!("fetch_parse_ms", "Time spent parsing one feed document (ms).");
        describe_gauge!("fetch_last_run_ts", "Unix ts when the fetch stage last ran.");
        describe_gauge!("pipeline_last_run_ts", "Unix ts when a region pipeline last ran.");
    });
}
