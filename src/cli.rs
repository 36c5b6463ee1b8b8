//! Command-line interface for the pipeline binary.
//!
//! Every stage can be triggered by hand, which is also how lost notifications are
//! made up for: re-running a stage over the same inputs is a no-op.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Pipeline config file (TOML or JSON)
    #[arg(short, long, env = "PIPELINE_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Fetch feeds, write raw batches and notify region receivers
    Fetch {
        /// Only fetch the feeds of this region
        #[arg(short, long)]
        region: Option<String>,
    },
    /// Cluster and score one region's raw batches for a day
    Summarize {
        region: String,
        /// UTC day partition (YYYY-MM-DD); defaults to today
        #[arg(short, long)]
        date: Option<String>,
    },
    /// Recompute top-K snapshots
    Topk {
        /// Regions to recompute; all configured regions when omitted
        #[arg(short, long)]
        region: Vec<String>,
        /// Override the configured rerun window
        #[arg(long)]
        rerun_window_days: Option<i64>,
    },
    /// Run a region receiver: cluster and rank on every notification
    Receive { region: String },
    /// Print a stored snapshot as JSON
    Show { region: String, date: String },
    /// Fetch, cluster every pending day and recompute, without sockets
    RunAll,
}
