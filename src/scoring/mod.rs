//! Scoring seam: summary normalization plus per-region impact for one cluster.
//!
//! The scorer is an opaque async call. Callers go through [`score_or_fallback`],
//! which bounds the call with a timeout and never fails: on error the original
//! summary is kept and every configured region gets impact 0.

pub mod openai;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::config::ScoringConfig;

pub use openai::OpenAiScorer;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreRequest {
    pub title: String,
    pub summary: String,
    /// Region whose pipeline is scoring the cluster.
    pub region: String,
    /// Every configured region; impact is expected for each.
    pub regions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreOutcome {
    pub summary: String,
    pub impact: BTreeMap<String, i64>,
}

impl ScoreOutcome {
    /// Original summary, zero impact for every configured region.
    pub fn fallback(req: &ScoreRequest) -> Self {
        Self {
            summary: req.summary.clone(),
            impact: req.regions.iter().map(|r| (r.clone(), 0)).collect(),
        }
    }
}

#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, req: &ScoreRequest) -> Result<ScoreOutcome>;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

pub type DynScorer = Arc<dyn Scorer>;

/// Used when scoring is switched off: keeps the feed summary, impact 0 everywhere.
pub struct DisabledScorer;

#[async_trait]
impl Scorer for DisabledScorer {
    async fn score(&self, req: &ScoreRequest) -> Result<ScoreOutcome> {
        Ok(ScoreOutcome::fallback(req))
    }
    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Build a scorer according to config and environment.
pub fn build_scorer(cfg: &ScoringConfig) -> Result<DynScorer> {
    if !cfg.enabled {
        return Ok(Arc::new(DisabledScorer));
    }
    match cfg.provider.to_lowercase().as_str() {
        "openai" => Ok(Arc::new(OpenAiScorer::from_config(cfg)?)),
        other => anyhow::bail!("Unsupported scoring provider: {other}"),
    }
}

/// Run one scoring call bounded by `timeout`. Never fails.
pub async fn score_or_fallback(
    scorer: &dyn Scorer,
    req: &ScoreRequest,
    timeout: Duration,
) -> ScoreOutcome {
    counter!("scoring_calls_total").increment(1);
    let res = tokio::time::timeout(timeout, scorer.score(req)).await;
    let err = match res {
        Ok(Ok(mut outcome)) => {
            // Regions the scorer skipped rank as 0 rather than vanishing.
            for r in &req.regions {
                outcome.impact.entry(r.clone()).or_insert(0);
            }
            return outcome;
        }
        Ok(Err(e)) => format!("{e:#}"),
        Err(_) => format!("timed out after {}s", timeout.as_secs_f32()),
    };
    counter!("scoring_fallback_total").increment(1);
    tracing::warn!(
        target: "cluster",
        provider = scorer.name(),
        title = %req.title,
        error = %err,
        "scoring failed; using zero-impact fallback"
    );
    ScoreOutcome::fallback(req)
}
