// src/scoring/openai.rs
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{ScoreOutcome, ScoreRequest, Scorer};
use crate::config::ScoringConfig;

/// OpenAI-compatible chat completion scorer. Requires an API key.
pub struct OpenAiScorer {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiScorer {
    pub fn from_config(cfg: &ScoringConfig) -> Result<Self> {
        let api_key = cfg.resolve_api_key()?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("news-ranker/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(cfg.timeout())
            .build()
            .context("building scoring http client")?;
        Ok(Self {
            http,
            api_key,
            model: cfg.model.clone(),
            endpoint: cfg.endpoint.clone(),
        })
    }
}

fn build_prompt(req: &ScoreRequest) -> String {
    let example: Vec<String> = req.regions.iter().map(|r| format!("\"{r}\": int")).collect();
    format!(
        "Summarize the following news article in 2-3 sentences and rate its importance (1-10) \
         for each of the following regions.\n\n\
         Source region: {region}\nRegions: {regions}\n\n\
         Title: {title}\nSummary: {summary}\n\n\
         Return only JSON:\n{{\"summary\": \"...\", \"impact\": {{{example}}}}}",
        region = req.region,
        regions = req.regions.join(", "),
        title = req.title,
        summary = req.summary,
        example = example.join(", "),
    )
}

#[derive(Deserialize)]
struct Reply {
    summary: String,
    impact: BTreeMap<String, serde_json::Value>,
}

static RE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```(?:json)?\s*(.*?)\s*```\s*$").expect("static regex"));

/// Impacts the prompt asks for, plus 0 for "no relevance".
pub const IMPACT_RANGE: RangeInclusive<i64> = 0..=10;

/// Parse the model's reply. Accepts fenced JSON and numeric strings for impacts.
pub fn parse_reply(content: &str) -> Result<ScoreOutcome> {
    let body = RE_FENCE
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(content)
        .trim();
    let reply: Reply = serde_json::from_str(body).context("model reply is not the expected JSON")?;

    let mut impact = BTreeMap::new();
    for (region, v) in reply.impact {
        let score = match &v {
            serde_json::Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.round() as i64)),
            serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
        .ok_or_else(|| anyhow!("impact for '{region}' is not an integer: {v}"))?;
        if !IMPACT_RANGE.contains(&score) {
            return Err(anyhow!("impact for '{region}' is outside {IMPACT_RANGE:?}: {score}"));
        }
        impact.insert(region, score);
    }

    let summary = reply.summary.trim().to_string();
    if summary.is_empty() {
        return Err(anyhow!("model returned an empty summary"));
    }
    Ok(ScoreOutcome { summary, impact })
}

#[async_trait]
impl Scorer for OpenAiScorer {
    async fn score(&self, req: &ScoreRequest) -> Result<ScoreOutcome> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let prompt = build_prompt(req);
        let body = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: "You are a news editor. Reply with JSON only.",
                },
                Msg {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: 0.0,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("scoring request failed")?
            .error_for_status()
            .context("scoring endpoint returned an error status")?;

        let parsed: Resp = resp.json().await.context("decoding scoring response")?;
        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| anyhow!("scoring response has no choices"))?;
        parse_reply(content)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
