// src/ranking/snapshot.rs
//! Read side: resolve `(region, date)` to a stored top-K snapshot.

use crate::config::RegionRegistry;
use crate::error::LookupError;
use crate::models::{parse_day, ScoredArticle};
use crate::store::{read_json, Store};

use super::topk::snapshot_key;

pub fn load_snapshot(
    store: &dyn Store,
    registry: &RegionRegistry,
    region: &str,
    date: &str,
) -> Result<Vec<ScoredArticle>, LookupError> {
    registry.get(region)?;
    let day = parse_day(date).ok_or_else(|| LookupError::InvalidDate(date.to_string()))?;
    match read_json::<Vec<ScoredArticle>>(store, &snapshot_key(region, day)) {
        Ok(Some(articles)) => Ok(articles),
        Ok(None) => Err(LookupError::NotFound {
            region: region.to_string(),
            date: date.to_string(),
        }),
        Err(e) => Err(LookupError::Unreadable(format!("{e:#}"))),
    }
}
