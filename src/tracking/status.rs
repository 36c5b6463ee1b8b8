// src/tracking/status.rs
use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::store::{join_key, read_json, write_json, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    Fetched,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    #[serde(alias = "uuid", default)]
    pub assigned_id: Option<String>,
    pub status: ArticleStatus,
}

/// Link -> status map for one region, read and written as a whole document.
///
/// `done` is terminal: a link marked done is never downgraded and never re-scored.
pub struct StatusLedger {
    store: Arc<dyn Store>,
    key: String,
    entries: BTreeMap<String, StatusEntry>,
    dirty: bool,
}

impl StatusLedger {
    pub fn key_for(region: &str) -> String {
        join_key(&["ledger", "article_status", &format!("{region}.json")])
    }

    /// Load the region's ledger. A missing or unreadable document yields an empty ledger.
    pub fn load(store: Arc<dyn Store>, region: &str) -> Self {
        let key = Self::key_for(region);
        let entries = match read_json::<BTreeMap<String, StatusEntry>>(store.as_ref(), &key) {
            Ok(v) => v.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(%key, error = %e, "status ledger unreadable; starting empty");
                BTreeMap::new()
            }
        };
        Self {
            store,
            key,
            entries,
            dirty: false,
        }
    }

    pub fn get(&self, link: &str) -> Option<&StatusEntry> {
        self.entries.get(link)
    }

    pub fn status(&self, link: &str) -> Option<ArticleStatus> {
        self.entries.get(link).map(|e| e.status)
    }

    pub fn is_done(&self, link: &str) -> bool {
        self.status(link) == Some(ArticleStatus::Done)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a freshly ingested link. No-op when the link is already known.
    pub fn mark_fetched(&mut self, link: &str) -> bool {
        if self.entries.contains_key(link) {
            return false;
        }
        self.entries.insert(
            link.to_string(),
            StatusEntry {
                assigned_id: None,
                status: ArticleStatus::Fetched,
            },
        );
        self.dirty = true;
        true
    }

    /// Terminal transition. Returns false when the link was already done.
    pub fn mark_done(&mut self, link: &str, id: &str) -> bool {
        if self.is_done(link) {
            return false;
        }
        self.entries.insert(
            link.to_string(),
            StatusEntry {
                assigned_id: Some(id.to_string()),
                status: ArticleStatus::Done,
            },
        );
        self.dirty = true;
        true
    }

    /// Persist the whole ledger if anything changed since the last save.
    pub fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        write_json(self.store.as_ref(), &self.key, &self.entries)?;
        self.dirty = false;
        Ok(())
    }
}
