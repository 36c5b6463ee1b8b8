//! Whole-document storage used by every pipeline stage.
//!
//! Keys are `/`-separated relative paths (`raw/us/2024-01-01/cnn/fetched_x.json`).
//! Documents are always read and written as a whole; there is no partial update
//! and no locking. One writer per region is assumed.

pub mod fs;
pub mod memory;

use std::io;

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};

pub use fs::FsStore;
pub use memory::MemStore;

pub trait Store: Send + Sync {
    /// Returns `Ok(None)` when the key does not exist.
    fn read(&self, key: &str) -> io::Result<Option<Vec<u8>>>;
    /// Replaces the whole document at `key`.
    fn write(&self, key: &str, bytes: &[u8]) -> io::Result<()>;
    fn exists(&self, key: &str) -> bool;
    /// All keys below `prefix` (recursive), sorted.
    fn list(&self, prefix: &str) -> io::Result<Vec<String>>;
    fn rename(&self, from: &str, to: &str) -> io::Result<()>;
}

/// Reads and decodes a JSON document. Missing keys map to `Ok(None)`.
pub fn read_json<T: DeserializeOwned>(store: &dyn Store, key: &str) -> Result<Option<T>> {
    let Some(bytes) = store.read(key).with_context(|| format!("reading {key}"))? else {
        return Ok(None);
    };
    let value = serde_json::from_slice(&bytes).with_context(|| format!("decoding {key}"))?;
    Ok(Some(value))
}

pub fn write_json<T: Serialize + ?Sized>(store: &dyn Store, key: &str, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).with_context(|| format!("encoding {key}"))?;
    store
        .write(key, &bytes)
        .with_context(|| format!("writing {key}"))
}

/// Joins key segments with `/`.
pub fn join_key(parts: &[&str]) -> String {
    parts.join("/")
}

/// Last segment of a key without its `.json` extension.
pub fn key_stem(key: &str) -> &str {
    let name = key.rsplit('/').next().unwrap_or(key);
    name.strip_suffix(".json").unwrap_or(name)
}

pub(crate) fn validate_key(key: &str) -> io::Result<()> {
    if key.is_empty() || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid store key: {key:?}"),
        ));
    }
    Ok(())
}
