// src/store/memory.rs
use std::collections::BTreeMap;
use std::io;
use std::sync::Mutex;

use super::{validate_key, Store};

/// In-memory store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemStore {
    inner: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.inner.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Copy of every key/value pair, for before/after comparisons.
    pub fn dump(&self) -> BTreeMap<String, Vec<u8>> {
        self.map().clone()
    }
}

impl Store for MemStore {
    fn read(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        validate_key(key)?;
        Ok(self.map().get(key).cloned())
    }

    fn write(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        validate_key(key)?;
        self.map().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn exists(&self, key: &str) -> bool {
        self.map().contains_key(key)
    }

    fn list(&self, prefix: &str) -> io::Result<Vec<String>> {
        validate_key(prefix)?;
        let dir = format!("{prefix}/");
        Ok(self
            .map()
            .range(dir.clone()..)
            .take_while(|(k, _)| k.starts_with(&dir))
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        validate_key(to)?;
        let mut map = self.map();
        let bytes = map
            .remove(from)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, from.to_string()))?;
        map.insert(to.to_string(), bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_is_scoped_to_directory_prefix() {
        let s = MemStore::new();
        s.write("score_cache/us/2024-01-01/a.json", b"{}").unwrap();
        s.write("score_cache/us/2024-01-02/b.json", b"{}").unwrap();
        s.write("score_cache/usa/2024-01-01/c.json", b"{}").unwrap();

        let keys = s.list("score_cache/us").unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.iter().all(|k| k.starts_with("score_cache/us/")));
    }

    #[test]
    fn rename_missing_key_is_not_found() {
        let s = MemStore::new();
        let err = s.rename("a/b.json", "c/d.json").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
