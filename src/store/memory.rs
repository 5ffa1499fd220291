//! In-memory [`KvStore`] backed by a concurrent map.

use dashmap::DashMap;

use crate::store::{glob_match, require, KvEntry, KvStore, StoreError};

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KvStore for MemoryStore {
    fn set(&self, key: &str, value: &str) -> Result<String, StoreError> {
        require(key, "key")?;
        require(value, "value")?;
        self.entries.insert(key.to_string(), value.to_string());
        Ok(value.to_string())
    }

    fn get(&self, key: &str) -> Result<String, StoreError> {
        require(key, "key")?;
        self.entries
            .get(key)
            .map(|v| v.value().clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn search(&self, pattern: &str, keywords: &[String]) -> Result<Vec<KvEntry>, StoreError> {
        require(pattern, "pattern")?;
        let mut found: Vec<KvEntry> = self
            .entries
            .iter()
            .filter(|e| glob_match(pattern, e.key()))
            .filter(|e| keywords.is_empty() || keywords.iter().any(|k| k == e.value()))
            .map(|e| KvEntry {
                key: e.key().clone(),
                value: e.value().clone(),
            })
            .collect();
        found.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(found)
    }

    fn delete(&self, keys: &[String]) -> Result<usize, StoreError> {
        if keys.is_empty() {
            return Err(StoreError::Empty("key list"));
        }
        for key in keys {
            require(key, "key")?;
        }
        Ok(keys
            .iter()
            .filter(|k| self.entries.remove(k.as_str()).is_some())
            .count())
    }
}
