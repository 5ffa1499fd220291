//! Key/value storage behind the HTTP API.
//!
//! The server shell only needs the [`KvStore`] boundary; [`MemoryStore`] is
//! the in-process implementation used by the binary and the tests.

pub mod memory;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::MemoryStore;

/// One key/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvEntry {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{0} is empty")]
    Empty(&'static str),

    #[error("key {0:?} not found")]
    NotFound(String),

    #[error("batch is empty")]
    EmptyBatch,

    #[error("failed to set keys: {0:?}")]
    Batch(Vec<String>),
}

/// Storage operations exposed over HTTP.
pub trait KvStore: Send + Sync + 'static {
    /// Create or replace an entry; returns the stored value.
    fn set(&self, key: &str, value: &str) -> Result<String, StoreError>;

    /// Set every entry; reports all keys that could not be stored.
    fn set_batch(&self, entries: &[KvEntry]) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Err(StoreError::EmptyBatch);
        }
        let failed: Vec<String> = entries
            .iter()
            .filter(|e| self.set(&e.key, &e.value).is_err())
            .map(|e| e.key.clone())
            .collect();
        if failed.is_empty() {
            Ok(())
        } else {
            Err(StoreError::Batch(failed))
        }
    }

    fn get(&self, key: &str) -> Result<String, StoreError>;

    /// Entries whose key matches `pattern` (`*` and `?` wildcards) and, when
    /// `keywords` is non-empty, whose value equals one of the keywords.
    fn search(&self, pattern: &str, keywords: &[String]) -> Result<Vec<KvEntry>, StoreError>;

    /// Remove keys; returns how many existed.
    fn delete(&self, keys: &[String]) -> Result<usize, StoreError>;
}

/// Reject blank arguments the way every operation expects.
pub(crate) fn require(value: &str, what: &'static str) -> Result<(), StoreError> {
    if value.trim().is_empty() {
        Err(StoreError::Empty(what))
    } else {
        Ok(())
    }
}

/// Glob match supporting `*` (any run) and `?` (any single char).
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if let Some((star, matched)) = backtrack {
            pi = star + 1;
            ti = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}
