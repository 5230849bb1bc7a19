//! The `Memory` named interface.
//!
//! The production markdown-backed store lives outside the core; the core only
//! needs store/recall/forget plus condensed bullets for prompt assembly.
//! [`KeywordMemory`] is the in-process default used headless and in tests.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

// ─── MemoryEntry ──────────────────────────────────────────────────────────────

/// A single memory record returned by [`Memory::recall()`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEntry {
    /// Namespaced lookup key (e.g. `"user:name"`, `"project:goal"`).
    pub key: String,
    pub content: String,
    /// Relevance score in [0, 1] — higher is more relevant.
    pub score: f32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

// ─── Memory trait ─────────────────────────────────────────────────────────────

/// Abstraction over the agent's long-term memory store.
///
/// Retrieval returns results sorted by descending relevance.
#[async_trait]
pub trait Memory: Send + Sync {
    /// Store or overwrite an entry identified by `key`.
    async fn store(&self, key: &str, content: &str) -> Result<()>;

    /// Keyword-search entries matching `query`, at most `limit` results.
    async fn recall(&self, query: &str, limit: usize) -> Result<Vec<MemoryEntry>>;

    /// Remove an entry. Returns `true` if it existed.
    async fn forget(&self, key: &str) -> Result<bool>;

    /// Condensed one-line bullets for the system prompt, newest first.
    async fn bullets(&self, limit: usize) -> Result<Vec<String>>;

    /// Number of stored entries.
    async fn count(&self) -> usize;
}

// ─── KeywordMemory ────────────────────────────────────────────────────────────

/// In-process store with token-overlap scoring.
pub struct KeywordMemory {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

impl KeywordMemory {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for KeywordMemory {
    fn default() -> Self {
        Self::new()
    }
}

fn score(query: &str, entry: &MemoryEntry) -> f32 {
    let haystack = format!("{} {}", entry.key, entry.content).to_lowercase();
    let terms: Vec<&str> = query.split_whitespace().collect();
    if terms.is_empty() {
        return 0.0;
    }
    let hits = terms
        .iter()
        .filter(|t| haystack.contains(&t.to_lowercase()))
        .count();
    hits as f32 / terms.len() as f32
}

#[async_trait]
impl Memory for KeywordMemory {
    async fn store(&self, key: &str, content: &str) -> Result<()> {
        let entry = MemoryEntry {
            key: key.to_string(),
            content: content.to_string(),
            score: 0.0,
            created_at: chrono::Utc::now(),
        };
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), entry);
        Ok(())
    }

    async fn recall(&self, query: &str, limit: usize) -> Result<Vec<MemoryEntry>> {
        let mut hits: Vec<MemoryEntry> = self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter_map(|e| {
                let s = score(query, e);
                (s > 0.0).then(|| {
                    let mut e = e.clone();
                    e.score = s;
                    e
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn forget(&self, key: &str) -> Result<bool> {
        Ok(self
            .entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key)
            .is_some())
    }

    async fn bullets(&self, limit: usize) -> Result<Vec<String>> {
        let mut entries: Vec<MemoryEntry> = self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries
            .into_iter()
            .take(limit)
            .map(|e| format!("{}: {}", e.key, e.content))
            .collect())
    }

    async fn count(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_and_recall_by_keyword() {
        let mem = KeywordMemory::new();
        mem.store("user:editor", "The user prefers Helix").await.unwrap();
        mem.store("project:goal", "Ship the parser rewrite").await.unwrap();

        let hits = mem.recall("which editor", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, "user:editor");
        assert!(hits[0].score > 0.0);
    }

    #[tokio::test]
    async fn recall_limit_respected() {
        let mem = KeywordMemory::new();
        for i in 0..10 {
            mem.store(&format!("note:{i}"), "rust rust rust").await.unwrap();
        }
        let hits = mem.recall("rust", 3).await.unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn forget_removes_entry() {
        let mem = KeywordMemory::new();
        mem.store("k", "v").await.unwrap();
        assert!(mem.forget("k").await.unwrap());
        assert!(!mem.forget("k").await.unwrap());
        assert_eq!(mem.count().await, 0);
    }

    #[tokio::test]
    async fn bullets_are_key_prefixed() {
        let mem = KeywordMemory::new();
        mem.store("user:tz", "UTC+2").await.unwrap();
        let bullets = mem.bullets(5).await.unwrap();
        assert_eq!(bullets, vec!["user:tz: UTC+2".to_string()]);
    }

    #[tokio::test]
    async fn store_overwrites_same_key() {
        let mem = KeywordMemory::new();
        mem.store("k", "old").await.unwrap();
        mem.store("k", "new").await.unwrap();
        assert_eq!(mem.count().await, 1);
        let hits = mem.recall("new", 1).await.unwrap();
        assert_eq!(hits[0].content, "new");
    }
}
