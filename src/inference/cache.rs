//! Concurrent memo table for composed schemas.
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::ir::SchemaNode;

/// Keys are lower-cased `out:<fqn>`, `out:<fqn>@<method>` or `in:<fqn>`,
/// optionally prefixed with `root:`.
#[derive(Debug, Default)]
pub struct SchemaCache {
    entries: DashMap<String, Cached>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// A composed schema and how many guard levels its computation went below
/// the level it started at.
#[derive(Debug, Clone)]
pub struct Cached {
    pub node: Arc<SchemaNode>,
    pub height: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Cached> {
        let found = self.entries.get(key).map(|e| e.value().clone());
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    pub fn insert(&self, key: String, node: SchemaNode, height: usize) {
        self.entries.insert(key, Cached { node: Arc::new(node), height });
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_hits_and_misses() {
        let cache = SchemaCache::new();
        assert!(cache.get("out:app\\user").is_none());
        cache.insert("out:app\\user".into(), SchemaNode::empty_object(), 2);
        assert_eq!(cache.get("out:app\\user").map(|c| c.height), Some(2));
        assert_eq!(cache.stats(), CacheStats { entries: 1, hits: 1, misses: 1 });
        cache.clear();
        assert!(cache.is_empty());
    }
}
