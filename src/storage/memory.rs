//! In-memory store backend.
//!
//! Mirrors the Redis backend's semantics closely enough for local
//! development and tests: ranked sets return members in ascending score
//! order with ties broken by member name.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;
use crate::storage::{ArchiveStore, ScoredMember};

#[derive(Debug, Default)]
struct MemoryInner {
    strings: HashMap<String, String>,
    hashes: HashMap<String, HashMap<String, String>>,
    sets: HashMap<String, HashSet<String>>,
    zsets: HashMap<String, HashMap<String, f64>>,
}

/// In-memory store backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArchiveStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.strings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.strings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.strings.remove(key);
        inner.hashes.remove(key);
        inner.sets.remove(key);
        inner.zsets.remove(key);
        Ok(())
    }

    async fn set_many(&self, pairs: &[(String, String)]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for (key, value) in pairs {
            inner.strings.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn zadd(&self, key: &str, entries: &[ScoredMember]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let zset = inner.zsets.entry(key.to_string()).or_default();
        for entry in entries {
            zset.insert(entry.member.clone(), entry.score);
        }
        Ok(())
    }

    async fn zrange_all(&self, key: &str) -> Result<Vec<ScoredMember>> {
        let inner = self.inner.lock().unwrap();
        let mut members: Vec<ScoredMember> = inner
            .zsets
            .get(key)
            .map(|zset| {
                zset.iter()
                    .map(|(member, score)| ScoredMember::new(member.clone(), *score))
                    .collect()
            })
            .unwrap_or_default();
        members.sort_by(|a, b| {
            a.score
                .total_cmp(&b.score)
                .then_with(|| a.member.cmp(&b.member))
        });
        Ok(members)
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.zsets.get(key).and_then(|zset| zset.get(member)).copied())
    }

    async fn hset_many(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let hash = inner.hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn sadd(&self, key: &str, members: &[String]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let set = inner.sets.entry(key.to_string()).or_default();
        for member in members {
            set.insert(member.clone());
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }
}
