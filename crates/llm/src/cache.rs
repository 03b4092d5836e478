// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Two-tier, content-addressed LLM response cache.
//!
//! The in-memory tier is an LRU map of bounded size; the persistent tier is
//! the workspace's `llm_cache` sub-database and is authoritative (memory
//! copies are hints). Keys are a truncated SHA-256 of the canonical JSON of
//! `{prompt, model, context, workspace}`, so rearranging context insertion
//! order never changes the key, and the workspace name keeps entries from
//! crossing workspace boundaries even if stores were ever shared.

use crate::client::CallContext;
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use writeit_core::{Clock, ModelId, SystemClock, TokenUsage, WorkspaceName};
use writeit_storage::{StorageEngine, StorageError, LLM_CACHE};

/// Maximum entries held in the memory tier.
pub const DEFAULT_MEMORY_ENTRIES: usize = 1000;

/// Default entry TTL: 24 hours.
pub const DEFAULT_TTL_SECS: u64 = 24 * 60 * 60;

const KEY_HEX_LEN: usize = 16;

/// Errors from cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("cache entry serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Recursively sort object keys so serialization is canonical.
fn canonical(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut sorted: Vec<(&String, &serde_json::Value)> = map.iter().collect();
            sorted.sort_by_key(|(k, _)| k.as_str());
            let mut out = serde_json::Map::with_capacity(sorted.len());
            for (k, v) in sorted {
                out.insert(k.clone(), canonical(v));
            }
            serde_json::Value::Object(out)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(canonical).collect())
        }
        other => other.clone(),
    }
}

fn digest16(value: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..KEY_HEX_LEN].to_string()
}

/// Deterministic 16-hex-char cache key over prompt, model, context, and
/// workspace.
pub fn cache_key(
    prompt: &str,
    model: &ModelId,
    context: &CallContext,
    workspace: &WorkspaceName,
) -> String {
    let content = serde_json::json!({
        "context": context,
        "model": model.as_str(),
        "prompt": prompt.trim(),
        "workspace": workspace.as_str(),
    });
    digest16(&canonical(&content))
}

fn context_digest(context: &CallContext) -> String {
    digest16(&canonical(&serde_json::json!(context)))
}

fn persistent_key(key: &str) -> String {
    format!("llm_cache_{key}")
}

/// A cached LLM response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub prompt: String,
    pub model: ModelId,
    pub response: String,
    pub tokens_used: TokenUsage,
    pub created_at: DateTime<Utc>,
    pub accessed_at: DateTime<Utc>,
    pub access_count: u64,
    pub ttl_secs: u64,
    pub context_digest: String,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let deadline = self.created_at + chrono::Duration::seconds(self.ttl_secs as i64);
        now > deadline
    }
}

/// Cache statistics for observability and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Entries currently held in the memory tier.
    pub entries: usize,
    pub hit_rate: f64,
}

#[derive(Default)]
struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Per-workspace two-tier cache.
pub struct LlmCache<C: Clock = SystemClock> {
    workspace: WorkspaceName,
    engine: Arc<StorageEngine>,
    memory: Mutex<LruCache<String, CacheEntry>>,
    counters: Mutex<Counters>,
    default_ttl_secs: u64,
    clock: C,
}

impl LlmCache {
    pub fn new(engine: Arc<StorageEngine>, workspace: WorkspaceName) -> Self {
        Self::with_parts(
            engine,
            workspace,
            DEFAULT_MEMORY_ENTRIES,
            DEFAULT_TTL_SECS,
            SystemClock,
        )
    }
}

impl<C: Clock> LlmCache<C> {
    pub fn with_parts(
        engine: Arc<StorageEngine>,
        workspace: WorkspaceName,
        memory_entries: usize,
        default_ttl_secs: u64,
        clock: C,
    ) -> Self {
        let capacity =
            NonZeroUsize::new(memory_entries.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            workspace,
            engine,
            memory: Mutex::new(LruCache::new(capacity)),
            counters: Mutex::new(Counters::default()),
            default_ttl_secs,
            clock,
        }
    }

    pub fn workspace(&self) -> &WorkspaceName {
        &self.workspace
    }

    fn key_for(&self, prompt: &str, model: &ModelId, context: &CallContext) -> String {
        cache_key(prompt, model, context, &self.workspace)
    }

    /// Look up a cached response, honoring TTL and updating access stats on
    /// a hit. Expired entries are removed and count as misses.
    pub fn get(
        &self,
        prompt: &str,
        model: &ModelId,
        context: &CallContext,
    ) -> Result<Option<CacheEntry>, CacheError> {
        let key = self.key_for(prompt, model, context);
        let now = self.clock.now();

        let mut entry = match self.memory.lock().get(&key).cloned() {
            Some(entry) => Some(entry),
            None => self.load_persistent(&key)?,
        };

        if let Some(ref e) = entry {
            if e.is_expired(now) {
                self.remove(&key)?;
                entry = None;
            }
        }

        match entry {
            Some(mut entry) => {
                entry.accessed_at = now;
                entry.access_count += 1;
                self.store_entry(entry.clone())?;
                self.counters.lock().hits += 1;
                debug!(key = %key, workspace = %self.workspace, "cache hit");
                Ok(Some(entry))
            }
            None => {
                self.counters.lock().misses += 1;
                Ok(None)
            }
        }
    }

    /// Cache a response in both tiers, returning the key.
    pub fn put(
        &self,
        prompt: &str,
        model: &ModelId,
        context: &CallContext,
        response: &str,
        tokens_used: TokenUsage,
        ttl_secs: Option<u64>,
    ) -> Result<String, CacheError> {
        let key = self.key_for(prompt, model, context);
        let now = self.clock.now();
        let entry = CacheEntry {
            key: key.clone(),
            prompt: prompt.to_string(),
            model: model.clone(),
            response: response.to_string(),
            tokens_used,
            created_at: now,
            accessed_at: now,
            access_count: 1,
            ttl_secs: ttl_secs.unwrap_or(self.default_ttl_secs),
            context_digest: context_digest(context),
        };
        self.store_entry(entry)?;
        Ok(key)
    }

    /// Drop one entry; returns whether anything was removed.
    pub fn invalidate(
        &self,
        prompt: &str,
        model: &ModelId,
        context: &CallContext,
    ) -> Result<bool, CacheError> {
        let key = self.key_for(prompt, model, context);
        self.remove(&key)
    }

    /// Drop every entry for this workspace; returns the count removed from
    /// the persistent tier.
    pub fn clear(&self) -> Result<usize, CacheError> {
        self.memory.lock().clear();
        let keys = self.engine.list_keys(LLM_CACHE, b"llm_cache_")?;
        for key in &keys {
            self.engine.delete(LLM_CACHE, key)?;
        }
        Ok(keys.len())
    }

    /// Sweep expired entries from both tiers; returns the count dropped.
    pub fn cleanup_expired(&self) -> Result<usize, CacheError> {
        let now = self.clock.now();
        let keys = self.engine.list_keys(LLM_CACHE, b"llm_cache_")?;
        let mut dropped = 0;
        for key in keys {
            let Some(bytes) = self.engine.get(LLM_CACHE, &key)? else {
                continue;
            };
            let Ok(entry) = serde_json::from_slice::<CacheEntry>(&bytes) else {
                // Unreadable entries are dropped with the expired ones
                self.engine.delete(LLM_CACHE, &key)?;
                dropped += 1;
                continue;
            };
            if entry.is_expired(now) {
                self.remove(&entry.key)?;
                dropped += 1;
            }
        }
        Ok(dropped)
    }

    pub fn stats(&self) -> CacheStats {
        let counters = self.counters.lock();
        let total = counters.hits + counters.misses;
        let hit_rate = if total > 0 {
            counters.hits as f64 / total as f64
        } else {
            0.0
        };
        CacheStats {
            hits: counters.hits,
            misses: counters.misses,
            evictions: counters.evictions,
            entries: self.memory.lock().len(),
            hit_rate,
        }
    }

    fn load_persistent(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        match self.engine.get(LLM_CACHE, persistent_key(key).as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Write an entry to both tiers, evicting LRU from memory when full.
    fn store_entry(&self, entry: CacheEntry) -> Result<(), CacheError> {
        let value = serde_json::to_vec(&entry)?;
        self.engine
            .put(LLM_CACHE, persistent_key(&entry.key).as_bytes(), &value)?;

        let mut memory = self.memory.lock();
        let key = entry.key.clone();
        if let Some((evicted_key, _)) = memory.push(key.clone(), entry) {
            if evicted_key != key {
                self.counters.lock().evictions += 1;
            }
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let in_memory = self.memory.lock().pop(key).is_some();
        let on_disk = self
            .engine
            .delete(LLM_CACHE, persistent_key(key).as_bytes())?;
        Ok(in_memory || on_disk)
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
