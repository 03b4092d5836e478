// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-workspace transactional key/value store.
//!
//! A thin contract over sled: named trees act as sub-databases, keys are
//! byte strings (bounded at [`MAX_KEY_BYTES`]), values are opaque bytes
//! whose serialization the caller chooses. Readers are concurrent; writers
//! serialize through a single writer lock so a batch is never interleaved
//! with another writer. Prefix scans iterate keys in lexicographic order.

use parking_lot::Mutex;
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Sub-database holding folded run records.
pub const PIPELINE_RUNS: &str = "pipeline_runs";
/// Sub-database holding the append-only event log.
pub const PIPELINE_EVENTS: &str = "pipeline_events";
/// Sub-database holding the persistent LLM cache tier.
pub const LLM_CACHE: &str = "llm_cache";
/// Sub-database holding stored template documents.
pub const TEMPLATES: &str = "templates";

/// Keys are bounded the way LMDB bounds them; oversized keys indicate a bug
/// in the caller's key scheme, not data.
pub const MAX_KEY_BYTES: usize = 511;

const ENOSPC: i32 = 28;

/// Errors from storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage is full; grow map_size_bytes for this workspace")]
    Full,
    #[error("transaction aborted, retry the batch")]
    TransactionAborted,
    #[error("storage corruption detected; workspace requires repair: {0}")]
    Corruption(String),
    #[error("key exceeds {MAX_KEY_BYTES} bytes ({0} bytes)")]
    KeyTooLarge(usize),
    #[error("sub-database limit reached ({0}); raise max_subdbs")]
    SubDbLimit(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        match err {
            sled::Error::Io(e) if e.raw_os_error() == Some(ENOSPC) => StorageError::Full,
            sled::Error::Io(e) => StorageError::Io(e),
            sled::Error::Corruption { .. } => StorageError::Corruption(err.to_string()),
            sled::Error::CollectionNotFound(_) => StorageError::Corruption(err.to_string()),
            other => StorageError::Backend(other.to_string()),
        }
    }
}

/// Store tuning knobs.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Cache/map budget for the store, in bytes.
    pub map_size_bytes: u64,
    /// Maximum number of named sub-databases.
    pub max_subdbs: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            map_size_bytes: 64 * 1024 * 1024,
            max_subdbs: 16,
        }
    }
}

/// A batch of writes that commits atomically across sub-databases.
#[derive(Debug, Default)]
pub struct Batch {
    ops: Vec<(String, BatchOp)>,
}

#[derive(Debug)]
enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(mut self, subdb: &str, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        self.ops
            .push((subdb.to_string(), BatchOp::Put(key.into(), value.into())));
        self
    }

    pub fn delete(mut self, subdb: &str, key: impl Into<Vec<u8>>) -> Self {
        self.ops
            .push((subdb.to_string(), BatchOp::Delete(key.into())));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// A workspace-owned key/value store with named sub-databases.
///
/// Owned by exactly one workspace; closed on workspace deactivation.
pub struct StorageEngine {
    db: sled::Db,
    path: PathBuf,
    max_subdbs: usize,
    trees: Mutex<HashMap<String, sled::Tree>>,
    writer: Mutex<()>,
}

impl StorageEngine {
    /// Open (or create) the store rooted at `dir`.
    pub fn open(dir: &Path, config: &StorageConfig) -> Result<Self, StorageError> {
        let db = sled::Config::new()
            .path(dir)
            .cache_capacity(config.map_size_bytes)
            .open()?;
        debug!(path = %dir.display(), "storage engine opened");
        Ok(Self {
            db,
            path: dir.to_owned(),
            max_subdbs: config.max_subdbs,
            trees: Mutex::new(HashMap::new()),
            writer: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tree(&self, subdb: &str) -> Result<sled::Tree, StorageError> {
        let mut trees = self.trees.lock();
        if let Some(tree) = trees.get(subdb) {
            return Ok(tree.clone());
        }
        if trees.len() >= self.max_subdbs {
            return Err(StorageError::SubDbLimit(self.max_subdbs));
        }
        let tree = self.db.open_tree(subdb)?;
        trees.insert(subdb.to_string(), tree.clone());
        Ok(tree)
    }

    fn check_key(key: &[u8]) -> Result<(), StorageError> {
        if key.len() > MAX_KEY_BYTES {
            return Err(StorageError::KeyTooLarge(key.len()));
        }
        Ok(())
    }

    pub fn put(&self, subdb: &str, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        Self::check_key(key)?;
        let tree = self.tree(subdb)?;
        let _writer = self.writer.lock();
        tree.insert(key, value)?;
        tree.flush()?;
        Ok(())
    }

    pub fn get(&self, subdb: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Self::check_key(key)?;
        let tree = self.tree(subdb)?;
        Ok(tree.get(key)?.map(|v| v.to_vec()))
    }

    /// Delete a key; returns whether it was present.
    pub fn delete(&self, subdb: &str, key: &[u8]) -> Result<bool, StorageError> {
        Self::check_key(key)?;
        let tree = self.tree(subdb)?;
        let _writer = self.writer.lock();
        let removed = tree.remove(key)?.is_some();
        tree.flush()?;
        Ok(removed)
    }

    pub fn exists(&self, subdb: &str, key: &[u8]) -> Result<bool, StorageError> {
        Self::check_key(key)?;
        let tree = self.tree(subdb)?;
        Ok(tree.contains_key(key)?)
    }

    /// Keys under `prefix`, in lexicographic order.
    pub fn list_keys(&self, subdb: &str, prefix: &[u8]) -> Result<Vec<Vec<u8>>, StorageError> {
        let tree = self.tree(subdb)?;
        let mut keys = Vec::new();
        for item in tree.scan_prefix(prefix) {
            let (key, _) = item?;
            keys.push(key.to_vec());
        }
        Ok(keys)
    }

    /// Number of entries under `prefix`.
    pub fn count_prefix(&self, subdb: &str, prefix: &[u8]) -> Result<usize, StorageError> {
        Ok(self.list_keys(subdb, prefix)?.len())
    }

    /// Commit a batch atomically; all writes land or none do.
    pub fn transaction(&self, batch: Batch) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }
        for (_, op) in &batch.ops {
            match op {
                BatchOp::Put(key, _) | BatchOp::Delete(key) => Self::check_key(key)?,
            }
        }

        // Resolve the distinct trees the batch touches, preserving first-use
        // order so op indices map onto the transactional view.
        let mut names: Vec<&str> = Vec::new();
        for (subdb, _) in &batch.ops {
            if !names.contains(&subdb.as_str()) {
                names.push(subdb);
            }
        }
        let mut trees = Vec::with_capacity(names.len());
        for name in &names {
            trees.push(self.tree(name)?);
        }
        let tree_refs: Vec<&sled::Tree> = trees.iter().collect();

        let _writer = self.writer.lock();
        let slice: &[&sled::Tree] = &tree_refs;
        let result: Result<(), TransactionError<()>> =
            slice.transaction(|txs: &Vec<sled::transaction::TransactionalTree>| {
                for (subdb, op) in &batch.ops {
                    let idx = names
                        .iter()
                        .position(|n| *n == subdb.as_str())
                        .ok_or(ConflictableTransactionError::Abort(()))?;
                    match op {
                        BatchOp::Put(key, value) => {
                            txs[idx].insert(key.as_slice(), value.as_slice())?;
                        }
                        BatchOp::Delete(key) => {
                            txs[idx].remove(key.as_slice())?;
                        }
                    }
                }
                Ok(())
            });

        match result {
            Ok(()) => {
                self.db.flush()?;
                Ok(())
            }
            Err(TransactionError::Abort(())) => Err(StorageError::TransactionAborted),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }

    /// Flush and release the store.
    pub fn close(self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
