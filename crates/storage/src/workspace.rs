// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace registry and isolation.
//!
//! A workspace is a named isolation unit rooted under the WriteIt home
//! directory. Each workspace owns its own template directory, storage
//! engine, and cache namespace; every path the core derives for a
//! workspace must stay inside that workspace's root. The registry file
//! tracks the set of workspaces and the single active selection.

use crate::engine::{StorageConfig, StorageEngine, StorageError};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{error, info};
use writeit_core::WorkspaceName;

/// Name of the workspace seeded on first init.
pub const DEFAULT_WORKSPACE: &str = "default";

const REGISTRY_FILE: &str = "registry.toml";
const CONFIG_FILE: &str = "config";
const WORKSPACES_DIR: &str = "workspaces";
const TEMPLATES_DIR: &str = "templates";
const STORAGE_DIR: &str = "storage";
const CACHE_DIR: &str = "cache";

/// Errors from workspace operations.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("workspace '{0}' already exists")]
    Exists(WorkspaceName),
    #[error("workspace '{0}' not found")]
    NotFound(WorkspaceName),
    #[error("workspace '{0}' is active; switch the active workspace before removing it")]
    Active(WorkspaceName),
    #[error("invalid workspace name '{0}': use lowercase letters, digits, '-' and '_'")]
    InvalidName(String),
    #[error("isolation violation: path '{path}' escapes workspace '{workspace}'")]
    IsolationViolation {
        workspace: WorkspaceName,
        path: PathBuf,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("registry file is invalid: {0}")]
    RegistryParse(#[from] toml::de::Error),
    #[error("failed to serialize registry: {0}")]
    RegistrySerialize(#[from] toml::ser::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Per-workspace configuration, stored as TOML in `<root>/config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_map_size_bytes")]
    pub map_size_bytes: u64,
}

fn default_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_map_size_bytes() -> u64 {
    64 * 1024 * 1024
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            default_model: None,
            cache_ttl_secs: default_cache_ttl_secs(),
            map_size_bytes: default_map_size_bytes(),
        }
    }
}

/// A handle to one workspace: its name, root directory, and settings.
#[derive(Debug, Clone)]
pub struct Workspace {
    name: WorkspaceName,
    root: PathBuf,
    settings: WorkspaceSettings,
}

impl Workspace {
    pub fn name(&self) -> &WorkspaceName {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings(&self) -> &WorkspaceSettings {
        &self.settings
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.root.join(TEMPLATES_DIR)
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.root.join(STORAGE_DIR)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(CACHE_DIR)
    }

    /// Resolve a relative path against this workspace, proving containment.
    ///
    /// Rejects absolute paths and any traversal that would escape the
    /// workspace root. When the resolved path exists, canonical forms are
    /// compared as well so symlinks cannot smuggle a path outside.
    pub fn resolve(&self, relative: &Path) -> Result<PathBuf, WorkspaceError> {
        let violation = || {
            error!(
                workspace = %self.name,
                path = %relative.display(),
                "isolation violation"
            );
            WorkspaceError::IsolationViolation {
                workspace: self.name.clone(),
                path: relative.to_owned(),
            }
        };

        if relative.is_absolute() {
            return Err(violation());
        }

        // Lexical containment: normalize without touching the filesystem
        let mut depth: i64 = 0;
        for component in relative.components() {
            match component {
                Component::Normal(_) => depth += 1,
                Component::ParentDir => {
                    depth -= 1;
                    if depth < 0 {
                        return Err(violation());
                    }
                }
                Component::CurDir => {}
                Component::RootDir | Component::Prefix(_) => return Err(violation()),
            }
        }

        let resolved = self.root.join(relative);

        // Physical containment: if the path exists, its canonical form must
        // still live under the canonical workspace root.
        if resolved.exists() {
            let canonical_root = self.root.canonicalize()?;
            let canonical = resolved.canonicalize()?;
            if !canonical.starts_with(&canonical_root) {
                return Err(violation());
            }
        }

        Ok(resolved)
    }

    /// Open this workspace's storage engine.
    pub fn open_storage(&self) -> Result<StorageEngine, WorkspaceError> {
        let config = StorageConfig {
            map_size_bytes: self.settings.map_size_bytes,
            ..Default::default()
        };
        Ok(StorageEngine::open(&self.storage_dir(), &config)?)
    }

    fn load(name: WorkspaceName, root: PathBuf) -> Result<Self, WorkspaceError> {
        let config_path = root.join(CONFIG_FILE);
        let settings = if config_path.exists() {
            toml::from_str(&std::fs::read_to_string(&config_path)?)?
        } else {
            WorkspaceSettings::default()
        };
        Ok(Self {
            name,
            root,
            settings,
        })
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    active: String,
    #[serde(default)]
    workspaces: BTreeMap<String, WorkspaceRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceRecord {
    created_at: DateTime<Utc>,
}

/// Process-wide registry of workspaces under one home directory.
pub struct WorkspaceRegistry {
    home: PathBuf,
    inner: RwLock<RegistryFile>,
}

impl WorkspaceRegistry {
    /// Open the registry at `home`, creating the home directory and seeding
    /// a `default` workspace on first use. Idempotent.
    pub fn initialize(home: &Path) -> Result<Self, WorkspaceError> {
        std::fs::create_dir_all(home)?;
        let registry_path = home.join(REGISTRY_FILE);

        let inner = if registry_path.exists() {
            toml::from_str(&std::fs::read_to_string(&registry_path)?)?
        } else {
            RegistryFile {
                active: DEFAULT_WORKSPACE.to_string(),
                workspaces: BTreeMap::new(),
            }
        };

        let registry = Self {
            home: home.to_owned(),
            inner: RwLock::new(inner),
        };

        if !registry.inner.read().workspaces.contains_key(DEFAULT_WORKSPACE) {
            registry.create(&WorkspaceName::new(DEFAULT_WORKSPACE))?;
        } else {
            registry.save()?;
        }
        Ok(registry)
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    fn save(&self) -> Result<(), WorkspaceError> {
        let serialized = toml::to_string_pretty(&*self.inner.read())?;
        std::fs::write(self.home.join(REGISTRY_FILE), serialized)?;
        Ok(())
    }

    fn validate_name(name: &WorkspaceName) -> Result<(), WorkspaceError> {
        let valid = !name.as_str().is_empty()
            && name
                .as_str()
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
        if valid {
            Ok(())
        } else {
            Err(WorkspaceError::InvalidName(name.to_string()))
        }
    }

    /// Absolute root directory for a workspace name.
    pub fn path_for(&self, name: &WorkspaceName) -> PathBuf {
        self.home.join(WORKSPACES_DIR).join(name.as_str())
    }

    /// Create a workspace: directory layout, config file, registry entry.
    pub fn create(&self, name: &WorkspaceName) -> Result<Workspace, WorkspaceError> {
        Self::validate_name(name)?;
        if self.inner.read().workspaces.contains_key(name.as_str()) {
            return Err(WorkspaceError::Exists(name.clone()));
        }

        let root = self.path_for(name);
        std::fs::create_dir_all(root.join(TEMPLATES_DIR))?;
        std::fs::create_dir_all(root.join(STORAGE_DIR))?;
        std::fs::create_dir_all(root.join(CACHE_DIR))?;

        let settings = WorkspaceSettings::default();
        std::fs::write(root.join(CONFIG_FILE), toml::to_string_pretty(&settings)?)?;

        self.inner.write().workspaces.insert(
            name.to_string(),
            WorkspaceRecord {
                created_at: Utc::now(),
            },
        );
        self.save()?;
        info!(workspace = %name, root = %root.display(), "workspace created");

        Ok(Workspace {
            name: name.clone(),
            root,
            settings,
        })
    }

    /// Remove a workspace and its directory tree. The active workspace
    /// cannot be removed.
    pub fn remove(&self, name: &WorkspaceName) -> Result<(), WorkspaceError> {
        {
            let inner = self.inner.read();
            if !inner.workspaces.contains_key(name.as_str()) {
                return Err(WorkspaceError::NotFound(name.clone()));
            }
            if inner.active == name.as_str() {
                return Err(WorkspaceError::Active(name.clone()));
            }
        }

        let root = self.path_for(name);
        if root.exists() {
            std::fs::remove_dir_all(&root)?;
        }
        self.inner.write().workspaces.remove(name.as_str());
        self.save()?;
        info!(workspace = %name, "workspace removed");
        Ok(())
    }

    /// Select the process-wide active workspace.
    pub fn set_active(&self, name: &WorkspaceName) -> Result<(), WorkspaceError> {
        if !self.inner.read().workspaces.contains_key(name.as_str()) {
            return Err(WorkspaceError::NotFound(name.clone()));
        }
        self.inner.write().active = name.to_string();
        self.save()
    }

    /// The currently active workspace.
    pub fn active(&self) -> Result<Workspace, WorkspaceError> {
        let name = WorkspaceName::new(self.inner.read().active.clone());
        self.get(&name)
    }

    /// Load a workspace handle by name.
    pub fn get(&self, name: &WorkspaceName) -> Result<Workspace, WorkspaceError> {
        if !self.inner.read().workspaces.contains_key(name.as_str()) {
            return Err(WorkspaceError::NotFound(name.clone()));
        }
        Workspace::load(name.clone(), self.path_for(name))
    }

    /// All workspace names, sorted.
    pub fn list(&self) -> Vec<WorkspaceName> {
        self.inner
            .read()
            .workspaces
            .keys()
            .map(WorkspaceName::new)
            .collect()
    }
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;
