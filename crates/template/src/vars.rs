// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Template variable extraction.
//!
//! Prompts reference context values as `{{ path.segments }}` (whitespace
//! tolerated around the path). Paths are dotted, with optional numeric
//! indexes for list access: `{{ steps.outline.responses[0] }}`.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Regex pattern for `{{ path }}` with whitespace-tolerant delimiters.
// Allow expect here as the regex is compile-time verified to be valid
#[allow(clippy::expect_used)]
pub static VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z0-9_-]+|\[[0-9]+\])*)\s*\}\}")
        .expect("constant regex pattern is valid")
});

/// One segment of a variable path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// A parsed variable path, e.g. `steps.outline.responses[0]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarPath {
    raw: String,
    segments: Vec<PathSegment>,
}

impl VarPath {
    /// Parse a raw path as matched by [`VAR_PATTERN`].
    pub fn parse(raw: &str) -> Self {
        let mut segments = Vec::new();
        for part in raw.split('.') {
            // Split trailing [n] indexes off each dotted part
            let mut rest = part;
            while let Some(open) = rest.find('[') {
                let (key, idx) = rest.split_at(open);
                if !key.is_empty() {
                    segments.push(PathSegment::Key(key.to_string()));
                }
                let idx = idx.trim_start_matches('[');
                match idx.find(']') {
                    Some(close) => {
                        if let Ok(n) = idx[..close].parse::<usize>() {
                            segments.push(PathSegment::Index(n));
                        }
                        rest = &idx[close + 1..];
                    }
                    None => {
                        rest = "";
                    }
                }
            }
            if !rest.is_empty() {
                segments.push(PathSegment::Key(rest.to_string()));
            }
        }
        Self {
            raw: raw.to_string(),
            segments,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// The leading namespace segment (`inputs`, `steps`, `defaults`, `global`).
    pub fn namespace(&self) -> Option<&str> {
        match self.segments.first() {
            Some(PathSegment::Key(k)) => Some(k.as_str()),
            _ => None,
        }
    }

    /// Key segments after the namespace, ignoring indexes.
    pub fn keys_after_namespace(&self) -> Vec<&str> {
        self.segments
            .iter()
            .skip(1)
            .filter_map(|s| match s {
                PathSegment::Key(k) => Some(k.as_str()),
                PathSegment::Index(_) => None,
            })
            .collect()
    }
}

impl fmt::Display for VarPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Extract every variable reference in `text`, in order of first appearance,
/// deduplicated by raw path.
pub fn extract_vars(text: &str) -> Vec<VarPath> {
    let mut seen = std::collections::HashSet::new();
    let mut vars = Vec::new();
    for cap in VAR_PATTERN.captures_iter(text) {
        let raw = &cap[1];
        if seen.insert(raw.to_string()) {
            vars.push(VarPath::parse(raw));
        }
    }
    vars
}

#[cfg(test)]
#[path = "vars_tests.rs"]
mod tests;
