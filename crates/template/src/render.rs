// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt rendering.
//!
//! Substitutes `{{ path }}` references against a nested context of
//! `inputs`, `steps`, `defaults`, and `global` maps. There is deliberately
//! no expression language: no conditionals, no loops, no filters.

use crate::vars::{extract_vars, PathSegment, VarPath, VAR_PATTERN};
use serde_json::Value;
use std::collections::BTreeSet;
use thiserror::Error;

/// How missing variables are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Missing variables are an error.
    #[default]
    Strict,
    /// Missing variables render as the empty string (and are recorded).
    Permissive,
    /// Missing variables are kept as literal `{{ path }}` placeholders.
    Preview,
}

/// Errors from strict rendering.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("missing template variable '{{{{ {path} }}}}'")]
    MissingVariable { path: String },
}

/// Nested lookup context for rendering.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    root: serde_json::Map<String, Value>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inputs(mut self, inputs: serde_json::Map<String, Value>) -> Self {
        self.root.insert("inputs".into(), Value::Object(inputs));
        self
    }

    pub fn with_steps(mut self, steps: serde_json::Map<String, Value>) -> Self {
        self.root.insert("steps".into(), Value::Object(steps));
        self
    }

    pub fn with_defaults(mut self, defaults: serde_json::Map<String, Value>) -> Self {
        self.root.insert("defaults".into(), Value::Object(defaults));
        self
    }

    pub fn with_global(mut self, global: serde_json::Map<String, Value>) -> Self {
        self.root.insert("global".into(), Value::Object(global));
        self
    }

    /// Resolve a parsed path to a context value.
    pub fn lookup(&self, path: &VarPath) -> Option<&Value> {
        let mut segments = path.segments().iter();
        let first = match segments.next() {
            Some(PathSegment::Key(k)) => k,
            _ => return None,
        };
        let mut current = self.root.get(first)?;
        for segment in segments {
            current = match segment {
                PathSegment::Key(k) => current.as_object()?.get(k)?,
                PathSegment::Index(i) => current.as_array()?.get(*i)?,
            };
        }
        Some(current)
    }
}

/// The outcome of a render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    /// Paths that resolved and were substituted.
    pub used: BTreeSet<String>,
    /// Paths that did not resolve (empty in strict mode).
    pub missing: BTreeSet<String>,
}

impl Rendered {
    pub fn success(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Canonical scalar rendering of a context value.
///
/// Booleans render as `true`/`false`; whole numbers render without a
/// fractional part; lists render as their compact JSON representation;
/// null renders empty. Step-output objects render through their
/// `selected` response, falling back to the first of `responses`.
fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                match n.as_f64() {
                    Some(f) if f.is_finite() && f.fract() == 0.0 => format!("{}", f as i64),
                    _ => n.to_string(),
                }
            }
        }
        Value::String(s) => s.clone(),
        Value::Array(_) => value.to_string(),
        Value::Object(map) => {
            if let Some(selected) = map.get("selected").and_then(Value::as_str) {
                return selected.to_string();
            }
            if let Some(first) = map
                .get("responses")
                .and_then(Value::as_array)
                .and_then(|a| a.first())
            {
                return render_value(first);
            }
            value.to_string()
        }
    }
}

/// Render `template` against `ctx` in the given mode.
pub fn render(
    template: &str,
    ctx: &RenderContext,
    mode: RenderMode,
) -> Result<Rendered, RenderError> {
    let mut used = BTreeSet::new();
    let mut missing = BTreeSet::new();

    for var in extract_vars(template) {
        if ctx.lookup(&var).is_some() {
            used.insert(var.raw().to_string());
        } else {
            if mode == RenderMode::Strict {
                return Err(RenderError::MissingVariable {
                    path: var.raw().to_string(),
                });
            }
            missing.insert(var.raw().to_string());
        }
    }

    let text = VAR_PATTERN
        .replace_all(template, |caps: &regex::Captures| {
            let path = VarPath::parse(&caps[1]);
            match ctx.lookup(&path) {
                Some(value) => render_value(value),
                None => match mode {
                    RenderMode::Preview => caps[0].to_string(),
                    _ => String::new(),
                },
            }
        })
        .into_owned();

    Ok(Rendered {
        text,
        used,
        missing,
    })
}

#[cfg(test)]
#[path = "render_tests.rs"]
mod tests;
