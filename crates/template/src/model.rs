// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline template model.
//!
//! A template is an immutable, declarative description of a pipeline:
//! metadata, typed inputs, ordered steps with prompt templates and
//! dependencies, and a tree of substitutable defaults. Insertion order of
//! inputs and steps is not semantically significant but is preserved for
//! UI and for deterministic tie-breaking in the executor.

use indexmap::IndexMap;
use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use writeit_core::{ModelId, StepKey, TemplateId};

/// Template document metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Unknown metadata keys are preserved verbatim.
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// Kind of a declared input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Text,
    Choice,
}

/// One option of a `choice` input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChoiceOption {
    pub label: String,
    pub value: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ChoiceOptionRaw {
    Structured { label: String, value: String },
    Bare(String),
}

/// Accepts either `{ label, value }` or a bare string (label doubles as value).
impl<'de> Deserialize<'de> for ChoiceOption {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = ChoiceOptionRaw::deserialize(d)?;
        Ok(match raw {
            ChoiceOptionRaw::Structured { label, value } => ChoiceOption { label, value },
            ChoiceOptionRaw::Bare(s) => ChoiceOption {
                label: s.clone(),
                value: s,
            },
        })
    }
}

/// Declaration of a user-supplied input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    #[serde(rename = "type")]
    pub input_type: InputType,
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ChoiceOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

/// Kind of work a step performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    LlmGenerate,
    LlmRefine,
    UserSelection,
    Transform,
}

impl StepType {
    /// Whether this step dispatches an LLM call.
    pub fn calls_llm(&self) -> bool {
        matches!(self, StepType::LlmGenerate | StepType::LlmRefine)
    }
}

/// A step definition from the template document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    /// Step key (injected from the map key in the document).
    #[serde(default, skip_serializing)]
    pub key: StepKey,
    /// Display name (defaults to the step key).
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    #[serde(default)]
    pub prompt_template: String,
    #[serde(default)]
    pub model_preference: Vec<ModelId>,
    #[serde(default)]
    pub depends_on: Vec<StepKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<String>,
    #[serde(default)]
    pub user_feedback: bool,
}

/// An immutable, validated-on-load pipeline template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineTemplate {
    pub id: TemplateId,
    pub metadata: TemplateMetadata,
    /// Arbitrary nested scalars/maps substitutable as `{{ defaults.* }}`.
    #[serde(default)]
    pub defaults: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub inputs: IndexMap<String, InputSpec>,
    pub steps: IndexMap<StepKey, StepSpec>,
}

impl PipelineTemplate {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn step(&self, key: &StepKey) -> Option<&StepSpec> {
        self.steps.get(key)
    }

    /// `depends_on` relations in declaration order, for the executor and
    /// state derivations.
    pub fn dependencies(&self) -> IndexMap<StepKey, Vec<StepKey>> {
        self.steps
            .iter()
            .map(|(key, spec)| (key.clone(), spec.depends_on.clone()))
            .collect()
    }

    pub fn llm_step_count(&self) -> usize {
        self.steps
            .values()
            .filter(|s| s.step_type == StepType::LlmGenerate)
            .count()
    }

    /// Resolve a dotted path against the defaults tree.
    pub fn default_value(&self, segments: &[&str]) -> Option<&serde_json::Value> {
        let (first, rest) = segments.split_first()?;
        let mut current = self.defaults.get(*first)?;
        for segment in rest {
            current = current.as_object()?.get(*segment)?;
        }
        Some(current)
    }
}

/// Validate an untrusted map of user input values against the declared specs.
///
/// Returns issues (empty means valid); see [`crate::validate`] for the issue
/// type. Required values must be present and non-empty, values must match
/// the declared type, `choice` values must be one of the declared option
/// values, and text length is bounded by `max_length`.
pub(crate) fn check_input_value(
    key: &str,
    spec: &InputSpec,
    value: Option<&serde_json::Value>,
) -> Option<(String, String)> {
    let value = match value {
        Some(v) => v,
        None => {
            if spec.required && spec.default.is_none() {
                return Some((
                    crate::validate::codes::MISSING_REQUIRED_INPUT.to_string(),
                    format!("required input '{key}' is missing"),
                ));
            }
            return None;
        }
    };

    match spec.input_type {
        InputType::Text => {
            let text = match value.as_str() {
                Some(t) => t,
                None => {
                    return Some((
                        crate::validate::codes::INVALID_INPUT_TYPE.to_string(),
                        format!("input '{key}' must be text"),
                    ))
                }
            };
            if spec.required && text.trim().is_empty() {
                return Some((
                    crate::validate::codes::MISSING_REQUIRED_INPUT.to_string(),
                    format!("required input '{key}' is empty"),
                ));
            }
            if let Some(max) = spec.max_length {
                if text.chars().count() > max {
                    return Some((
                        crate::validate::codes::INPUT_TOO_LONG.to_string(),
                        format!("input '{key}' exceeds max_length {max}"),
                    ));
                }
            }
        }
        InputType::Choice => {
            let chosen = match value.as_str() {
                Some(c) => c,
                None => {
                    return Some((
                        crate::validate::codes::INVALID_INPUT_TYPE.to_string(),
                        format!("input '{key}' must be a choice value"),
                    ))
                }
            };
            if !spec.options.iter().any(|opt| opt.value == chosen) {
                let mut values: Vec<&str> =
                    spec.options.iter().map(|o| o.value.as_str()).collect();
                values.sort_unstable();
                return Some((
                    crate::validate::codes::INVALID_CHOICE.to_string(),
                    format!("input '{key}' must be one of: {}", values.join(", ")),
                ));
            }
        }
    }
    None
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
