// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Render and call context assembly.
//!
//! A step sees: the run's validated inputs (with declared defaults filled
//! in), the outputs of every completed step as `{selected, responses}`
//! objects, the template's defaults tree, and a small `global` namespace
//! with run/workspace identity.

use serde_json::Value;
use writeit_core::{PipelineRun, StepKey};
use writeit_llm::CallContext;
use writeit_template::{PipelineTemplate, RenderContext};

/// Build the render context for a step of `run`.
pub fn step_context(run: &PipelineRun, template: &PipelineTemplate) -> RenderContext {
    let mut inputs = run.inputs.clone();
    for (key, spec) in &template.inputs {
        if !inputs.contains_key(key) {
            if let Some(default) = &spec.default {
                inputs.insert(key.clone(), default.clone());
            }
        }
    }

    let mut steps = serde_json::Map::new();
    for step in run.completed_steps() {
        let mut entry = serde_json::Map::new();
        entry.insert(
            "selected".into(),
            step.selected_response
                .as_ref()
                .map(|s| Value::String(s.clone()))
                .unwrap_or(Value::Null),
        );
        entry.insert(
            "responses".into(),
            Value::Array(
                step.responses
                    .iter()
                    .map(|r| Value::String(r.clone()))
                    .collect(),
            ),
        );
        steps.insert(step.step_key.to_string(), Value::Object(entry));
    }

    let mut global = serde_json::Map::new();
    global.insert("workspace".into(), Value::String(run.workspace.to_string()));
    global.insert("run_id".into(), Value::String(run.id.to_string()));
    global.insert(
        "template".into(),
        Value::String(template.metadata.name.clone()),
    );

    RenderContext::new()
        .with_inputs(inputs)
        .with_steps(steps)
        .with_defaults(template.defaults.clone())
        .with_global(global)
}

/// Cache/call context for a step's LLM call.
///
/// Deliberately excludes the run id so identical work across runs shares
/// cache entries; prior step outputs are already part of the rendered
/// prompt and need no separate representation here.
pub fn call_context(template: &PipelineTemplate, step_key: &StepKey) -> CallContext {
    let mut context = CallContext::new();
    context.insert(
        "template_id".into(),
        Value::String(template.id.to_string()),
    );
    context.insert("step".into(), Value::String(step_key.to_string()));
    context
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
