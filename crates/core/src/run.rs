// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run and step-execution records.
//!
//! A [`PipelineRun`] is only ever mutated by folding events (see
//! [`crate::state`]); everything here is plain data plus transition guards.

use crate::id::{ModelId, RunId, StepKey, TemplateId, WorkspaceName};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Created,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Created => "created",
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Status of a single step execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped | StepStatus::Cancelled
        )
    }

    /// Whether a transition from `self` to `to` is legal.
    ///
    /// Legal paths: `pending → running → {completed|failed|cancelled}`,
    /// `pending → skipped`, and the retry reset `{running|failed} → pending`.
    pub fn can_transition(&self, to: StepStatus) -> bool {
        use StepStatus::*;
        matches!(
            (self, to),
            (Pending, Running)
                | (Pending, Skipped)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Running, Pending)
                | (Failed, Pending)
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
            StepStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Execution record for one step of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecution {
    pub step_key: StepKey,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Inputs the rendered prompt was built from.
    #[serde(default)]
    pub inputs: serde_json::Map<String, serde_json::Value>,
    /// Generated responses (multi-sample; usually one).
    #[serde(default)]
    pub responses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_feedback: Option<String>,
    #[serde(default)]
    pub tokens_used: BTreeMap<ModelId, u64>,
    #[serde(default)]
    pub execution_time_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

pub(crate) fn default_max_retries() -> u32 {
    3
}

impl StepExecution {
    pub fn new(step_key: StepKey, max_retries: u32) -> Self {
        Self {
            step_key,
            status: StepStatus::Pending,
            started_at: None,
            completed_at: None,
            inputs: serde_json::Map::new(),
            responses: Vec::new(),
            selected_response: None,
            user_feedback: None,
            tokens_used: BTreeMap::new(),
            execution_time_secs: 0.0,
            error: None,
            retry_count: 0,
            max_retries,
        }
    }

    /// The step's output as seen by downstream steps: the selected response,
    /// falling back to the first generated response.
    pub fn output(&self) -> Option<&str> {
        self.selected_response
            .as_deref()
            .or_else(|| self.responses.first().map(String::as_str))
    }
}

/// A single execution of a pipeline template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: RunId,
    pub template_id: TemplateId,
    pub workspace: WorkspaceName,
    /// Validated user input values.
    #[serde(default)]
    pub inputs: serde_json::Map<String, serde_json::Value>,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Step executions in the order they were first started.
    #[serde(default)]
    pub steps: Vec<StepExecution>,
    /// Final outputs keyed by step, in template declaration order.
    #[serde(default)]
    pub outputs: IndexMap<StepKey, String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl PipelineRun {
    pub fn new(
        id: RunId,
        template_id: TemplateId,
        workspace: WorkspaceName,
        inputs: serde_json::Map<String, serde_json::Value>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            template_id,
            workspace,
            inputs,
            status: RunStatus::Created,
            created_at,
            started_at: None,
            completed_at: None,
            error: None,
            steps: Vec::new(),
            outputs: IndexMap::new(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn step(&self, key: &StepKey) -> Option<&StepExecution> {
        self.steps.iter().find(|s| &s.step_key == key)
    }

    pub fn step_mut(&mut self, key: &StepKey) -> Option<&mut StepExecution> {
        self.steps.iter_mut().find(|s| &s.step_key == key)
    }

    /// Find or append an execution record for `key`.
    pub fn step_mut_or_insert(&mut self, key: &StepKey, max_retries: u32) -> &mut StepExecution {
        if let Some(idx) = self.steps.iter().position(|s| &s.step_key == key) {
            &mut self.steps[idx]
        } else {
            self.steps.push(StepExecution::new(key.clone(), max_retries));
            // Just pushed, so the vec is non-empty
            let last = self.steps.len() - 1;
            &mut self.steps[last]
        }
    }

    pub fn completed_steps(&self) -> impl Iterator<Item = &StepExecution> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
