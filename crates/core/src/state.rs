// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Immutable, versioned pipeline state derived by folding events.
//!
//! State is never mutated in place: [`PipelineState::apply`] is a pure
//! transition function returning a new state with an incremented version,
//! parented at the previous version. Events are the ground truth; state
//! holds no back-pointer to them.

use crate::event::{EventPayload, PipelineEvent};
use crate::id::{ModelId, StepKey};
use crate::run::{PipelineRun, RunStatus, StepStatus};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Branch id assigned to every state that was not explicitly branched.
pub const MAIN_BRANCH: &str = "main";

/// Errors from applying an event to a state.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("run_created event applied to existing state for run {0}")]
    UnexpectedRunCreated(String),
    #[error("step {step} retried past max_retries ({max_retries})")]
    RetryLimitExceeded { step: StepKey, max_retries: u32 },
    #[error("step {step} cannot transition from {from} to {to}")]
    IllegalTransition {
        step: StepKey,
        from: StepStatus,
        to: StepStatus,
    },
}

/// A versioned snapshot of run state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub run: PipelineRun,
    pub version: u64,
    pub branch_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_version: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl PipelineState {
    /// Initial state (version 0) from a freshly created run.
    pub fn new(run: PipelineRun, created_at: DateTime<Utc>) -> Self {
        Self {
            run,
            version: 0,
            branch_id: MAIN_BRANCH.to_string(),
            parent_version: None,
            created_at,
        }
    }

    /// Copy-on-write: clone the run, apply `mutate`, and return a new state
    /// with `version + 1` parented at the current version.
    pub fn with_run(
        &self,
        created_at: DateTime<Utc>,
        mutate: impl FnOnce(&mut PipelineRun),
    ) -> Self {
        let mut run = self.run.clone();
        mutate(&mut run);
        Self {
            run,
            version: self.version + 1,
            branch_id: self.branch_id.clone(),
            parent_version: Some(self.version),
            created_at,
        }
    }

    /// Fork this state into a named branch at version 0.
    ///
    /// Branches share the parent's events up to this point; new events for a
    /// branch are appended under a derived run id (see [`crate::RunId::branched`]).
    pub fn branch(&self, branch_id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            run: self.run.clone(),
            version: 0,
            branch_id: branch_id.into(),
            parent_version: None,
            created_at,
        }
    }

    /// Apply one event, returning the next state.
    ///
    /// Every successful application bumps the version by exactly one, so a
    /// fold over events `1..=k` starting from `run_created` yields version
    /// `k - 1`. Events referencing steps that do not exist yet are treated
    /// as no-ops (the version still advances), matching replay tolerance for
    /// partially recorded histories.
    pub fn apply(&self, event: &PipelineEvent) -> Result<PipelineState, ApplyError> {
        let ts = event.timestamp;
        match &event.payload {
            EventPayload::RunCreated(_) => Err(ApplyError::UnexpectedRunCreated(
                event.run_id.to_string(),
            )),

            // A snapshot carries the authoritative state at its position.
            EventPayload::StateSnapshot { state } => Ok(state.clone()),

            EventPayload::RunStarted {} => Ok(self.with_run(ts, |run| {
                run.status = RunStatus::Running;
                run.started_at = Some(ts);
            })),

            EventPayload::RunCompleted { outputs } => Ok(self.with_run(ts, |run| {
                run.status = RunStatus::Completed;
                run.completed_at = Some(ts);
                run.outputs = outputs.clone();
            })),

            EventPayload::RunFailed { error } => Ok(self.with_run(ts, |run| {
                run.status = RunStatus::Failed;
                run.completed_at = Some(ts);
                run.error = Some(error.clone());
            })),

            EventPayload::RunCancelled {} => Ok(self.with_run(ts, |run| {
                run.status = RunStatus::Cancelled;
                run.completed_at = Some(ts);
            })),

            EventPayload::RunPaused {} => Ok(self.with_run(ts, |run| {
                run.status = RunStatus::Paused;
            })),

            EventPayload::RunResumed {} => Ok(self.with_run(ts, |run| {
                run.status = RunStatus::Running;
            })),

            EventPayload::StepStarted {
                step_key,
                max_retries,
            } => {
                if let Some(step) = self.run.step(step_key) {
                    if !step.status.can_transition(StepStatus::Running) {
                        return Err(ApplyError::IllegalTransition {
                            step: step_key.clone(),
                            from: step.status,
                            to: StepStatus::Running,
                        });
                    }
                }
                let max_retries = *max_retries;
                Ok(self.with_run(ts, move |run| {
                    let step = run.step_mut_or_insert(step_key, max_retries);
                    step.status = StepStatus::Running;
                    step.started_at = Some(ts);
                }))
            }

            EventPayload::StepCompleted {
                step_key,
                execution_time_secs,
                tokens_used,
            } => Ok(self.with_run(ts, |run| {
                if let Some(step) = run.step_mut(step_key) {
                    step.status = StepStatus::Completed;
                    step.completed_at = Some(ts);
                    step.execution_time_secs = *execution_time_secs;
                    step.tokens_used = tokens_used.clone();
                }
            })),

            EventPayload::StepFailed { step_key, error } => Ok(self.with_run(ts, |run| {
                if let Some(step) = run.step_mut(step_key) {
                    step.status = StepStatus::Failed;
                    step.completed_at = Some(ts);
                    step.error = Some(error.clone());
                }
            })),

            EventPayload::StepResponseGenerated {
                step_key,
                responses,
            } => Ok(self.with_run(ts, |run| {
                if let Some(step) = run.step_mut(step_key) {
                    step.responses = responses.clone();
                }
            })),

            EventPayload::StepResponseSelected { step_key, selected } => {
                Ok(self.with_run(ts, |run| {
                    if let Some(step) = run.step_mut(step_key) {
                        step.selected_response = Some(selected.clone());
                    }
                }))
            }

            EventPayload::StepFeedbackAdded { step_key, feedback } => {
                Ok(self.with_run(ts, |run| {
                    if let Some(step) = run.step_mut(step_key) {
                        step.user_feedback = Some(feedback.clone());
                    }
                }))
            }

            EventPayload::StepRetried {
                step_key,
                retry_count,
            } => {
                if let Some(step) = self.run.step(step_key) {
                    if *retry_count > step.max_retries {
                        return Err(ApplyError::RetryLimitExceeded {
                            step: step_key.clone(),
                            max_retries: step.max_retries,
                        });
                    }
                }
                let retry_count = *retry_count;
                Ok(self.with_run(ts, move |run| {
                    if let Some(step) = run.step_mut(step_key) {
                        step.status = StepStatus::Pending;
                        step.retry_count = retry_count;
                        step.error = None;
                    }
                }))
            }
        }
    }

    /// Fraction of `total_steps` that have completed.
    pub fn progress_fraction(&self, total_steps: usize) -> f64 {
        if total_steps == 0 {
            return 0.0;
        }
        self.run.completed_steps().count() as f64 / total_steps as f64
    }

    /// Pending steps whose declared dependencies have all completed,
    /// in the iteration order of `deps` (template declaration order).
    pub fn next_ready_steps<'a>(
        &self,
        deps: &'a IndexMap<StepKey, Vec<StepKey>>,
    ) -> Vec<&'a StepKey> {
        deps.iter()
            .filter(|(key, wants)| {
                let pending = match self.run.step(key) {
                    Some(step) => step.status == StepStatus::Pending,
                    None => true,
                };
                pending
                    && wants.iter().all(|dep| {
                        self.run
                            .step(dep)
                            .is_some_and(|s| s.status == StepStatus::Completed)
                    })
            })
            .map(|(key, _)| key)
            .collect()
    }

    /// Total tokens consumed across all steps.
    pub fn total_tokens(&self) -> u64 {
        self.run
            .steps
            .iter()
            .flat_map(|s| s.tokens_used.values())
            .sum()
    }

    /// Token totals grouped by model across all steps.
    pub fn tokens_by_model(&self) -> BTreeMap<ModelId, u64> {
        let mut totals: BTreeMap<ModelId, u64> = BTreeMap::new();
        for step in &self.run.steps {
            for (model, count) in &step.tokens_used {
                *totals.entry(model.clone()).or_default() += count;
            }
        }
        totals
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
