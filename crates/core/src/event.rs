// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event records for run state transitions.
//!
//! Every mutation of a run is an append-only [`PipelineEvent`]. The record
//! serializes to the canonical wire shape
//! `{id, run_id, event_type, timestamp, sequence_number, data, metadata}`;
//! the `event_type`/`data` pair is a tagged [`EventPayload`] so the fold in
//! [`crate::state`] can switch exhaustively on typed variants.

use crate::id::{EventId, ModelId, RunId, StepKey};
use crate::run::PipelineRun;
use crate::state::PipelineState;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Typed event payloads, tagged by `event_type` with the payload under `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    /// First event of every stream: carries the initial run record.
    RunCreated(PipelineRun),
    RunStarted {},
    RunCompleted {
        outputs: IndexMap<StepKey, String>,
    },
    RunFailed {
        error: String,
    },
    RunPaused {},
    RunResumed {},
    RunCancelled {},
    StepStarted {
        step_key: StepKey,
        /// Retry budget for this step, fixed at first start.
        #[serde(default = "crate::run::default_max_retries")]
        max_retries: u32,
    },
    StepCompleted {
        step_key: StepKey,
        execution_time_secs: f64,
        #[serde(default)]
        tokens_used: BTreeMap<ModelId, u64>,
    },
    StepFailed {
        step_key: StepKey,
        error: String,
    },
    StepResponseGenerated {
        step_key: StepKey,
        responses: Vec<String>,
    },
    StepResponseSelected {
        step_key: StepKey,
        selected: String,
    },
    StepFeedbackAdded {
        step_key: StepKey,
        feedback: String,
    },
    StepRetried {
        step_key: StepKey,
        retry_count: u32,
    },
    /// Synthetic event carrying a full state payload to shorten replays.
    StateSnapshot {
        state: PipelineState,
    },
}

impl EventPayload {
    pub fn name(&self) -> &'static str {
        match self {
            EventPayload::RunCreated(_) => "run_created",
            EventPayload::RunStarted {} => "run_started",
            EventPayload::RunCompleted { .. } => "run_completed",
            EventPayload::RunFailed { .. } => "run_failed",
            EventPayload::RunPaused {} => "run_paused",
            EventPayload::RunResumed {} => "run_resumed",
            EventPayload::RunCancelled {} => "run_cancelled",
            EventPayload::StepStarted { .. } => "step_started",
            EventPayload::StepCompleted { .. } => "step_completed",
            EventPayload::StepFailed { .. } => "step_failed",
            EventPayload::StepResponseGenerated { .. } => "step_response_generated",
            EventPayload::StepResponseSelected { .. } => "step_response_selected",
            EventPayload::StepFeedbackAdded { .. } => "step_feedback_added",
            EventPayload::StepRetried { .. } => "step_retried",
            EventPayload::StateSnapshot { .. } => "state_snapshot",
        }
    }

    /// Terminal events close the stream: nothing may be appended after one.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventPayload::RunCompleted { .. }
                | EventPayload::RunFailed { .. }
                | EventPayload::RunCancelled {}
        )
    }

    pub fn step_key(&self) -> Option<&StepKey> {
        match self {
            EventPayload::StepStarted { step_key, .. }
            | EventPayload::StepCompleted { step_key, .. }
            | EventPayload::StepFailed { step_key, .. }
            | EventPayload::StepResponseGenerated { step_key, .. }
            | EventPayload::StepResponseSelected { step_key, .. }
            | EventPayload::StepFeedbackAdded { step_key, .. }
            | EventPayload::StepRetried { step_key, .. } => Some(step_key),
            _ => None,
        }
    }
}

/// An atomic, timestamped, sequence-numbered record of one state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub id: EventId,
    pub run_id: RunId,
    pub timestamp: DateTime<Utc>,
    /// Monotonic per run, starting at 1, no gaps.
    pub sequence_number: u64,
    #[serde(flatten)]
    pub payload: EventPayload,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl PipelineEvent {
    pub fn name(&self) -> &'static str {
        self.payload.name()
    }

    pub fn is_terminal(&self) -> bool {
        self.payload.is_terminal()
    }

    pub fn log_summary(&self) -> String {
        let t = self.name();
        let run = self.run_id.short(8);
        let seq = self.sequence_number;
        match &self.payload {
            EventPayload::RunFailed { error } => {
                format!("{t} run={run} seq={seq} error={error}")
            }
            EventPayload::StepFailed { step_key, error } => {
                format!("{t} run={run} seq={seq} step={step_key} error={error}")
            }
            EventPayload::StepRetried {
                step_key,
                retry_count,
            } => format!("{t} run={run} seq={seq} step={step_key} retry={retry_count}"),
            EventPayload::StepCompleted { step_key, .. } => {
                format!("{t} run={run} seq={seq} step={step_key}")
            }
            other => match other.step_key() {
                Some(step) => format!("{t} run={run} seq={seq} step={step}"),
                None => format!("{t} run={run} seq={seq}"),
            },
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
