// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test builders shared by this crate's tests and downstream crates
//! (enabled via the `test-support` feature).

use crate::event::{EventPayload, PipelineEvent};
use crate::id::{EventId, RunId, StepKey, TemplateId, WorkspaceName};
use crate::run::PipelineRun;
use chrono::{DateTime, TimeZone, Utc};

/// Timestamp `secs` seconds after the Unix epoch.
pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// A minimal run record for the given run id in the `default` workspace.
pub fn run_record(run_id: &str) -> PipelineRun {
    PipelineRun::new(
        RunId::new(run_id),
        TemplateId::new("tpl-test"),
        WorkspaceName::new("default"),
        serde_json::Map::new(),
        ts(0),
    )
}

/// An event record with deterministic id and timestamp.
pub fn event(run_id: &str, seq: u64, payload: EventPayload) -> PipelineEvent {
    PipelineEvent {
        id: EventId::new(format!("ev-{run_id}-{seq}")),
        run_id: RunId::new(run_id),
        timestamp: ts(seq as i64),
        sequence_number: seq,
        payload,
        metadata: serde_json::Map::new(),
    }
}

/// `step_started` payload with a retry budget of 2.
pub fn step_started(key: &str) -> EventPayload {
    EventPayload::StepStarted {
        step_key: StepKey::new(key),
        max_retries: 2,
    }
}
