// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::event::{EventPayload, PipelineEvent};
use crate::id::{EventId, RunId, TemplateId, WorkspaceName};
use chrono::TimeZone;

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap()
}

fn event(seq: u64, at: i64, payload: EventPayload) -> PipelineEvent {
    PipelineEvent {
        id: EventId::new(format!("ev-{seq}")),
        run_id: RunId::new("run-1"),
        timestamp: ts(at),
        sequence_number: seq,
        payload,
        metadata: serde_json::Map::new(),
    }
}

fn initial_state() -> PipelineState {
    let run = PipelineRun::new(
        RunId::new("run-1"),
        TemplateId::new("tpl-1"),
        WorkspaceName::new("default"),
        serde_json::Map::new(),
        ts(0),
    );
    PipelineState::new(run, ts(0))
}

fn started(key: &str) -> EventPayload {
    EventPayload::StepStarted {
        step_key: StepKey::new(key),
        max_retries: 2,
    }
}

#[test]
fn test_new_state_is_version_zero_on_main() {
    let state = initial_state();
    assert_eq!(state.version, 0);
    assert_eq!(state.branch_id, MAIN_BRANCH);
    assert_eq!(state.parent_version, None);
}

#[test]
fn test_with_run_increments_version_and_parents() {
    let state = initial_state();
    let next = state.with_run(ts(1), |run| run.status = RunStatus::Running);
    assert_eq!(next.version, 1);
    assert_eq!(next.parent_version, Some(0));
    assert_eq!(next.run.status, RunStatus::Running);
    // Original untouched
    assert_eq!(state.run.status, RunStatus::Created);
}

#[test]
fn test_branch_resets_version_and_keeps_run() {
    let state = initial_state()
        .with_run(ts(1), |run| run.status = RunStatus::Running)
        .with_run(ts(2), |run| run.error = Some("e".into()));
    let branch = state.branch("experiment", ts(3));
    assert_eq!(branch.version, 0);
    assert_eq!(branch.branch_id, "experiment");
    assert_eq!(branch.parent_version, None);
    assert_eq!(branch.run, state.run);
}

#[test]
fn test_full_fold_happy_path() {
    let events = vec![
        event(2, 1, EventPayload::RunStarted {}),
        event(3, 2, started("draft")),
        event(
            4,
            3,
            EventPayload::StepResponseGenerated {
                step_key: StepKey::new("draft"),
                responses: vec!["Draft text.".into()],
            },
        ),
        event(
            5,
            4,
            EventPayload::StepCompleted {
                step_key: StepKey::new("draft"),
                execution_time_secs: 2.0,
                tokens_used: BTreeMap::from([(ModelId::new("m"), 10)]),
            },
        ),
        event(
            6,
            5,
            EventPayload::RunCompleted {
                outputs: IndexMap::from([(StepKey::new("draft"), "Draft text.".to_string())]),
            },
        ),
    ];

    let mut state = initial_state();
    for ev in &events {
        state = state.apply(ev).unwrap();
    }

    assert_eq!(state.version, 5);
    assert_eq!(state.run.status, RunStatus::Completed);
    assert_eq!(state.run.completed_at, Some(ts(5)));
    let step = state.run.step(&StepKey::new("draft")).unwrap();
    assert_eq!(step.status, StepStatus::Completed);
    assert_eq!(step.started_at, Some(ts(2)));
    assert_eq!(step.completed_at, Some(ts(4)));
    assert_eq!(step.responses, vec!["Draft text.".to_string()]);
    assert_eq!(step.execution_time_secs, 2.0);
    assert_eq!(state.total_tokens(), 10);
    assert_eq!(state.run.outputs[&StepKey::new("draft")], "Draft text.");
}

#[test]
fn test_run_created_mid_stream_is_an_error() {
    let state = initial_state();
    let err = state
        .apply(&event(2, 1, EventPayload::RunCreated(state.run.clone())))
        .unwrap_err();
    assert!(matches!(err, ApplyError::UnexpectedRunCreated(_)));
}

#[test]
fn test_snapshot_event_replaces_state() {
    let state = initial_state().with_run(ts(1), |run| run.status = RunStatus::Running);
    let snapshot = event(
        3,
        2,
        EventPayload::StateSnapshot {
            state: state.clone(),
        },
    );

    let fresh = initial_state();
    let replayed = fresh.apply(&snapshot).unwrap();
    assert_eq!(replayed, state);
}

#[test]
fn test_retry_resets_step_and_tracks_count() {
    let mut state = initial_state();
    state = state.apply(&event(2, 1, started("draft"))).unwrap();
    state = state
        .apply(&event(
            3,
            2,
            EventPayload::StepRetried {
                step_key: StepKey::new("draft"),
                retry_count: 1,
            },
        ))
        .unwrap();

    let step = state.run.step(&StepKey::new("draft")).unwrap();
    assert_eq!(step.status, StepStatus::Pending);
    assert_eq!(step.retry_count, 1);
    assert_eq!(step.error, None);
}

#[test]
fn test_retry_past_budget_is_an_error() {
    let mut state = initial_state();
    state = state.apply(&event(2, 1, started("draft"))).unwrap();

    let err = state
        .apply(&event(
            3,
            2,
            EventPayload::StepRetried {
                step_key: StepKey::new("draft"),
                retry_count: 3,
            },
        ))
        .unwrap_err();
    assert!(matches!(err, ApplyError::RetryLimitExceeded { .. }));
}

#[test]
fn test_step_started_on_completed_step_is_illegal() {
    let mut state = initial_state();
    state = state.apply(&event(2, 1, started("draft"))).unwrap();
    state = state
        .apply(&event(
            3,
            2,
            EventPayload::StepCompleted {
                step_key: StepKey::new("draft"),
                execution_time_secs: 0.1,
                tokens_used: BTreeMap::new(),
            },
        ))
        .unwrap();

    let err = state.apply(&event(4, 3, started("draft"))).unwrap_err();
    assert!(matches!(err, ApplyError::IllegalTransition { .. }));
}

#[test]
fn test_events_for_unknown_steps_are_noops_but_advance_version() {
    let state = initial_state();
    let next = state
        .apply(&event(
            2,
            1,
            EventPayload::StepFeedbackAdded {
                step_key: StepKey::new("ghost"),
                feedback: "?".into(),
            },
        ))
        .unwrap();
    assert_eq!(next.version, 1);
    assert!(next.run.steps.is_empty());
}

#[test]
fn test_next_ready_steps_respects_dependencies() {
    let deps = IndexMap::from([
        (StepKey::new("outline"), vec![]),
        (StepKey::new("draft"), vec![StepKey::new("outline")]),
        (StepKey::new("polish"), vec![StepKey::new("draft")]),
    ]);

    let mut state = initial_state();
    assert_eq!(
        state.next_ready_steps(&deps),
        vec![&StepKey::new("outline")]
    );

    state = state.apply(&event(2, 1, started("outline"))).unwrap();
    // Running steps are not ready again
    assert!(state.next_ready_steps(&deps).is_empty());

    state = state
        .apply(&event(
            3,
            2,
            EventPayload::StepCompleted {
                step_key: StepKey::new("outline"),
                execution_time_secs: 0.5,
                tokens_used: BTreeMap::new(),
            },
        ))
        .unwrap();
    assert_eq!(state.next_ready_steps(&deps), vec![&StepKey::new("draft")]);
}

#[test]
fn test_progress_fraction() {
    let mut state = initial_state();
    assert_eq!(state.progress_fraction(2), 0.0);

    state = state.apply(&event(2, 1, started("outline"))).unwrap();
    state = state
        .apply(&event(
            3,
            2,
            EventPayload::StepCompleted {
                step_key: StepKey::new("outline"),
                execution_time_secs: 0.5,
                tokens_used: BTreeMap::new(),
            },
        ))
        .unwrap();
    assert_eq!(state.progress_fraction(2), 0.5);
    assert_eq!(state.progress_fraction(0), 0.0);
}

#[test]
fn test_tokens_by_model_sums_across_steps() {
    let mut state = initial_state();
    for (i, key) in ["a", "b"].iter().enumerate() {
        let seq = (i as u64) * 2;
        state = state.apply(&event(seq + 2, 1, started(key))).unwrap();
        state = state
            .apply(&event(
                seq + 3,
                2,
                EventPayload::StepCompleted {
                    step_key: StepKey::new(*key),
                    execution_time_secs: 0.1,
                    tokens_used: BTreeMap::from([(ModelId::new("m"), 7)]),
                },
            ))
            .unwrap();
    }
    assert_eq!(state.tokens_by_model()[&ModelId::new("m")], 14);
    assert_eq!(state.total_tokens(), 14);
}

#[test]
fn test_fold_is_deterministic() {
    let events = vec![
        event(2, 1, EventPayload::RunStarted {}),
        event(3, 2, started("draft")),
        event(
            4,
            3,
            EventPayload::StepCompleted {
                step_key: StepKey::new("draft"),
                execution_time_secs: 1.0,
                tokens_used: BTreeMap::new(),
            },
        ),
    ];

    let fold = |events: &[PipelineEvent]| {
        let mut state = initial_state();
        for ev in events {
            state = state.apply(ev).unwrap();
        }
        state
    };

    assert_eq!(fold(&events), fold(&events));
}
