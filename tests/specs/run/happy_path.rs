// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A single llm_generate step runs to completion with the expected event
//! stream and folded state.

use crate::prelude::*;
use writeit_core::{RunStatus, StepKey};
use writeit_engine::RunControl;
use writeit_llm::MockClient;

#[tokio::test]
async fn single_step_run_completes_with_dense_event_stream() {
    let world = World::new();
    let (executor, mock) = world.executor("default", MockClient::fixed("Draft text."));
    let template = basic_template();
    let control = RunControl::new();

    let run_id = executor
        .create_run(&template, topic_inputs("AI ethics"))
        .unwrap();
    let state = executor.execute(&template, &run_id, &control).await.unwrap();

    assert_eq!(state.run.status, RunStatus::Completed);
    let step = state.run.step(&StepKey::new("generate")).unwrap();
    assert_eq!(step.responses, vec!["Draft text.".to_string()]);
    assert_eq!(
        state.run.outputs[&StepKey::new("generate")],
        "Draft text."
    );
    assert_eq!(mock.call_count(), 1);

    let events = executor.events().events(&run_id, 0).unwrap();
    let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
    assert_eq!(
        names,
        vec![
            "run_created",
            "run_started",
            "step_started",
            "step_response_generated",
            "step_completed",
            "run_completed",
        ]
    );
    let seqs: Vec<u64> = events.iter().map(|e| e.sequence_number).collect();
    assert_eq!(seqs, vec![1, 2, 3, 4, 5, 6]);
}

#[tokio::test]
async fn replay_reproduces_the_final_state() {
    let world = World::new();
    let (executor, _mock) = world.executor("default", MockClient::fixed("Draft text."));
    let template = basic_template();
    let control = RunControl::new();

    let run_id = executor
        .create_run(&template, topic_inputs("AI ethics"))
        .unwrap();
    let live = executor.execute(&template, &run_id, &control).await.unwrap();

    // Folding the persisted events again yields the same state
    let replayed = executor.events().state(&run_id).unwrap().unwrap();
    assert_eq!(replayed, live);

    // The terminal write-through record matches the fold
    let record = executor.events().load_run_record(&run_id).unwrap().unwrap();
    assert_eq!(record, live.run);
}

#[tokio::test]
async fn terminal_run_accepts_no_more_events() {
    let world = World::new();
    let (executor, _mock) = world.executor("default", MockClient::fixed("Draft text."));
    let template = basic_template();
    let control = RunControl::new();

    let run_id = executor
        .create_run(&template, topic_inputs("AI ethics"))
        .unwrap();
    executor.execute(&template, &run_id, &control).await.unwrap();

    let err = executor
        .execute(&template, &run_id, &control)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), writeit_engine::codes::TERMINAL_RUN);

    // E2: exactly one terminal event, and it is the last
    let events = executor.events().events(&run_id, 0).unwrap();
    let terminal: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_terminal())
        .map(|(i, _)| i)
        .collect();
    assert_eq!(terminal, vec![events.len() - 1]);
}
