// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry semantics: transient provider failures retry with incrementing
//! counts, then the step completes.

use crate::prelude::*;
use writeit_core::{EventPayload, RunStatus, StepKey};
use writeit_engine::RunControl;
use writeit_llm::{LlmError, MockClient};

#[tokio::test]
async fn fails_twice_then_succeeds() {
    let world = World::new();
    let (executor, mock) = world.executor(
        "default",
        MockClient::failing_then(2, LlmError::Provider("503 upstream".into()), "OK"),
    );
    let template = basic_template();
    let control = RunControl::new();

    let run_id = executor
        .create_run(&template, topic_inputs("retries"))
        .unwrap();
    let state = executor.execute(&template, &run_id, &control).await.unwrap();

    assert_eq!(state.run.status, RunStatus::Completed);
    let step = state.run.step(&StepKey::new("generate")).unwrap();
    assert_eq!(step.responses, vec!["OK".to_string()]);
    assert_eq!(step.retry_count, 2);
    assert_eq!(mock.call_count(), 3);

    let events = executor.events().events(&run_id, 0).unwrap();
    let retries: Vec<u32> = events
        .iter()
        .filter_map(|e| match &e.payload {
            EventPayload::StepRetried { retry_count, .. } => Some(*retry_count),
            _ => None,
        })
        .collect();
    assert_eq!(retries, vec![1, 2]);

    // step_completed follows the last retry
    let last_retry = events
        .iter()
        .rposition(|e| e.name() == "step_retried")
        .unwrap();
    let completed = events
        .iter()
        .position(|e| e.name() == "step_completed")
        .unwrap();
    assert!(completed > last_retry);
}

#[tokio::test]
async fn persistent_failure_ends_in_run_failed() {
    let world = World::new();
    let (executor, _mock) = world.executor(
        "default",
        MockClient::failing_then(99, LlmError::Provider("503".into()), "never"),
    );
    let template = basic_template();
    let control = RunControl::new();

    let run_id = executor
        .create_run(&template, topic_inputs("doomed"))
        .unwrap();
    let err = executor
        .execute(&template, &run_id, &control)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), writeit_engine::codes::LLM_PROVIDER_ERROR);

    let state = executor.events().state(&run_id).unwrap().unwrap();
    assert_eq!(state.run.status, RunStatus::Failed);
    assert!(state.run.error.is_some());

    let names = event_names(&executor, &run_id);
    assert_eq!(names.last(), Some(&"run_failed"));
    assert!(names.contains(&"step_failed"));
}
