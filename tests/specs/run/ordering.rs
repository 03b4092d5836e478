// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dependency ordering: a step never starts before its dependencies
//! complete, and its rendered prompt sees their outputs.

use crate::prelude::*;
use writeit_core::{RunStatus, StepKey};
use writeit_engine::RunControl;
use writeit_llm::MockClient;

fn two_step_template() -> writeit_template::PipelineTemplate {
    parse_template(
        r#"
metadata: {name: outline-then-draft}
steps:
  outline:
    type: llm_generate
    prompt_template: "Outline the piece"
    model_preference: [test-model]
  draft:
    type: llm_generate
    prompt_template: "Draft using {{ steps.outline }}"
    model_preference: [test-model]
    depends_on: [outline]
"#,
    )
}

#[tokio::test]
async fn dependency_completes_before_dependent_starts() {
    let world = World::new();
    let (executor, _mock) = world.executor("default", MockClient::new(vec!["O", "D(using O)"]));
    let template = two_step_template();
    let control = RunControl::new();

    let run_id = executor
        .create_run(&template, serde_json::Map::new())
        .unwrap();
    let state = executor.execute(&template, &run_id, &control).await.unwrap();

    assert_eq!(state.run.status, RunStatus::Completed);
    assert_eq!(state.run.outputs[&StepKey::new("outline")], "O");
    assert_eq!(state.run.outputs[&StepKey::new("draft")], "D(using O)");

    // S1 on wall-clock timestamps
    let outline = state.run.step(&StepKey::new("outline")).unwrap();
    let draft = state.run.step(&StepKey::new("draft")).unwrap();
    assert!(outline.completed_at.unwrap() < draft.started_at.unwrap());

    // ...and on the event stream itself
    let events = executor.events().events(&run_id, 0).unwrap();
    let seq_of = |name: &str, key: &str| {
        events
            .iter()
            .find(|e| e.name() == name && e.payload.step_key() == Some(&StepKey::new(key)))
            .map(|e| e.sequence_number)
            .unwrap()
    };
    assert!(seq_of("step_completed", "outline") < seq_of("step_started", "draft"));
}

#[tokio::test]
async fn dependent_prompt_contains_dependency_output() {
    let world = World::new();
    let (executor, mock) = world.executor("default", MockClient::new(vec!["O", "D"]));
    let template = two_step_template();
    let control = RunControl::new();

    let run_id = executor
        .create_run(&template, serde_json::Map::new())
        .unwrap();
    executor.execute(&template, &run_id, &control).await.unwrap();
    assert_eq!(mock.call_count(), 2);

    // The draft call's rendered prompt embedded outline's output: its
    // cache entry is addressable by exactly that prompt text.
    let call_ctx = writeit_engine::context::call_context(&template, &StepKey::new("draft"));
    let entry = executor
        .llm()
        .cache()
        .get(
            "Draft using O",
            &writeit_core::ModelId::new("test-model"),
            &call_ctx,
        )
        .unwrap()
        .expect("draft prompt cached under its rendered form");
    assert_eq!(entry.response, "D");
}

#[tokio::test]
async fn independent_steps_both_complete() {
    let world = World::new();
    let (executor, _mock) = world.executor("default", MockClient::new(vec!["A", "B", "C"]));
    let template = parse_template(
        r#"
metadata: {name: fan-in}
steps:
  left: {type: llm_generate, prompt_template: "left part", model_preference: [m]}
  right: {type: llm_generate, prompt_template: "right part", model_preference: [m]}
  merge:
    type: transform
    prompt_template: "{{ steps.left }} + {{ steps.right }}"
    depends_on: [left, right]
"#,
    );
    let control = RunControl::new();

    let run_id = executor
        .create_run(&template, serde_json::Map::new())
        .unwrap();
    let state = executor.execute(&template, &run_id, &control).await.unwrap();

    assert_eq!(state.run.status, RunStatus::Completed);
    let merged = &state.run.outputs[&StepKey::new("merge")];
    // left and right ran in one wave; either may have drawn "A" first
    assert!(merged == "A + B" || merged == "B + A");

    let events = executor.events().events(&run_id, 0).unwrap();
    let merge_start = events
        .iter()
        .find(|e| e.name() == "step_started" && e.payload.step_key() == Some(&StepKey::new("merge")))
        .unwrap()
        .sequence_number;
    for key in ["left", "right"] {
        let completed = events
            .iter()
            .find(|e| {
                e.name() == "step_completed" && e.payload.step_key() == Some(&StepKey::new(key))
            })
            .unwrap()
            .sequence_number;
        assert!(completed < merge_start);
    }
}
