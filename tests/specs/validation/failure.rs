// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Validation failures fail fast: structured issues, no events written.

use crate::prelude::*;
use writeit_engine::EngineError;
use writeit_llm::MockClient;
use writeit_storage::PIPELINE_EVENTS;
use writeit_template::codes;

#[tokio::test]
async fn undefined_variable_reports_location_and_writes_nothing() {
    let world = World::new();
    let (executor, mock) = world.executor("default", MockClient::fixed("never"));
    let template = parse_template(
        r#"
metadata: {name: broken}
steps:
  generate:
    type: llm_generate
    prompt_template: "Write about {{ inputs.nonexistent }}"
    model_preference: [test-model]
"#,
    );

    let err = executor
        .create_run(&template, serde_json::Map::new())
        .unwrap_err();

    assert_eq!(
        err.error_code(),
        writeit_engine::codes::PIPELINE_VALIDATION_ERROR
    );
    let result = match err {
        EngineError::PipelineValidation { result } => result,
        other => panic!("unexpected error {other:?}"),
    };
    let issue = result
        .issues
        .iter()
        .find(|i| i.code == codes::UNDEFINED_VARIABLE)
        .expect("undefined variable issue");
    assert_eq!(issue.location, "steps.generate.prompt_template");

    // No events written, no provider calls made
    let engine = executor.events().engine();
    assert_eq!(engine.count_prefix(PIPELINE_EVENTS, b"event_").unwrap(), 0);
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn cyclic_template_reports_circular_dependency() {
    let world = World::new();
    let (executor, _mock) = world.executor("default", MockClient::fixed("never"));
    let template = parse_template(
        r#"
metadata: {name: cyclic}
steps:
  a: {type: llm_generate, prompt_template: "p", model_preference: [m], depends_on: [b]}
  b: {type: llm_generate, prompt_template: "p", model_preference: [m], depends_on: [a]}
"#,
    );

    let err = executor
        .create_run(&template, serde_json::Map::new())
        .unwrap_err();
    let result = match err {
        EngineError::PipelineValidation { result } => result,
        other => panic!("unexpected error {other:?}"),
    };
    assert!(result.has_code(codes::CIRCULAR_DEPENDENCY));
}

#[tokio::test]
async fn missing_required_input_is_an_input_validation_error() {
    let world = World::new();
    let (executor, _mock) = world.executor("default", MockClient::fixed("never"));
    let template = basic_template();

    let err = executor
        .create_run(&template, serde_json::Map::new())
        .unwrap_err();
    assert_eq!(
        err.error_code(),
        writeit_engine::codes::INPUT_VALIDATION_ERROR
    );
}

#[tokio::test]
async fn choice_value_outside_options_is_rejected() {
    let world = World::new();
    let (executor, _mock) = world.executor("default", MockClient::fixed("never"));
    let template = parse_template(
        r#"
metadata: {name: choices}
inputs:
  style:
    type: choice
    label: Style
    required: true
    options:
      - {label: Formal, value: formal}
      - {label: Casual, value: casual}
steps:
  generate:
    type: llm_generate
    prompt_template: "Write in {{ inputs.style }} style"
    model_preference: [m]
"#,
    );

    let mut inputs = serde_json::Map::new();
    inputs.insert("style".into(), serde_json::Value::String("pirate".into()));
    let err = executor.create_run(&template, inputs).unwrap_err();

    let result = match err {
        EngineError::InputValidation { result } => result,
        other => panic!("unexpected error {other:?}"),
    };
    assert!(result.has_code(codes::INVALID_CHOICE));
}
