// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

fn text_input(required: bool, max_length: Option<usize>) -> InputSpec {
    InputSpec {
        input_type: InputType::Text,
        label: "Topic".into(),
        required,
        default: None,
        placeholder: None,
        help: None,
        options: vec![],
        max_length,
    }
}

fn choice_input(values: &[&str]) -> InputSpec {
    InputSpec {
        input_type: InputType::Choice,
        label: "Style".into(),
        required: true,
        default: None,
        placeholder: None,
        help: None,
        options: values
            .iter()
            .map(|v| ChoiceOption {
                label: v.to_string(),
                value: v.to_string(),
            })
            .collect(),
        max_length: None,
    }
}

#[test]
fn test_choice_option_accepts_bare_string() {
    let opt: ChoiceOption = serde_yaml::from_str("formal").unwrap();
    assert_eq!(opt.label, "formal");
    assert_eq!(opt.value, "formal");

    let opt: ChoiceOption = serde_yaml::from_str("{label: Formal tone, value: formal}").unwrap();
    assert_eq!(opt.label, "Formal tone");
    assert_eq!(opt.value, "formal");
}

#[test]
fn test_step_type_llm_classification() {
    assert!(StepType::LlmGenerate.calls_llm());
    assert!(StepType::LlmRefine.calls_llm());
    assert!(!StepType::UserSelection.calls_llm());
    assert!(!StepType::Transform.calls_llm());
}

#[test]
fn test_required_input_missing() {
    let spec = text_input(true, None);
    let issue = check_input_value("topic", &spec, None).unwrap();
    assert_eq!(issue.0, crate::validate::codes::MISSING_REQUIRED_INPUT);
}

#[test]
fn test_optional_input_missing_is_fine() {
    let spec = text_input(false, None);
    assert!(check_input_value("topic", &spec, None).is_none());
}

#[test]
fn test_text_input_type_mismatch() {
    let spec = text_input(true, None);
    let issue = check_input_value("topic", &spec, Some(&json!(42))).unwrap();
    assert_eq!(issue.0, crate::validate::codes::INVALID_INPUT_TYPE);
}

#[test]
fn test_text_input_max_length() {
    let spec = text_input(true, Some(3));
    assert!(check_input_value("topic", &spec, Some(&json!("abc"))).is_none());
    let issue = check_input_value("topic", &spec, Some(&json!("abcd"))).unwrap();
    assert_eq!(issue.0, crate::validate::codes::INPUT_TOO_LONG);
}

#[test]
fn test_choice_input_validates_against_values() {
    let spec = choice_input(&["formal", "casual"]);
    assert!(check_input_value("style", &spec, Some(&json!("formal"))).is_none());

    let issue = check_input_value("style", &spec, Some(&json!("pirate"))).unwrap();
    assert_eq!(issue.0, crate::validate::codes::INVALID_CHOICE);
    assert!(issue.1.contains("casual, formal"));
}

#[test]
fn test_default_value_resolves_nested_paths() {
    let template = PipelineTemplate {
        id: writeit_core::TemplateId::new("t"),
        metadata: TemplateMetadata {
            name: "t".into(),
            ..Default::default()
        },
        defaults: serde_json::from_value(json!({
            "model": "fast-model",
            "word_counts": {"draft": 800}
        }))
        .unwrap(),
        inputs: IndexMap::new(),
        steps: IndexMap::new(),
    };

    assert_eq!(template.default_value(&["model"]), Some(&json!("fast-model")));
    assert_eq!(
        template.default_value(&["word_counts", "draft"]),
        Some(&json!(800))
    );
    assert_eq!(template.default_value(&["word_counts", "ghost"]), None);
    assert_eq!(template.default_value(&[]), None);
}
