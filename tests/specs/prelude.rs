// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for the behavioral specs.

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use writeit_core::{RunId, WorkspaceName};
use writeit_engine::{ExecutorConfig, PipelineExecutor};
use writeit_llm::{BackoffConfig, LlmCache, LlmFacade, MockClient};
use writeit_storage::{EventStore, WorkspaceRegistry};
use writeit_template::PipelineTemplate;

pub struct World {
    // Keeps the registry home alive for the whole test
    _home: TempDir,
    pub registry: WorkspaceRegistry,
}

impl World {
    pub fn new() -> Self {
        let home = tempfile::tempdir().expect("tempdir");
        let registry = WorkspaceRegistry::initialize(home.path()).expect("registry");
        Self {
            _home: home,
            registry,
        }
    }

    /// Build an executor over the named workspace with the given mock.
    pub fn executor(
        &self,
        workspace: &str,
        mock: MockClient,
    ) -> (PipelineExecutor<MockClient>, Arc<MockClient>) {
        let name = WorkspaceName::new(workspace);
        let ws = match self.registry.get(&name) {
            Ok(ws) => ws,
            Err(_) => self.registry.create(&name).expect("create workspace"),
        };
        let engine = Arc::new(ws.open_storage().expect("open storage"));
        let events = Arc::new(EventStore::new(Arc::clone(&engine)));
        let cache = Arc::new(LlmCache::new(engine, name.clone()));
        let mock = Arc::new(mock);
        // Default facade: no internal retries, so step_retried events and
        // mock call counts line up one-to-one with provider calls
        let facade = Arc::new(LlmFacade::new(Arc::clone(&mock), cache));
        let executor =
            PipelineExecutor::new(events, facade, name).with_config(fast_config());
        (executor, mock)
    }
}

pub fn fast_config() -> ExecutorConfig {
    ExecutorConfig {
        retry_backoff: BackoffConfig {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            multiplier: 1.0,
            max_delay: Duration::from_millis(1),
            jitter: false,
        },
        ..Default::default()
    }
}

pub fn basic_template() -> PipelineTemplate {
    parse_template(
        r#"
metadata: {name: basic, description: One-step generator}
inputs:
  topic: {type: text, label: Topic, required: true}
steps:
  generate:
    name: Generate
    type: llm_generate
    prompt_template: "Write about {{ inputs.topic }}"
    model_preference: [test-model]
"#,
    )
}

pub fn parse_template(doc: &str) -> PipelineTemplate {
    PipelineTemplate::from_yaml(doc).expect("valid template document")
}

pub fn topic_inputs(topic: &str) -> serde_json::Map<String, serde_json::Value> {
    let mut map = serde_json::Map::new();
    map.insert("topic".into(), serde_json::Value::String(topic.into()));
    map
}

pub fn event_names(executor: &PipelineExecutor<MockClient>, run_id: &RunId) -> Vec<&'static str> {
    executor
        .events()
        .events(run_id, 0)
        .expect("events")
        .iter()
        .map(|e| e.name())
        .collect()
}
