// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace isolation: no data crosses workspace boundaries.

use crate::prelude::*;
use std::path::Path;
use writeit_core::{ModelId, TokenUsage, WorkspaceName};
use writeit_engine::RunControl;
use writeit_llm::{CallContext, MockClient};
use writeit_storage::WorkspaceError;

#[tokio::test]
async fn cache_entries_do_not_cross_workspaces() {
    let world = World::new();
    let (executor_a, _mock_a) = world.executor("alpha", MockClient::fixed("unused"));
    let (executor_b, _mock_b) = world.executor("beta", MockClient::fixed("unused"));

    let model = ModelId::new("m");
    let mut context = CallContext::new();
    context.insert("k".into(), serde_json::json!("v"));

    // Workspace alpha writes an entry for (p, m, c)
    executor_a
        .llm()
        .cache()
        .put("p", &model, &context, "from-alpha", TokenUsage::new(1, 1), None)
        .unwrap();

    // Workspace beta reads the same (p, m, c) and misses
    assert!(executor_b
        .llm()
        .cache()
        .get("p", &model, &context)
        .unwrap()
        .is_none());

    // Each workspace's stats reflect only its own traffic
    let entry = executor_a
        .llm()
        .cache()
        .get("p", &model, &context)
        .unwrap()
        .expect("alpha sees its own entry");
    assert_eq!(entry.response, "from-alpha");

    let stats_a = executor_a.llm().cache().stats();
    let stats_b = executor_b.llm().cache().stats();
    assert_eq!((stats_a.hits, stats_a.misses), (1, 0));
    assert_eq!((stats_b.hits, stats_b.misses), (0, 1));
}

#[tokio::test]
async fn runs_are_invisible_to_other_workspaces() {
    let world = World::new();
    let (executor_a, _) = world.executor("alpha", MockClient::fixed("Draft text."));
    let (executor_b, _) = world.executor("beta", MockClient::fixed("Draft text."));
    let template = basic_template();
    let control = RunControl::new();

    let run_id = executor_a
        .create_run(&template, topic_inputs("AI ethics"))
        .unwrap();
    executor_a
        .execute(&template, &run_id, &control)
        .await
        .unwrap();

    assert!(executor_a.events().state(&run_id).unwrap().is_some());
    assert!(executor_b.events().state(&run_id).unwrap().is_none());
}

#[test]
fn workspace_paths_never_escape_their_root() {
    let world = World::new();
    let ws = world
        .registry
        .get(&WorkspaceName::new("default"))
        .unwrap();

    // Everything the workspace derives stays under its canonical root
    let canonical_root = ws.root().canonicalize().unwrap();
    for dir in [ws.templates_dir(), ws.storage_dir(), ws.cache_dir()] {
        assert!(dir.canonicalize().unwrap().starts_with(&canonical_root));
    }

    let err = ws.resolve(Path::new("../other-workspace/config")).unwrap_err();
    assert!(matches!(err, WorkspaceError::IsolationViolation { .. }));

    let err = ws.resolve(Path::new("/etc/passwd")).unwrap_err();
    assert!(matches!(err, WorkspaceError::IsolationViolation { .. }));
}

#[test]
fn active_workspace_cannot_be_removed() {
    let world = World::new();
    let err = world
        .registry
        .remove(&WorkspaceName::new("default"))
        .unwrap_err();
    assert!(matches!(err, WorkspaceError::Active(_)));
}
