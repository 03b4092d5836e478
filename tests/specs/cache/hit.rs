// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cache behavior across runs within one workspace.

use crate::prelude::*;
use writeit_core::RunStatus;
use writeit_engine::RunControl;
use writeit_llm::MockClient;

#[tokio::test]
async fn second_identical_run_hits_the_cache() {
    let world = World::new();
    let (executor, mock) = world.executor("default", MockClient::fixed("Draft text."));
    let template = basic_template();
    let control = RunControl::new();

    let first = executor
        .create_run(&template, topic_inputs("AI ethics"))
        .unwrap();
    executor.execute(&template, &first, &control).await.unwrap();
    assert_eq!(mock.call_count(), 1);

    let second = executor
        .create_run(&template, topic_inputs("AI ethics"))
        .unwrap();
    let state = executor
        .execute(&template, &second, &control)
        .await
        .unwrap();

    assert_eq!(state.run.status, RunStatus::Completed);
    // Provider-call-count metric stays at 1; the second run was served
    // entirely from the cache.
    assert_eq!(mock.call_count(), 1);

    let stats = executor.llm().cache().stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hit_rate, 0.5);
}

#[tokio::test]
async fn different_inputs_do_not_share_entries() {
    let world = World::new();
    let (executor, mock) = world.executor("default", MockClient::fixed("Draft text."));
    let template = basic_template();
    let control = RunControl::new();

    let first = executor
        .create_run(&template, topic_inputs("AI ethics"))
        .unwrap();
    executor.execute(&template, &first, &control).await.unwrap();

    let second = executor
        .create_run(&template, topic_inputs("chess openings"))
        .unwrap();
    executor
        .execute(&template, &second, &control)
        .await
        .unwrap();

    // Different rendered prompts, different keys
    assert_eq!(mock.call_count(), 2);
}
