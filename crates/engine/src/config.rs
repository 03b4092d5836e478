// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Executor tuning knobs.

use std::time::Duration;
use writeit_llm::BackoffConfig;

/// Configuration for a [`crate::PipelineExecutor`].
///
/// The executor is the single owner of retries: each attempt is recorded
/// as a `step_retried` event and counted in `retry_count`, and the facade
/// it drives performs no retries of its own by default, so the event log
/// matches actual provider call volume one-to-one.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Budget for a single step, LLM call included.
    pub step_timeout: Duration,
    /// Budget for the whole run, checked at step boundaries.
    pub run_timeout: Duration,
    /// Retry budget per step for retryable errors.
    pub max_retries: u32,
    /// Backoff between step retries.
    pub retry_backoff: BackoffConfig,
    /// Stream tokens for LLM steps instead of buffered completion.
    pub stream_tokens: bool,
    /// Bounded capacity of the progress channel.
    pub progress_capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(5 * 60),
            run_timeout: Duration::from_secs(30 * 60),
            max_retries: 3,
            retry_backoff: BackoffConfig::default(),
            stream_tokens: false,
            progress_capacity: 256,
        }
    }
}
