// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error taxonomy and the stable error codes surfaced to callers.

use thiserror::Error;
use writeit_core::{RunId, StepKey};
use writeit_llm::{CacheError, LlmError};
use writeit_storage::{EventStoreError, StorageError, WorkspaceError};
use writeit_template::ValidationResult;

/// Stable string identifiers for UI mapping.
pub mod codes {
    pub const PIPELINE_VALIDATION_ERROR: &str = "PIPELINE_VALIDATION_ERROR";
    pub const INPUT_VALIDATION_ERROR: &str = "INPUT_VALIDATION_ERROR";
    pub const STEP_EXECUTION_ERROR: &str = "STEP_EXECUTION_ERROR";
    pub const LLM_PROVIDER_ERROR: &str = "LLM_PROVIDER_ERROR";
    pub const MODEL_UNAVAILABLE: &str = "MODEL_UNAVAILABLE";
    pub const CACHE_ERROR: &str = "CACHE_ERROR";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
    pub const ISOLATION_VIOLATION: &str = "ISOLATION_VIOLATION";
    pub const TERMINAL_RUN: &str = "TERMINAL_RUN";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const CANCELLED: &str = "CANCELLED";
}

/// Errors surfaced by the executor.
///
/// Step-level failures are recorded as events first; the error carries the
/// identifiers a UI needs, never a stack trace.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("template validation failed with {} issue(s)", result.issues.len())]
    PipelineValidation { result: ValidationResult },

    #[error("input validation failed with {} issue(s)", result.issues.len())]
    InputValidation { result: ValidationResult },

    #[error("step '{step_key}' of run {run_id} failed: {message}")]
    StepExecution {
        run_id: RunId,
        step_key: StepKey,
        code: &'static str,
        message: String,
        retry_count: u32,
    },

    #[error("run {0} not found")]
    RunNotFound(RunId),

    #[error("run {0} exceeded its time budget")]
    Timeout(RunId),

    #[error(transparent)]
    EventStore(#[from] EventStoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

impl EngineError {
    /// The stable error code for this failure.
    pub fn error_code(&self) -> &'static str {
        match self {
            EngineError::PipelineValidation { .. } => codes::PIPELINE_VALIDATION_ERROR,
            EngineError::InputValidation { .. } => codes::INPUT_VALIDATION_ERROR,
            EngineError::StepExecution { code, .. } => code,
            EngineError::RunNotFound(_) => codes::STORAGE_ERROR,
            EngineError::Timeout(_) => codes::TIMEOUT,
            EngineError::EventStore(EventStoreError::TerminalRun(_)) => codes::TERMINAL_RUN,
            EngineError::EventStore(_) => codes::STORAGE_ERROR,
            EngineError::Storage(_) => codes::STORAGE_ERROR,
            EngineError::Workspace(WorkspaceError::IsolationViolation { .. }) => {
                codes::ISOLATION_VIOLATION
            }
            EngineError::Workspace(_) => codes::STORAGE_ERROR,
            EngineError::Cache(_) => codes::CACHE_ERROR,
            EngineError::Llm(LlmError::ModelUnavailable(_)) => codes::MODEL_UNAVAILABLE,
            EngineError::Llm(LlmError::NoModel) => codes::MODEL_UNAVAILABLE,
            EngineError::Llm(_) => codes::LLM_PROVIDER_ERROR,
        }
    }
}

/// Code for an LLM error that failed a step.
pub(crate) fn step_error_code(error: &LlmError) -> &'static str {
    match error {
        LlmError::ModelUnavailable(_) | LlmError::NoModel => codes::MODEL_UNAVAILABLE,
        _ => codes::LLM_PROVIDER_ERROR,
    }
}
