// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The pipeline executor.
//!
//! Drives one run at a time: validates the template and inputs, appends
//! every transition as an event, renders prompts from accumulated context,
//! dispatches LLM calls through the cached facade, and publishes progress.
//! Steps whose dependencies are all complete execute together as a
//! concurrent wave; a dependent step never starts before every dependency's
//! `step_completed` has been appended.

use crate::config::ExecutorConfig;
use crate::context;
use crate::control::RunControl;
use crate::error::{codes, step_error_code, EngineError};
use crate::progress::{ProgressBus, ProgressMessage};
use futures::StreamExt;
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use writeit_core::{
    Clock, EventPayload, IdGen, ModelId, PipelineRun, PipelineState, RunId, RunStatus, StepKey,
    StepStatus, SystemClock, TokenUsage, UuidIdGen, WorkspaceName,
};
use writeit_llm::{CallContext, FacadeError, LlmClient, LlmError, LlmFacade, StreamChunk};
use writeit_storage::{EventStore, EventStoreError};
use writeit_template::{
    execution_order, render, GraphError, PipelineTemplate, RenderMode, Severity, StepSpec,
    ValidationIssue, ValidationResult, Validator,
};

/// Outcome of one step's attempt chain.
enum StepRun {
    Completed,
    Cancelled,
    Failed {
        step_key: StepKey,
        code: &'static str,
        message: String,
        retry_count: u32,
    },
}

/// Orchestrates pipeline runs against one workspace.
pub struct PipelineExecutor<L: LlmClient, C: Clock = SystemClock, I: IdGen = UuidIdGen> {
    events: Arc<EventStore<C, I>>,
    llm: Arc<LlmFacade<L, C>>,
    workspace: WorkspaceName,
    validator: Validator,
    config: ExecutorConfig,
    progress: ProgressBus,
    clock: C,
    ids: I,
}

impl<L: LlmClient> PipelineExecutor<L> {
    pub fn new(
        events: Arc<EventStore>,
        llm: Arc<LlmFacade<L>>,
        workspace: WorkspaceName,
    ) -> Self {
        Self::with_parts(
            events,
            llm,
            workspace,
            SystemClock,
            UuidIdGen,
            ExecutorConfig::default(),
        )
    }
}

impl<L: LlmClient, C: Clock, I: IdGen> PipelineExecutor<L, C, I> {
    pub fn with_parts(
        events: Arc<EventStore<C, I>>,
        llm: Arc<LlmFacade<L, C>>,
        workspace: WorkspaceName,
        clock: C,
        ids: I,
        config: ExecutorConfig,
    ) -> Self {
        let progress = ProgressBus::new(config.progress_capacity);
        Self {
            events,
            llm,
            workspace,
            validator: Validator::default(),
            config,
            progress,
            clock,
            ids,
        }
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.progress = ProgressBus::new(config.progress_capacity);
        self.config = config;
        self
    }

    pub fn progress(&self) -> &ProgressBus {
        &self.progress
    }

    pub fn events(&self) -> &Arc<EventStore<C, I>> {
        &self.events
    }

    pub fn llm(&self) -> &Arc<LlmFacade<L, C>> {
        &self.llm
    }

    /// Validate the template and inputs, then create the run record.
    ///
    /// Nothing is written unless both validations pass; the first event of
    /// the new stream is `run_created`.
    pub fn create_run(
        &self,
        template: &PipelineTemplate,
        inputs: serde_json::Map<String, serde_json::Value>,
    ) -> Result<RunId, EngineError> {
        let result = self.validator.validate(template);
        if !result.is_valid() {
            return Err(EngineError::PipelineValidation { result });
        }
        let result = self.validator.validate_input_values(template, &inputs);
        if !result.is_valid() {
            return Err(EngineError::InputValidation { result });
        }

        let run_id = self.ids.run_id();
        let run = PipelineRun::new(
            run_id.clone(),
            template.id.clone(),
            self.workspace.clone(),
            inputs,
            self.clock.now(),
        );
        self.events.append(
            &run_id,
            EventPayload::RunCreated(run),
            serde_json::Map::new(),
        )?;
        info!(run = %run_id, template = %template.metadata.name, "run created");
        Ok(run_id)
    }

    /// Execute (or resume) a run to completion.
    ///
    /// Returns the final state. Cooperative cancellation and pause return
    /// `Ok` with the corresponding run status; a step failure appends the
    /// terminal `run_failed` event and surfaces as
    /// [`EngineError::StepExecution`].
    pub async fn execute(
        &self,
        template: &PipelineTemplate,
        run_id: &RunId,
        control: &RunControl,
    ) -> Result<PipelineState, EngineError> {
        let order = execution_order(template).map_err(graph_validation_error)?;
        let deps = template.dependencies();
        let total_steps = template.steps.len();

        let state = self.current_state(run_id)?;
        match state.run.status {
            RunStatus::Created => {
                self.events
                    .append(run_id, EventPayload::RunStarted {}, serde_json::Map::new())?;
            }
            RunStatus::Paused => {
                self.events
                    .append(run_id, EventPayload::RunResumed {}, serde_json::Map::new())?;
            }
            RunStatus::Running => {} // crash recovery: re-enter the loop
            status => {
                error!(run = %run_id, %status, "execute called on terminal run");
                return Err(EngineError::EventStore(EventStoreError::TerminalRun(
                    run_id.clone(),
                )));
            }
        }

        let deadline = Instant::now() + self.config.run_timeout;

        loop {
            let state = self.current_state(run_id)?;

            if control.is_cancelled() {
                self.events.append(
                    run_id,
                    EventPayload::RunCancelled {},
                    serde_json::Map::new(),
                )?;
                self.progress.publish(ProgressMessage::RunCancelled {
                    run_id: run_id.clone(),
                });
                info!(run = %run_id, "run cancelled");
                return self.current_state(run_id);
            }
            if control.is_paused() {
                self.events
                    .append(run_id, EventPayload::RunPaused {}, serde_json::Map::new())?;
                info!(run = %run_id, "run paused");
                return self.current_state(run_id);
            }
            if Instant::now() >= deadline {
                self.fail_run(run_id, "run timed out".to_string())?;
                return Err(EngineError::Timeout(run_id.clone()));
            }

            let ready: Vec<StepKey> = state
                .next_ready_steps(&deps)
                .into_iter()
                .cloned()
                .collect();

            if ready.is_empty() {
                let all_done = template.steps.keys().all(|key| {
                    state
                        .run
                        .step(key)
                        .is_some_and(|s| s.status == StepStatus::Completed)
                });
                if all_done {
                    break;
                }
                // A validated DAG cannot stall; reaching this means the log
                // already holds a failed or cancelled step (e.g. resumed
                // from a previous session).
                let stalled = state
                    .run
                    .steps
                    .iter()
                    .find(|s| s.status == StepStatus::Failed);
                let (step_key, message) = match stalled {
                    Some(step) => (
                        step.step_key.clone(),
                        step.error
                            .clone()
                            .unwrap_or_else(|| "step failed".to_string()),
                    ),
                    None => (StepKey::new("?"), "no runnable steps remain".to_string()),
                };
                self.fail_run(run_id, message.clone())?;
                return Err(EngineError::StepExecution {
                    run_id: run_id.clone(),
                    step_key,
                    code: codes::STEP_EXECUTION_ERROR,
                    message,
                    retry_count: 0,
                });
            }

            let wave = ready.iter().map(|key| {
                let step_index = order.iter().position(|k| k == key).unwrap_or(0);
                self.execute_step(
                    template,
                    run_id,
                    key,
                    step_index,
                    total_steps,
                    &state,
                    control,
                    deadline,
                )
            });
            let results = futures::future::join_all(wave).await;

            for result in results {
                if let StepRun::Failed {
                    step_key,
                    code,
                    message,
                    retry_count,
                } = result?
                {
                    self.fail_run(run_id, message.clone())?;
                    return Err(EngineError::StepExecution {
                        run_id: run_id.clone(),
                        step_key,
                        code,
                        message,
                        retry_count,
                    });
                }
            }
        }

        // Terminate: gather outputs in declaration order and complete
        let state = self.current_state(run_id)?;
        let mut outputs = IndexMap::new();
        for key in &order {
            if let Some(text) = state.run.step(key).and_then(|s| s.output()) {
                outputs.insert(key.clone(), text.to_string());
            }
        }
        self.events.append(
            run_id,
            EventPayload::RunCompleted { outputs },
            serde_json::Map::new(),
        )?;
        self.progress.publish(ProgressMessage::RunComplete {
            run_id: run_id.clone(),
        });
        info!(run = %run_id, "run completed");

        self.current_state(run_id)
    }

    /// One step: render, resolve models, then attempt with retries.
    #[allow(clippy::too_many_arguments)]
    async fn execute_step(
        &self,
        template: &PipelineTemplate,
        run_id: &RunId,
        step_key: &StepKey,
        step_index: usize,
        total_steps: usize,
        state: &PipelineState,
        control: &RunControl,
        deadline: Instant,
    ) -> Result<StepRun, EngineError> {
        let Some(spec) = template.step(step_key) else {
            return Ok(StepRun::Failed {
                step_key: step_key.clone(),
                code: codes::STEP_EXECUTION_ERROR,
                message: format!("step '{step_key}' is not part of the template"),
                retry_count: 0,
            });
        };

        let render_ctx = context::step_context(&state.run, template);
        let rendered = match render(&spec.prompt_template, &render_ctx, RenderMode::Strict) {
            Ok(rendered) => rendered,
            Err(e) => {
                return self.fail_step(run_id, step_key, codes::STEP_EXECUTION_ERROR, e.to_string(), 0)
            }
        };

        let models = if spec.step_type.calls_llm() {
            match self
                .llm
                .resolve_preferences(&spec.model_preference, &template.defaults)
            {
                Ok(models) => models,
                Err(e) => {
                    return self.fail_step(run_id, step_key, step_error_code(&e), e.to_string(), 0)
                }
            }
        } else {
            Vec::new()
        };
        let call_ctx = context::call_context(template, step_key);

        let mut retry_count = 0u32;
        loop {
            if control.is_cancelled() {
                return Ok(StepRun::Cancelled);
            }

            self.events.append(
                run_id,
                EventPayload::StepStarted {
                    step_key: step_key.clone(),
                    max_retries: self.config.max_retries,
                },
                serde_json::Map::new(),
            )?;
            if retry_count == 0 {
                self.progress.publish(ProgressMessage::StepStart {
                    run_id: run_id.clone(),
                    step_index,
                    step_key: step_key.clone(),
                    total_steps,
                });
            }

            let started = Instant::now();
            let budget = self
                .config
                .step_timeout
                .min(deadline.saturating_duration_since(started));
            let attempt = tokio::time::timeout(
                budget,
                self.dispatch(spec, &rendered.text, &models, &call_ctx, run_id, step_key),
            )
            .await;

            match attempt {
                Err(_) => {
                    return self.fail_step(
                        run_id,
                        step_key,
                        codes::TIMEOUT,
                        "timeout".to_string(),
                        retry_count,
                    );
                }
                Ok(Ok((responses, usage, model))) => {
                    self.events.append(
                        run_id,
                        EventPayload::StepResponseGenerated {
                            step_key: step_key.clone(),
                            responses: responses.clone(),
                        },
                        serde_json::Map::new(),
                    )?;
                    let mut tokens_used = BTreeMap::new();
                    if let Some(model) = model {
                        if usage.total > 0 {
                            tokens_used.insert(model, usage.total);
                        }
                    }
                    self.events.append(
                        run_id,
                        EventPayload::StepCompleted {
                            step_key: step_key.clone(),
                            execution_time_secs: started.elapsed().as_secs_f64(),
                            tokens_used,
                        },
                        serde_json::Map::new(),
                    )?;
                    self.progress.publish(ProgressMessage::StepComplete {
                        run_id: run_id.clone(),
                        step_index,
                        step_key: step_key.clone(),
                        responses,
                        selected: None,
                    });
                    return Ok(StepRun::Completed);
                }
                Ok(Err(FacadeError::Llm(e)))
                    if e.is_retryable() && retry_count < self.config.max_retries =>
                {
                    retry_count += 1;
                    warn!(
                        step = %step_key,
                        retry_count,
                        error = %e,
                        "retryable step failure"
                    );
                    self.events.append(
                        run_id,
                        EventPayload::StepRetried {
                            step_key: step_key.clone(),
                            retry_count,
                        },
                        serde_json::Map::new(),
                    )?;
                    tokio::time::sleep(self.config.retry_backoff.delay_for(retry_count)).await;
                }
                Ok(Err(e)) => {
                    let (code, message) = match &e {
                        FacadeError::Llm(llm) => (step_error_code(llm), llm.to_string()),
                        FacadeError::Cache(cache) => (codes::CACHE_ERROR, cache.to_string()),
                    };
                    return self.fail_step(run_id, step_key, code, message, retry_count);
                }
            }
        }
    }

    /// Append `step_failed` and build the failure outcome.
    fn fail_step(
        &self,
        run_id: &RunId,
        step_key: &StepKey,
        code: &'static str,
        message: String,
        retry_count: u32,
    ) -> Result<StepRun, EngineError> {
        self.events.append(
            run_id,
            EventPayload::StepFailed {
                step_key: step_key.clone(),
                error: message.clone(),
            },
            serde_json::Map::new(),
        )?;
        Ok(StepRun::Failed {
            step_key: step_key.clone(),
            code,
            message,
            retry_count,
        })
    }

    /// Perform the step's work: an LLM call for generate/refine steps
    /// (falling through the model preference list on unavailability), or a
    /// pure template transformation otherwise.
    async fn dispatch(
        &self,
        spec: &StepSpec,
        prompt: &str,
        models: &[ModelId],
        call_ctx: &CallContext,
        run_id: &RunId,
        step_key: &StepKey,
    ) -> Result<(Vec<String>, TokenUsage, Option<ModelId>), FacadeError> {
        if !spec.step_type.calls_llm() {
            // user_selection and transform steps produce the rendered text
            return Ok((vec![prompt.to_string()], TokenUsage::default(), None));
        }

        let mut last_err = FacadeError::Llm(LlmError::NoModel);
        for model in models {
            let result = if self.config.stream_tokens {
                self.stream_once(prompt, model, call_ctx, run_id, step_key)
                    .await
            } else {
                self.llm.complete(prompt, model, call_ctx).await
            };
            match result {
                Ok((text, usage)) => return Ok((vec![text], usage, Some(model.clone()))),
                Err(FacadeError::Llm(LlmError::ModelUnavailable(unavailable))) => {
                    warn!(model = %unavailable, "model unavailable, trying next preference");
                    last_err = FacadeError::Llm(LlmError::ModelUnavailable(unavailable));
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err)
    }

    /// Stream one call, publishing token chunks as they arrive.
    async fn stream_once(
        &self,
        prompt: &str,
        model: &ModelId,
        call_ctx: &CallContext,
        run_id: &RunId,
        step_key: &StepKey,
    ) -> Result<(String, TokenUsage), FacadeError> {
        let mut stream = self.llm.stream(prompt, model, call_ctx).await?;
        let mut collected = String::new();
        let mut usage = TokenUsage::default();

        while let Some(chunk) = stream.next().await {
            match chunk.map_err(FacadeError::Llm)? {
                StreamChunk::Token(token) => {
                    collected.push_str(&token);
                    self.progress.publish(ProgressMessage::TokenChunk {
                        run_id: run_id.clone(),
                        step_key: step_key.clone(),
                        chunk: token,
                    });
                }
                StreamChunk::Done { text, usage: u } => {
                    collected = text;
                    usage = u;
                }
            }
        }
        Ok((collected, usage))
    }

    /// Append the terminal `run_failed` event and notify subscribers.
    fn fail_run(&self, run_id: &RunId, message: String) -> Result<(), EngineError> {
        self.events.append(
            run_id,
            EventPayload::RunFailed {
                error: message.clone(),
            },
            serde_json::Map::new(),
        )?;
        self.progress.publish(ProgressMessage::RunFailed {
            run_id: run_id.clone(),
            error: message.clone(),
        });
        error!(run = %run_id, error = %message, "run failed");
        Ok(())
    }

    fn current_state(&self, run_id: &RunId) -> Result<PipelineState, EngineError> {
        self.events
            .state(run_id)?
            .ok_or_else(|| EngineError::RunNotFound(run_id.clone()))
    }
}

fn graph_validation_error(error: GraphError) -> EngineError {
    let code = match &error {
        GraphError::Cycle { .. } => writeit_template::codes::CIRCULAR_DEPENDENCY,
        GraphError::UnknownDependency { .. } => writeit_template::codes::MISSING_DEPENDENCY,
    };
    EngineError::PipelineValidation {
        result: ValidationResult {
            issues: vec![ValidationIssue::new(
                Severity::Error,
                code,
                "steps",
                error.to_string(),
            )],
        },
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
