// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cached LLM client facade.
//!
//! [`LlmFacade`] is the one entry point the engine calls: `complete` reads
//! through the cache; `stream` bypasses the read path entirely and writes
//! the concatenated response once the final chunk arrives.
//!
//! Exactly one layer owns the retry decision. By default the facade
//! performs no retries of its own: the executor driving it classifies
//! retryable errors, sleeps with backoff, and records every attempt as a
//! `step_retried` event, so the event log matches actual provider call
//! volume. [`LlmFacade::with_backoff`] opts into facade-level transport
//! retries for callers that embed the facade without the executor; never
//! combine it with executor retries, or both layers will multiply. Retries
//! never change cache keys: same inputs, same key.

use crate::backoff::BackoffConfig;
use crate::cache::{CacheError, LlmCache};
use crate::client::{CallContext, LlmClient, LlmError, StreamChunk, TokenStream};
use futures::StreamExt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use writeit_core::{Clock, ModelId, SystemClock, TokenUsage};

/// Errors surfaced by the facade.
#[derive(Debug, Error)]
pub enum FacadeError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl FacadeError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FacadeError::Llm(e) if e.is_retryable())
    }
}

/// Cache-integrated client. Performs no retries unless opted in via
/// [`with_backoff`](Self::with_backoff).
pub struct LlmFacade<L, C: Clock = SystemClock> {
    inner: Arc<L>,
    cache: Arc<LlmCache<C>>,
    backoff: BackoffConfig,
}

impl<L: LlmClient, C: Clock> LlmFacade<L, C> {
    pub fn new(inner: Arc<L>, cache: Arc<LlmCache<C>>) -> Self {
        Self {
            inner,
            cache,
            backoff: BackoffConfig::none(),
        }
    }

    /// Opt into facade-level transport retries.
    ///
    /// Only for callers that use the facade standalone. The executor owns
    /// retries (and their `step_retried` bookkeeping) itself and expects a
    /// facade that surfaces every provider error unretried.
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn cache(&self) -> &Arc<LlmCache<C>> {
        &self.cache
    }

    /// Cached completion. On a miss, the provider is called (once, unless
    /// transport retries were opted in) and the response is written to
    /// both cache tiers.
    pub async fn complete(
        &self,
        prompt: &str,
        model: &ModelId,
        context: &CallContext,
    ) -> Result<(String, TokenUsage), FacadeError> {
        if let Some(entry) = self.cache.get(prompt, model, context)? {
            return Ok((entry.response, entry.tokens_used));
        }

        let completion = self.call_with_retries(prompt, model, context).await?;
        self.cache.put(
            prompt,
            model,
            context,
            &completion.text,
            completion.usage,
            None,
        )?;
        Ok((completion.text, completion.usage))
    }

    async fn call_with_retries(
        &self,
        prompt: &str,
        model: &ModelId,
        context: &CallContext,
    ) -> Result<crate::client::Completion, LlmError> {
        let mut attempt = 0u32;
        loop {
            match self.inner.complete(prompt, model, context).await {
                Ok(completion) => return Ok(completion),
                Err(e) if e.is_retryable() && attempt < self.backoff.max_retries => {
                    attempt += 1;
                    let delay = match &e {
                        LlmError::RateLimited {
                            retry_after: Some(after),
                        } => *after,
                        _ => self.backoff.delay_for(attempt),
                    };
                    warn!(
                        model = %model,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient provider error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Token stream, bypassing the read cache. When the final chunk
    /// arrives, the concatenated response is written to the cache so a
    /// later `complete` with the same inputs hits.
    pub async fn stream(
        &self,
        prompt: &str,
        model: &ModelId,
        context: &CallContext,
    ) -> Result<TokenStream, FacadeError> {
        let inner = self.inner.stream(prompt, model, context).await?;

        let cache = Arc::clone(&self.cache);
        let prompt = prompt.to_string();
        let model = model.clone();
        let context = context.clone();

        let stream = futures::stream::unfold(
            (inner, cache, prompt, model, context),
            |(mut inner, cache, prompt, model, context)| async move {
                let item = inner.next().await?;
                if let Ok(StreamChunk::Done { text, usage }) = &item {
                    if let Err(e) = cache.put(&prompt, &model, &context, text, *usage, None) {
                        warn!(model = %model, error = %e, "failed to cache streamed response");
                    } else {
                        debug!(model = %model, "streamed response cached");
                    }
                }
                Some((item, (inner, cache, prompt, model, context)))
            },
        );
        Ok(Box::pin(stream))
    }

    /// Pick a model from an ordered preference list, substituting
    /// `{{ defaults.* }}` placeholders from the template's defaults tree.
    ///
    /// With an empty preference list, falls back to a top-level
    /// `defaults.model` entry.
    pub fn select_model(
        &self,
        preferences: &[ModelId],
        defaults: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<ModelId, LlmError> {
        self.resolve_preferences(preferences, defaults)?
            .into_iter()
            .next()
            .ok_or(LlmError::NoModel)
    }

    /// Resolve the whole preference list, in order, dropping entries whose
    /// placeholders do not resolve. Used for model fallback when a
    /// provider reports a model unavailable.
    pub fn resolve_preferences(
        &self,
        preferences: &[ModelId],
        defaults: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Vec<ModelId>, LlmError> {
        let raw: Vec<String> = if preferences.is_empty() {
            defaults
                .get("model")
                .and_then(|v| v.as_str())
                .map(|m| vec![m.to_string()])
                .ok_or(LlmError::NoModel)?
        } else {
            preferences.iter().map(|p| p.as_str().to_string()).collect()
        };

        let resolved: Vec<ModelId> = raw
            .iter()
            .map(|r| substitute_defaults(r, defaults))
            .filter(|r| !r.trim().is_empty() && !r.contains("{{"))
            .map(|r| ModelId::new(r.trim()))
            .collect();

        if resolved.is_empty() {
            return Err(LlmError::NoModel);
        }
        Ok(resolved)
    }
}

/// Replace `{{ defaults.a.b }}` placeholders in a model preference string.
fn substitute_defaults(
    raw: &str,
    defaults: &serde_json::Map<String, serde_json::Value>,
) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(open) = rest.find("{{") {
        let (head, tail) = rest.split_at(open);
        out.push_str(head);
        match tail.find("}}") {
            Some(close) => {
                let inner = tail[2..close].trim();
                let replaced = inner
                    .strip_prefix("defaults.")
                    .and_then(|path| lookup(defaults, path))
                    .and_then(|v| scalar(v));
                match replaced {
                    Some(text) => out.push_str(&text),
                    // Leave unresolved placeholders in place; the caller
                    // rejects them.
                    None => out.push_str(&tail[..close + 2]),
                }
                rest = &tail[close + 2..];
            }
            None => {
                out.push_str(tail);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn lookup<'a>(
    defaults: &'a serde_json::Map<String, serde_json::Value>,
    path: &str,
) -> Option<&'a serde_json::Value> {
    let mut segments = path.split('.');
    let mut current = defaults.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn scalar(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
#[path = "facade_tests.rs"]
mod tests;
