// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The LLM provider boundary.
//!
//! [`LlmClient`] abstracts over providers with two modes: a buffered
//! [`complete`](LlmClient::complete) call and a token [`stream`](LlmClient::stream)
//! whose final chunk carries the full text and usage. Provider SDKs live
//! behind this trait; the runtime only ever sees normalized types.

use async_trait::async_trait;
use futures::stream::Stream;
use std::collections::BTreeMap;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use writeit_core::{ModelId, TokenUsage};

/// Call context forwarded to the provider and mixed into the cache key.
///
/// A sorted map, so iteration order (and therefore the cache key) does not
/// depend on insertion order.
pub type CallContext = BTreeMap<String, serde_json::Value>;

/// A buffered completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

/// One item of a token stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// An incremental token (or token group) as it arrives.
    Token(String),
    /// Final sentinel carrying the concatenated text and usage.
    Done { text: String, usage: TokenUsage },
}

/// A boxed async token stream.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, LlmError>> + Send>>;

/// Provider failure taxonomy.
///
/// The retryable partition is fixed here: transient provider faults and
/// rate limits retry (with backoff); an unavailable model falls through the
/// preference list once; an oversized context never retries.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LlmError {
    #[error("provider error: {0}")]
    Provider(String),
    #[error("model '{0}' is unavailable")]
    ModelUnavailable(ModelId),
    #[error("context too large for model '{model}': {detail}")]
    ContextTooLarge { model: ModelId, detail: String },
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("no model could be selected from preferences")]
    NoModel,
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Provider(_) | LlmError::RateLimited { .. })
    }
}

/// Uniform call/stream interface over an LLM provider.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Execute a buffered completion.
    async fn complete(
        &self,
        prompt: &str,
        model: &ModelId,
        context: &CallContext,
    ) -> Result<Completion, LlmError>;

    /// Open a token stream. The stream ends with [`StreamChunk::Done`].
    async fn stream(
        &self,
        prompt: &str,
        model: &ModelId,
        context: &CallContext,
    ) -> Result<TokenStream, LlmError>;
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
