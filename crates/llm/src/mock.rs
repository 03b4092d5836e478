// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted mock client for deterministic tests.
//!
//! Replies are consumed in order; when the script runs dry the last textual
//! reply repeats. Streaming emits whitespace-delimited chunks followed by
//! the `Done` sentinel. Token usage is derived from word counts so tests
//! can assert on it without a live provider.

use crate::client::{CallContext, Completion, LlmClient, LlmError, StreamChunk, TokenStream};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use writeit_core::{ModelId, TokenUsage};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Error(LlmError),
}

/// A test client that returns canned replies in order.
pub struct MockClient {
    script: Mutex<VecDeque<MockReply>>,
    last_text: Mutex<String>,
    calls: AtomicUsize,
}

impl MockClient {
    pub fn with_script(script: Vec<MockReply>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last_text: Mutex::new("mock response".to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Canned textual replies, in order; the last one repeats.
    pub fn new(replies: Vec<impl Into<String>>) -> Self {
        Self::with_script(
            replies
                .into_iter()
                .map(|r| MockReply::Text(r.into()))
                .collect(),
        )
    }

    /// Always return the same response.
    pub fn fixed(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Fail `failures` times with `error`, then return `text`.
    pub fn failing_then(failures: usize, error: LlmError, text: impl Into<String>) -> Self {
        let mut script: Vec<MockReply> =
            std::iter::repeat_with(|| MockReply::Error(error.clone()))
                .take(failures)
                .collect();
        script.push(MockReply::Text(text.into()));
        Self::with_script(script)
    }

    /// Number of provider calls made (cache hits never reach the mock).
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().pop_front();
        match next {
            Some(MockReply::Text(text)) => {
                *self.last_text.lock() = text.clone();
                Ok(text)
            }
            Some(MockReply::Error(e)) => Err(e),
            None => Ok(self.last_text.lock().clone()),
        }
    }

    fn usage_for(prompt: &str, response: &str) -> TokenUsage {
        TokenUsage::new(
            prompt.split_whitespace().count() as u64,
            response.split_whitespace().count() as u64,
        )
    }
}

#[async_trait]
impl LlmClient for MockClient {
    async fn complete(
        &self,
        prompt: &str,
        _model: &ModelId,
        _context: &CallContext,
    ) -> Result<Completion, LlmError> {
        let text = self.next_reply()?;
        let usage = Self::usage_for(prompt, &text);
        Ok(Completion { text, usage })
    }

    async fn stream(
        &self,
        prompt: &str,
        _model: &ModelId,
        _context: &CallContext,
    ) -> Result<TokenStream, LlmError> {
        let text = self.next_reply()?;
        let usage = Self::usage_for(prompt, &text);

        let mut items: Vec<Result<StreamChunk, LlmError>> = text
            .split_inclusive(' ')
            .map(|chunk| Ok(StreamChunk::Token(chunk.to_string())))
            .collect();
        items.push(Ok(StreamChunk::Done { text, usage }));

        Ok(Box::pin(futures::stream::iter(items)))
    }
}

#[cfg(test)]
#[path = "mock_tests.rs"]
mod tests;
