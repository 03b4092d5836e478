// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! writeit-llm: LLM client boundary, response cache, and cached facade

pub mod backoff;
pub mod cache;
pub mod client;
pub mod facade;
#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use backoff::BackoffConfig;
pub use cache::{cache_key, CacheEntry, CacheError, CacheStats, LlmCache};
pub use client::{CallContext, Completion, LlmClient, LlmError, StreamChunk, TokenStream};
pub use facade::{FacadeError, LlmFacade};
#[cfg(any(test, feature = "test-support"))]
pub use mock::{MockClient, MockReply};
