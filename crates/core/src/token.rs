// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token usage accounting for LLM calls.

use crate::id::ModelId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Token usage for a single LLM call.
///
/// All counts are zero when the provider returns no usage data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64) -> Self {
        Self {
            input,
            output,
            total: input + output,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.total == 0
    }

    /// Merge another usage record into this one.
    pub fn add(&mut self, other: TokenUsage) {
        self.input += other.input;
        self.output += other.output;
        self.total += other.total;
    }
}

/// Aggregated token usage for a run, broken down by model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTokenTotals {
    pub by_model: BTreeMap<ModelId, TokenUsage>,
}

impl RunTokenTotals {
    pub fn record(&mut self, model: &ModelId, usage: TokenUsage) {
        self.by_model.entry(model.clone()).or_default().add(usage);
    }

    pub fn total(&self) -> TokenUsage {
        let mut sum = TokenUsage::default();
        for usage in self.by_model.values() {
            sum.add(*usage);
        }
        sum
    }
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
