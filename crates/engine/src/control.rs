// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cooperative run control.
//!
//! Cancellation and pause are flags observed at step boundaries and before
//! each LLM call; the currently running step is allowed to finish. There
//! is no rollback of partial outputs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct Flags {
    cancelled: AtomicBool,
    paused: AtomicBool,
}

/// Shared handle used to cancel or pause a run.
#[derive(Clone, Default)]
pub struct RunControl {
    flags: Arc<Flags>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flags.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flags.cancelled.load(Ordering::SeqCst)
    }

    pub fn pause(&self) {
        self.flags.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.flags.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.flags.paused.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[path = "control_tests.rs"]
mod tests;
