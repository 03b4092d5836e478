// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Progress fan-out to TUI and WebSocket subscribers.
//!
//! Messages flow over a bounded broadcast channel. A subscriber that falls
//! behind loses the oldest progress messages (a `lagging_subscriber`
//! warning is recorded); token chunks lost here are never lost for good,
//! the full response is persisted in the run's events.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use writeit_core::{RunId, StepKey};

/// Tagged progress messages delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressMessage {
    StepStart {
        run_id: RunId,
        step_index: usize,
        step_key: StepKey,
        total_steps: usize,
    },
    StepComplete {
        run_id: RunId,
        step_index: usize,
        step_key: StepKey,
        responses: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        selected: Option<String>,
    },
    TokenChunk {
        run_id: RunId,
        step_key: StepKey,
        chunk: String,
    },
    RunComplete {
        run_id: RunId,
    },
    RunFailed {
        run_id: RunId,
        error: String,
    },
    RunCancelled {
        run_id: RunId,
    },
}

/// Broadcast sender side.
pub struct ProgressBus {
    tx: broadcast::Sender<ProgressMessage>,
}

impl ProgressBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> ProgressSubscriber {
        ProgressSubscriber {
            rx: self.tx.subscribe(),
        }
    }

    /// Publish to all current subscribers. Publishing with no subscribers
    /// is a no-op.
    pub fn publish(&self, message: ProgressMessage) {
        if let Err(e) = self.tx.send(message) {
            debug!(error = %e, "no progress subscribers");
        }
    }
}

/// Receiver side; skips over lagged gaps instead of failing.
pub struct ProgressSubscriber {
    rx: broadcast::Receiver<ProgressMessage>,
}

impl ProgressSubscriber {
    /// Next message, or `None` once the bus is closed.
    pub async fn recv(&mut self) -> Option<ProgressMessage> {
        loop {
            match self.rx.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(dropped)) => {
                    warn!(dropped, "lagging_subscriber");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking drain used by tests and polling UIs.
    pub fn try_recv(&mut self) -> Option<ProgressMessage> {
        loop {
            match self.rx.try_recv() {
                Ok(message) => return Some(message),
                Err(broadcast::error::TryRecvError::Lagged(dropped)) => {
                    warn!(dropped, "lagging_subscriber");
                }
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
#[path = "progress_tests.rs"]
mod tests;
