// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only event log per run, with snapshot-accelerated replay.
//!
//! Events live in the `pipeline_events` sub-database under keys
//! `event_{run_id}_{sequence:06}` so a lexicographic prefix scan yields
//! chronological order. Sequence numbers are dense per run and start at 1;
//! on startup they are rebuilt by scanning for the highest existing key.
//! A `state_snapshot` event is interleaved every K appends to bound replay
//! cost, and the folded run record is written through to `pipeline_runs`
//! whenever a run reaches a terminal status.

use crate::engine::{StorageEngine, StorageError, PIPELINE_EVENTS, PIPELINE_RUNS};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use writeit_core::{
    Clock, EventPayload, IdGen, PipelineEvent, PipelineRun, PipelineState, RunId, SystemClock,
    UuidIdGen,
};

/// Default snapshot cadence: one `state_snapshot` every K events.
pub const DEFAULT_SNAPSHOT_EVERY: u64 = 100;

/// Events are loaded in batches of this size to bound memory on large logs.
const REPLAY_BATCH: usize = 100;

/// Errors from event store operations.
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("run {0} is terminal; no further events may be appended")]
    TerminalRun(RunId),
    #[error("run {0} has no events")]
    RunNotFound(RunId),
    #[error("first event for run {0} must be run_created")]
    MissingRunCreated(RunId),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("event serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default)]
struct SeqState {
    last: u64,
    terminal: bool,
}

fn event_key(run_id: &RunId, seq: u64) -> String {
    format!("event_{}_{:06}", run_id, seq)
}

fn run_prefix(run_id: &RunId) -> String {
    format!("event_{}_", run_id)
}

fn run_record_key(run_id: &RunId) -> String {
    format!("pipeline_run_{}", run_id)
}

/// The per-workspace event store.
pub struct EventStore<C: Clock = SystemClock, I: IdGen = UuidIdGen> {
    engine: Arc<StorageEngine>,
    clock: C,
    ids: I,
    snapshot_every: u64,
    /// In-memory sequence counters, rebuilt lazily from the log. The mutex
    /// also serializes appends so sequence numbers stay dense.
    counters: Mutex<HashMap<RunId, SeqState>>,
}

impl EventStore {
    pub fn new(engine: Arc<StorageEngine>) -> Self {
        Self::with_parts(engine, SystemClock, UuidIdGen)
    }
}

impl<C: Clock, I: IdGen> EventStore<C, I> {
    pub fn with_parts(engine: Arc<StorageEngine>, clock: C, ids: I) -> Self {
        Self {
            engine,
            clock,
            ids,
            snapshot_every: DEFAULT_SNAPSHOT_EVERY,
            counters: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_snapshot_every(mut self, every: u64) -> Self {
        self.snapshot_every = every.max(1);
        self
    }

    pub fn engine(&self) -> &Arc<StorageEngine> {
        &self.engine
    }

    /// Append an event to a run's stream and return the stored record.
    ///
    /// Fails with [`EventStoreError::TerminalRun`] once a terminal event has
    /// been appended, and enforces that streams open with `run_created`.
    pub fn append(
        &self,
        run_id: &RunId,
        payload: EventPayload,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Result<PipelineEvent, EventStoreError> {
        let mut counters = self.counters.lock();
        let seq_state = self.seq_state(&mut counters, run_id)?;

        if seq_state.terminal {
            return Err(EventStoreError::TerminalRun(run_id.clone()));
        }
        if seq_state.last == 0 && !matches!(payload, EventPayload::RunCreated(_)) {
            return Err(EventStoreError::MissingRunCreated(run_id.clone()));
        }

        let seq = seq_state.last + 1;
        let event = PipelineEvent {
            id: self.ids.event_id(),
            run_id: run_id.clone(),
            timestamp: self.clock.now(),
            sequence_number: seq,
            payload,
            metadata,
        };

        let key = event_key(run_id, seq);
        let value = serde_json::to_vec(&event)?;
        self.engine
            .put(PIPELINE_EVENTS, key.as_bytes(), &value)?;

        let terminal = event.is_terminal();
        counters.insert(
            run_id.clone(),
            SeqState {
                last: seq,
                terminal,
            },
        );
        debug!(event = %event.log_summary(), "event appended");

        // Interior work below re-reads the log; release the append lock.
        drop(counters);

        if terminal {
            // Write-through of the final folded record so list/inspect
            // operations need no replay after completion.
            match self.state(run_id) {
                Ok(Some(state)) => self.store_run_record(&state.run)?,
                Ok(None) => {}
                Err(e) => warn!(run = %run_id, error = %e, "final run record write-through failed"),
            }
        } else if seq % self.snapshot_every == 0
            && !matches!(event.payload, EventPayload::StateSnapshot { .. })
        {
            if let Err(e) = self.snapshot(run_id) {
                warn!(run = %run_id, error = %e, "periodic snapshot failed");
            }
        }

        Ok(event)
    }

    /// Rebuild the sequence counter for a run by scanning its key range.
    fn seq_state(
        &self,
        counters: &mut HashMap<RunId, SeqState>,
        run_id: &RunId,
    ) -> Result<SeqState, EventStoreError> {
        if let Some(state) = counters.get(run_id) {
            return Ok(*state);
        }

        let keys = self
            .engine
            .list_keys(PIPELINE_EVENTS, run_prefix(run_id).as_bytes())?;
        let state = match keys.last() {
            None => SeqState::default(),
            Some(last_key) => {
                let last = parse_seq(last_key).unwrap_or(keys.len() as u64);
                let terminal = match self.engine.get(PIPELINE_EVENTS, last_key)? {
                    Some(bytes) => serde_json::from_slice::<PipelineEvent>(&bytes)
                        .map(|e| e.is_terminal())
                        .unwrap_or(false),
                    None => false,
                };
                SeqState { last, terminal }
            }
        };
        counters.insert(run_id.clone(), state);
        Ok(state)
    }

    /// All events for a run with `sequence_number > from_seq`, in order.
    ///
    /// Values are loaded in batches to bound memory; individually corrupt
    /// records are logged and skipped so one bad write cannot brick a run.
    pub fn events(
        &self,
        run_id: &RunId,
        from_seq: u64,
    ) -> Result<Vec<PipelineEvent>, EventStoreError> {
        let keys = self
            .engine
            .list_keys(PIPELINE_EVENTS, run_prefix(run_id).as_bytes())?;

        let mut events = Vec::with_capacity(keys.len());
        for batch in keys.chunks(REPLAY_BATCH) {
            for key in batch {
                let bytes = match self.engine.get(PIPELINE_EVENTS, key)? {
                    Some(bytes) => bytes,
                    None => continue,
                };
                match serde_json::from_slice::<PipelineEvent>(&bytes) {
                    Ok(event) => {
                        if event.sequence_number > from_seq {
                            events.push(event);
                        }
                    }
                    Err(e) => {
                        warn!(
                            key = %String::from_utf8_lossy(key),
                            error = %e,
                            "corrupt event record skipped"
                        );
                    }
                }
            }
        }
        events.sort_by_key(|e| e.sequence_number);
        Ok(events)
    }

    /// Current state of a run: fold of its events, starting from the latest
    /// snapshot when one exists. Returns `None` for unknown runs.
    pub fn state(&self, run_id: &RunId) -> Result<Option<PipelineState>, EventStoreError> {
        let events = self.events(run_id, 0)?;
        if events.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.replay(run_id, &events)?))
    }

    /// State at an exact version, replayed from `run_created` without
    /// snapshot shortcuts. Returns `None` when the run never reached that
    /// version.
    pub fn state_at(
        &self,
        run_id: &RunId,
        version: u64,
    ) -> Result<Option<PipelineState>, EventStoreError> {
        let events = self.events(run_id, 0)?;
        let mut iter = events.iter();

        let mut state = match iter.next() {
            Some(first) => match &first.payload {
                EventPayload::RunCreated(run) => PipelineState::new(run.clone(), first.timestamp),
                _ => return Err(EventStoreError::MissingRunCreated(run_id.clone())),
            },
            None => return Ok(None),
        };

        if state.version == version {
            return Ok(Some(state));
        }
        for event in iter {
            if matches!(event.payload, EventPayload::StateSnapshot { .. }) {
                continue;
            }
            match state.apply(event) {
                Ok(next) => state = next,
                Err(e) => {
                    warn!(event = %event.log_summary(), error = %e, "skipping unappliable event");
                    continue;
                }
            }
            if state.version == version {
                return Ok(Some(state));
            }
        }
        Ok(None)
    }

    fn replay(
        &self,
        run_id: &RunId,
        events: &[PipelineEvent],
    ) -> Result<PipelineState, EventStoreError> {
        // Begin from the highest snapshot when present
        let snapshot = events.iter().enumerate().rev().find_map(|(idx, e)| {
            match &e.payload {
                EventPayload::StateSnapshot { state } => Some((idx, state)),
                _ => None,
            }
        });

        let (mut state, rest) = match snapshot {
            Some((idx, snapshot_state)) => (snapshot_state.clone(), &events[idx + 1..]),
            None => match &events[0].payload {
                EventPayload::RunCreated(run) => (
                    PipelineState::new(run.clone(), events[0].timestamp),
                    &events[1..],
                ),
                _ => return Err(EventStoreError::MissingRunCreated(run_id.clone())),
            },
        };

        for event in rest {
            match state.apply(event) {
                Ok(next) => state = next,
                Err(e) => {
                    warn!(event = %event.log_summary(), error = %e, "skipping unappliable event");
                }
            }
        }
        Ok(state)
    }

    /// Append a `state_snapshot` event carrying the current folded state.
    pub fn snapshot(&self, run_id: &RunId) -> Result<PipelineEvent, EventStoreError> {
        let state = self
            .state(run_id)?
            .ok_or_else(|| EventStoreError::RunNotFound(run_id.clone()))?;
        self.append(
            run_id,
            EventPayload::StateSnapshot { state },
            serde_json::Map::new(),
        )
    }

    /// Fork a run's current state into a named branch stored under a
    /// derived run id. The branch stream opens with its own `run_created`.
    pub fn branch(
        &self,
        run_id: &RunId,
        name: &str,
    ) -> Result<(RunId, PipelineState), EventStoreError> {
        let state = self
            .state(run_id)?
            .ok_or_else(|| EventStoreError::RunNotFound(run_id.clone()))?;

        let branch_id = run_id.branched(name);
        let mut branched = state.branch(name, self.clock.now());
        branched.run.id = branch_id.clone();

        self.append(
            &branch_id,
            EventPayload::RunCreated(branched.run.clone()),
            serde_json::Map::new(),
        )?;
        Ok((branch_id, branched))
    }

    fn store_run_record(&self, run: &PipelineRun) -> Result<(), EventStoreError> {
        let key = run_record_key(&run.id);
        let value = serde_json::to_vec(run)?;
        self.engine.put(PIPELINE_RUNS, key.as_bytes(), &value)?;
        Ok(())
    }

    /// Load the written-through run record, if the run has completed.
    pub fn load_run_record(&self, run_id: &RunId) -> Result<Option<PipelineRun>, EventStoreError> {
        let key = run_record_key(run_id);
        match self.engine.get(PIPELINE_RUNS, key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

fn parse_seq(key: &[u8]) -> Option<u64> {
    let text = std::str::from_utf8(key).ok()?;
    let (_, seq) = text.rsplit_once('_')?;
    seq.parse().ok()
}

#[cfg(test)]
#[path = "event_store_tests.rs"]
mod tests;
