// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier newtypes and the generator that mints them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Define a newtype ID wrapper around `String`.
///
/// Generates `new()`, `as_str()`, `short()`, `Display`, `From<String>`,
/// `From<&str>`, and `PartialEq<str>`/`PartialEq<&str>` implementations.
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns a string slice truncated to at most `n` characters.
            pub fn short(&self, n: usize) -> &str {
                if self.0.len() <= n {
                    &self.0
                } else {
                    &self.0[..n]
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

define_id! {
    /// Unique identifier for a pipeline run.
    ///
    /// Each run gets a unique ID used to key its event stream, query its
    /// state, and reference it in logs and progress messages.
    pub struct RunId;
}

impl RunId {
    /// Derived run id for a branch of this run's state.
    ///
    /// Branch streams are stored under their own id so the parent stream
    /// stays untouched.
    pub fn branched(&self, branch: &str) -> RunId {
        RunId(format!("{}+{}", self.0, branch))
    }
}

define_id! {
    /// Unique identifier for a single event record.
    pub struct EventId;
}

define_id! {
    /// Identifier of a loaded pipeline template.
    pub struct TemplateId;
}

define_id! {
    /// Key of a step within a pipeline template (the map key in the document).
    #[derive(Default)]
    pub struct StepKey;
}

define_id! {
    /// An LLM model identifier (e.g. `gpt-4o-mini`).
    pub struct ModelId;
}

define_id! {
    /// Name of a workspace. Names are slugs, not paths.
    #[derive(Default)]
    pub struct WorkspaceName;
}

/// Mints the identifiers the runtime needs.
///
/// Ids are typed at the source, so a run id can never end up where an
/// event id belongs.
pub trait IdGen: Clone + Send + Sync {
    fn run_id(&self) -> RunId;
    fn event_id(&self) -> EventId;
    fn template_id(&self) -> TemplateId;
}

/// UUID-backed generator for production use
#[derive(Clone, Default)]
pub struct UuidIdGen;

impl UuidIdGen {
    fn fresh() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

impl IdGen for UuidIdGen {
    fn run_id(&self) -> RunId {
        RunId::new(Self::fresh())
    }

    fn event_id(&self) -> EventId {
        EventId::new(Self::fresh())
    }

    fn template_id(&self) -> TemplateId {
        TemplateId::new(Self::fresh())
    }
}

#[derive(Default)]
struct FakeCounters {
    runs: AtomicU64,
    events: AtomicU64,
    templates: AtomicU64,
}

/// Deterministic generator for tests.
///
/// Each id kind counts independently, yielding `run-1`, `ev-1`, `tpl-1`,
/// and so on. Clones share the counters.
#[derive(Clone, Default)]
pub struct FakeIdGen {
    counters: Arc<FakeCounters>,
}

impl FakeIdGen {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(counter: &AtomicU64, prefix: &str) -> String {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{prefix}-{n}")
    }
}

impl IdGen for FakeIdGen {
    fn run_id(&self) -> RunId {
        RunId::new(Self::next(&self.counters.runs, "run"))
    }

    fn event_id(&self) -> EventId {
        EventId::new(Self::next(&self.counters.events, "ev"))
    }

    fn template_id(&self) -> TemplateId {
        TemplateId::new(Self::next(&self.counters.templates, "tpl"))
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
