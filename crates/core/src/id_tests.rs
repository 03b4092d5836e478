// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn test_uuid_gen_produces_unique_typed_ids() {
    let id_gen = UuidIdGen;
    let a = id_gen.run_id();
    let b = id_gen.run_id();
    assert_ne!(a, b);
    assert_eq!(a.as_str().len(), 36);

    // Kinds draw from independent uuids
    assert_ne!(id_gen.event_id().as_str(), id_gen.run_id().as_str());
}

#[test]
fn test_fake_gen_counts_each_kind_independently() {
    let id_gen = FakeIdGen::new();
    assert_eq!(id_gen.run_id(), "run-1");
    assert_eq!(id_gen.event_id(), "ev-1");
    assert_eq!(id_gen.event_id(), "ev-2");
    // Run counter is untouched by event minting
    assert_eq!(id_gen.run_id(), "run-2");
    assert_eq!(id_gen.template_id(), "tpl-1");
}

#[test]
fn test_fake_gen_clones_share_counters() {
    let id_gen = FakeIdGen::new();
    assert_eq!(id_gen.run_id(), "run-1");

    let clone = id_gen.clone();
    assert_eq!(clone.run_id(), "run-2");
    assert_eq!(id_gen.run_id(), "run-3");
}

#[test]
fn test_short_id_truncation() {
    let id = RunId::new("abcdef123456");
    assert_eq!(id.short(6), "abcdef");
    assert_eq!(id.short(100), "abcdef123456");
}

#[test]
fn test_id_string_comparisons() {
    let key = StepKey::new("outline");
    assert_eq!(key, "outline");
    assert_eq!(key.as_str(), "outline");
    assert_eq!(key.to_string(), "outline");
    assert_eq!(StepKey::from("outline"), key);
}

#[test]
fn test_id_serializes_transparently() {
    let id = RunId::new("run-1");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"run-1\"");
    let back: RunId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

#[test]
fn test_branched_run_id() {
    let id = RunId::new("run-1");
    assert_eq!(id.branched("retry-outline"), "run-1+retry-outline");
}
