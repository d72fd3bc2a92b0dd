// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use super::*;

#[test]
fn new_task_starts_pending_with_version_zero() {
    let task = Task::new("parent-1", "reviewer", "review the diff", "do the thing", None, Arc::new(ManagerConfig::default()));
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.state_version, 0);
    assert_eq!(task.model, "default");
    assert!(is_valid_task_id(&task.id));
}

#[test]
fn explicit_model_is_preserved() {
    let task = Task::new("parent-1", "reviewer", "d", "p", Some("anthropic/claude-opus-4".to_owned()), Arc::new(ManagerConfig::default()));
    assert_eq!(task.model, "anthropic/claude-opus-4");
}

#[test]
fn generated_ids_match_the_expected_shape() {
    for _ in 0..64 {
        let id = generate_task_id();
        assert!(is_valid_task_id(&id), "{id} did not match bg_[a-f0-9]{{8}}");
    }
}

#[test]
fn task_id_validation_rejects_malformed_input() {
    assert!(!is_valid_task_id("bg_123"));
    assert!(!is_valid_task_id("bg_deadbeefxx"));
    assert!(!is_valid_task_id("xx_deadbeef"));
    assert!(!is_valid_task_id("bg_DEADBEEF"));
    assert!(is_valid_task_id("bg_deadbeef"));
}

#[test]
fn short_results_are_not_truncated() {
    let (result, truncated) = truncate_result("hello world");
    assert_eq!(result, "hello world");
    assert!(!truncated);
}

#[test]
fn oversized_results_are_truncated_to_the_cap() {
    let raw = "a".repeat(RESULT_CAP_BYTES + 1024);
    let (result, truncated) = truncate_result(&raw);
    assert!(truncated);
    assert!(result.len() <= RESULT_CAP_BYTES);
    assert!(result.ends_with("[truncated]"));
}

#[test]
fn truncation_never_splits_a_multi_byte_character() {
    let mut raw = "x".repeat(RESULT_CAP_BYTES - 1);
    raw.push('\u{1F600}');
    raw.push_str(&"y".repeat(64));
    let (result, truncated) = truncate_result(&raw);
    assert!(truncated);
    assert!(result.is_char_boundary(result.len() - TRUNCATION_MARKER.len()));
}

#[test]
fn iso8601_formatting_round_trips_a_known_instant() {
    // 2024-01-15T12:30:45.000Z, a fixed reference instant.
    let secs: u64 = 1_705_321_845;
    assert_eq!(format_iso8601(secs, 0), "2024-01-15T12:30:45.000Z");
}

#[test]
fn iso8601_formatting_handles_epoch() {
    assert_eq!(format_iso8601(0, 0), "1970-01-01T00:00:00.000Z");
}

#[test]
fn parse_iso8601_ms_inverts_now_iso8601() {
    let formatted = now_iso8601();
    let parsed = parse_iso8601_ms(&formatted).unwrap();
    let reformatted = format_iso8601(parsed / 1000, (parsed % 1000) as u32);
    assert_eq!(formatted, reformatted);
}

#[test]
fn parse_iso8601_ms_matches_the_known_reference_instant() {
    assert_eq!(parse_iso8601_ms("2024-01-15T12:30:45.000Z"), Some(1_705_321_845_000));
}

#[test]
fn parse_iso8601_ms_rejects_malformed_input() {
    assert!(parse_iso8601_ms("not a timestamp").is_none());
    assert!(parse_iso8601_ms("2024-01-15 12:30:45.000Z").is_none());
}
