// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PulseLink Health

//! Tests for mutation commands and records.

#![allow(clippy::unwrap_used)]

use super::*;
use serde_json::json;
use yare::parameterized;

#[parameterized(
    high_before_normal = { Priority::High, Priority::Normal },
    high_before_low = { Priority::High, Priority::Low },
    normal_before_low = { Priority::Normal, Priority::Low },
)]
fn priority_ordering(first: Priority, second: Priority) {
    assert!(first < second);
}

#[test]
fn priority_serializes_snake_case() {
    assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "\"high\"");
    assert_eq!(
        serde_json::to_string(&Priority::Normal).unwrap(),
        "\"normal\""
    );
    assert_eq!(serde_json::to_string(&Priority::Low).unwrap(), "\"low\"");
}

#[test]
fn record_starts_with_empty_retry_history() {
    let command = MutationCommand::new("prescription.create", json!({"rx": 12}));
    let record = MutationRecord::new("m-1", command, Priority::Normal, 3);

    assert_eq!(record.id, "m-1");
    assert_eq!(record.retry_count, 0);
    assert_eq!(record.max_retries, 3);
}

#[test]
fn register_failure_exhausts_after_budget() {
    let command = MutationCommand::new("note.update", json!({}));
    let mut record = MutationRecord::new("m-2", command, Priority::Low, 2);

    // Two retries allowed: the third failure exhausts the budget.
    assert!(!record.register_failure());
    assert!(!record.register_failure());
    assert!(record.register_failure());
    assert_eq!(record.retry_count, 3);
}

#[test]
fn zero_retries_drops_on_first_failure() {
    let command = MutationCommand::new("note.update", json!({}));
    let mut record = MutationRecord::new("m-3", command, Priority::High, 0);

    assert!(record.register_failure());
}

#[test]
fn record_roundtrips_through_json() {
    let command = MutationCommand::new("appointment.cancel", json!({"id": "apt-9"}));
    let record = MutationRecord::new("m-4", command, Priority::High, 3);

    let json = serde_json::to_string(&record).unwrap();
    let back: MutationRecord = serde_json::from_str(&json).unwrap();

    assert_eq!(back, record);
    assert!(json.contains("\"priority\":\"high\""));
}
