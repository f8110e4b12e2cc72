// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PulseLink Health

//! Tests for wire envelopes.

#![allow(clippy::unwrap_used)]

use super::*;
use serde_json::json;

#[test]
fn envelope_roundtrips_through_json() {
    let envelope = EventEnvelope::new(names::LAB_RESULT_READY, json!({"order": "lab-77"}));

    let json = envelope.to_json().unwrap();
    let back = EventEnvelope::from_json(&json).unwrap();

    assert_eq!(back, envelope);
}

#[test]
fn envelope_missing_payload_defaults_to_null() {
    let envelope = EventEnvelope::from_json(r#"{"event":"record.updated"}"#).unwrap();

    assert_eq!(envelope.event, names::RECORD_UPDATED);
    assert!(envelope.payload.is_null());
}

#[test]
fn outbound_event_carries_a_timestamp() {
    let before = Utc::now();
    let item = OutboundEvent::new(EventEnvelope::new("message.received", json!({})));

    assert!(item.queued_at >= before);
    assert!(item.queued_at <= Utc::now());
}
