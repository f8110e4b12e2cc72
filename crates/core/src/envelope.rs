// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PulseLink Health

//! Wire envelopes for the realtime channel.
//!
//! Events are (name, JSON payload) pairs. The channel routes by name only;
//! payload shapes belong to the feature-level consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named event with a JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    /// Event name used for handler lookup.
    pub event: String,
    /// Opaque payload, forwarded to handlers verbatim.
    #[serde(default)]
    pub payload: Value,
}

impl EventEnvelope {
    /// Creates a new envelope.
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        EventEnvelope {
            event: event.into(),
            payload,
        }
    }

    /// Serializes the envelope to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes an envelope from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// An event captured while the channel was offline.
///
/// Buffered events are replayed in submission order on the next successful
/// connect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboundEvent {
    /// The event to deliver.
    pub envelope: EventEnvelope,
    /// When the event entered the buffer.
    pub queued_at: DateTime<Utc>,
}

impl OutboundEvent {
    /// Wraps an envelope with the current timestamp.
    pub fn new(envelope: EventEnvelope) -> Self {
        OutboundEvent {
            envelope,
            queued_at: Utc::now(),
        }
    }
}

/// Well-known event names pushed by the backend.
///
/// Consumers register handlers for these; the engine never interprets the
/// payloads behind them.
pub mod names {
    /// A new message arrived for the signed-in user.
    pub const MESSAGE_RECEIVED: &str = "message.received";
    /// An upcoming appointment reminder.
    pub const APPOINTMENT_REMINDER: &str = "appointment.reminder";
    /// A medication schedule alert.
    pub const MEDICATION_ALERT: &str = "medication.alert";
    /// A lab result became available.
    pub const LAB_RESULT_READY: &str = "lab_result.ready";
    /// A server-side entity changed and local caches should refresh.
    pub const RECORD_UPDATED: &str = "record.updated";
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
