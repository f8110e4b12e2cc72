// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PulseLink Health

//! Deferred mutation commands and queue records.
//!
//! Mutations are represented as serializable tagged commands rather than
//! captured closures, so a queue persisted before a crash can resume after a
//! restart. The `kind` field is resolved against a registered executor table
//! at drain time; `args` are opaque to this crate and handed to the executor
//! verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Execution priority for a queued mutation.
///
/// Variants are declared highest-first so the derived ordering sorts
/// higher-priority records ahead of lower ones.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Normal,
    Low,
}

/// A deferred write operation.
///
/// The queue never interprets a command; it only persists it and resolves
/// `kind` against the executor registry when draining.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MutationCommand {
    /// Name of the registered executor that performs this command.
    pub kind: String,
    /// Arguments handed to the executor verbatim.
    pub args: Value,
}

impl MutationCommand {
    /// Creates a new command.
    pub fn new(kind: impl Into<String>, args: Value) -> Self {
        MutationCommand {
            kind: kind.into(),
            args,
        }
    }
}

/// A queued mutation with its retry bookkeeping.
///
/// Records are owned exclusively by the mutation queue: created on enqueue,
/// retry-count incremented on failed execution, removed on success or retry
/// exhaustion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MutationRecord {
    /// Caller-chosen identifier, unique within the queue.
    pub id: String,
    /// The deferred operation.
    pub command: MutationCommand,
    /// Drain priority.
    pub priority: Priority,
    /// When the record entered the queue.
    pub enqueued_at: DateTime<Utc>,
    /// Failed executions so far.
    pub retry_count: u32,
    /// Retry budget: the record executes at most `max_retries + 1` times.
    pub max_retries: u32,
}

impl MutationRecord {
    /// Creates a fresh record with an empty retry history.
    pub fn new(
        id: impl Into<String>,
        command: MutationCommand,
        priority: Priority,
        max_retries: u32,
    ) -> Self {
        MutationRecord {
            id: id.into(),
            command,
            priority,
            enqueued_at: Utc::now(),
            retry_count: 0,
            max_retries,
        }
    }

    /// Records a failed execution.
    ///
    /// Returns `true` when the retry budget is exhausted and the record must
    /// be dropped. After the increment, `retry_count > max_retries` means the
    /// record has executed `max_retries + 1` times.
    pub fn register_failure(&mut self) -> bool {
        self.retry_count = self.retry_count.saturating_add(1);
        self.retry_count > self.max_retries
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
