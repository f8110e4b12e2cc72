// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PulseLink Health

//! Mutation executors.
//!
//! The queue stores serializable commands; executors give them behavior.
//! Consumers register one executor per command kind at startup, and the
//! queue resolves the kind at drain time. This indirection is what lets a
//! queue persisted before a crash resume work after a restart.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde_json::Value;

/// Error type for mutation execution.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// Execution failed due to connectivity; consumes one retry attempt.
    #[error("transient network error: {0}")]
    Transient(String),

    /// Credential rejected mid-call; retried like any other failure while
    /// the session coordinator refreshes the token.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// The backend rejected the mutation permanently. The record is dropped
    /// without burning the remaining retry budget.
    #[error("rejected by backend: {0}")]
    Rejected(String),

    /// Execution exceeded the drain timeout.
    #[error("execution timed out after {0:?}")]
    Timeout(Duration),
}

impl ExecError {
    /// Whether a later attempt could still succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ExecError::Rejected(_))
    }
}

/// Result type for mutation execution.
pub type ExecResult<T> = Result<T, ExecError>;

/// Caller-supplied asynchronous work for one command kind.
///
/// The engine treats the work as opaque: it awaits the result, applies the
/// retry policy, and nothing more.
pub trait MutationExecutor: Send + Sync {
    /// Performs the command with the given arguments.
    fn execute(&self, args: &Value) -> Pin<Box<dyn Future<Output = ExecResult<()>> + Send + '_>>;
}

/// Table of executors keyed by command kind.
pub struct ExecutorRegistry {
    executors: RwLock<HashMap<String, Arc<dyn MutationExecutor>>>,
}

impl ExecutorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        ExecutorRegistry {
            executors: RwLock::new(HashMap::new()),
        }
    }

    /// Registers the executor for a command kind, replacing any previous one.
    pub fn register(&self, kind: impl Into<String>, executor: Arc<dyn MutationExecutor>) {
        self.executors
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(kind.into(), executor);
    }

    /// Looks up the executor for a command kind.
    pub fn resolve(&self, kind: &str) -> Option<Arc<dyn MutationExecutor>> {
        self.executors
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(kind)
            .cloned()
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
