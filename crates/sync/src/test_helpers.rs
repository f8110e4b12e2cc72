// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PulseLink Health

//! Shared test helpers for engine tests.

#![allow(clippy::unwrap_used)]

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};

use pulselink_core::MutationCommand;

use crate::config::SyncConfig;
use crate::executor::{ExecError, ExecResult, MutationExecutor};

/// How a [`ScriptedExecutor`] responds to calls.
#[derive(Debug, Clone, Copy)]
pub enum ExecBehavior {
    /// Every call succeeds.
    Succeed,
    /// The first `n` calls fail transiently, later calls succeed.
    /// Use `u32::MAX` for an executor that never succeeds.
    FailTransient(u32),
    /// Every call is rejected permanently.
    Reject,
    /// Calls never complete (for timeout tests).
    Hang,
    /// Calls succeed after sleeping.
    Delay(Duration),
}

/// Executor that counts calls and records the `tag` field of its args, so
/// tests can assert execution order.
pub struct ScriptedExecutor {
    behavior: ExecBehavior,
    pub calls: Arc<AtomicU32>,
    pub log: Arc<Mutex<Vec<String>>>,
}

impl ScriptedExecutor {
    pub fn new(behavior: ExecBehavior) -> Arc<Self> {
        Arc::new(ScriptedExecutor {
            behavior,
            calls: Arc::new(AtomicU32::new(0)),
            log: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn executed_tags(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl MutationExecutor for ScriptedExecutor {
    fn execute(&self, args: &Value) -> Pin<Box<dyn Future<Output = ExecResult<()>> + Send + '_>> {
        let tag = args
            .get("tag")
            .and_then(Value::as_str)
            .unwrap_or("?")
            .to_string();
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let log = Arc::clone(&self.log);
        let behavior = self.behavior;

        Box::pin(async move {
            match behavior {
                ExecBehavior::Succeed => {
                    log.lock().unwrap().push(tag);
                    Ok(())
                }
                ExecBehavior::FailTransient(n) => {
                    if call <= n {
                        Err(ExecError::Transient("mock network failure".to_string()))
                    } else {
                        log.lock().unwrap().push(tag);
                        Ok(())
                    }
                }
                ExecBehavior::Reject => Err(ExecError::Rejected("mock rejection".to_string())),
                ExecBehavior::Hang => {
                    let () = std::future::pending().await;
                    Ok(())
                }
                ExecBehavior::Delay(delay) => {
                    tokio::time::sleep(delay).await;
                    log.lock().unwrap().push(tag);
                    Ok(())
                }
            }
        })
    }
}

/// Builds a command whose args carry a tag for order assertions.
pub fn tagged_command(kind: &str, tag: &str) -> MutationCommand {
    MutationCommand::new(kind, json!({ "tag": tag }))
}

/// Config with millisecond-scale timings so tests run fast.
pub fn fast_config() -> SyncConfig {
    SyncConfig {
        url: "ws://localhost:9430/realtime".to_string(),
        reconnect_initial_delay_ms: 5,
        reconnect_max_delay_secs: 1,
        reconnect_max_attempts: 10,
        exec_timeout_secs: 1,
        default_max_retries: 3,
    }
}
