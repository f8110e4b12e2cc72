// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PulseLink Health

//! Durable, priority-ordered mutation queue.
//!
//! Deferred writes are persisted before `enqueue` returns and drained
//! serially while connectivity is available. The persisted blob is a single
//! JSON snapshot; enqueue and drain serialize on one lock around its
//! read-modify-write, never around the network call, so callers may enqueue
//! freely while a drain is executing.
//!
//! Ordering: higher priorities drain before lower ones, FIFO within a tier.
//! A failing head that still has retry budget stops the drain loop instead
//! of letting younger records jump ahead - strict ordering over liveness.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use pulselink_core::{KvStore, MutationCommand, MutationRecord, Priority};

use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::executor::{ExecError, ExecResult, ExecutorRegistry};

/// Store key for the persisted queue snapshot.
pub const QUEUE_KEY: &str = "sync.mutation_queue";

/// Error type for queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] pulselink_core::StoreError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A record with this id is already queued.
    #[error("duplicate mutation id: {0}")]
    DuplicateId(String),
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Outcome of a [`MutationQueue::drain`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The drain loop ran; it either emptied the queue, lost connectivity,
    /// or stopped on a retry-pending head.
    Ran(DrainReport),
    /// Another drain was already in flight; nothing was executed.
    AlreadyDraining,
}

/// Counters from one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Mutations executed successfully and removed.
    pub executed: usize,
    /// Mutations dropped after exhausting their retry budget or being
    /// rejected permanently.
    pub dropped: usize,
}

/// Persisted, priority-ordered queue of deferred mutations.
pub struct MutationQueue {
    weak: Weak<MutationQueue>,
    store: Arc<dyn KvStore>,
    executors: Arc<ExecutorRegistry>,
    connectivity: Arc<ConnectivityMonitor>,
    records: Mutex<Vec<MutationRecord>>,
    draining: AtomicBool,
    exec_timeout: std::time::Duration,
    default_max_retries: u32,
}

impl MutationQueue {
    /// Opens the queue, rehydrating any snapshot persisted by a previous
    /// process.
    ///
    /// An unreadable snapshot is logged and discarded rather than blocking
    /// startup.
    pub async fn open(
        store: Arc<dyn KvStore>,
        executors: Arc<ExecutorRegistry>,
        connectivity: Arc<ConnectivityMonitor>,
        config: &SyncConfig,
    ) -> QueueResult<Arc<Self>> {
        let records = match store.get(QUEUE_KEY).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(records) => records,
                Err(e) => {
                    warn!(error = %e, "persisted queue snapshot unreadable; starting empty");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "failed to read persisted queue; starting empty");
                Vec::new()
            }
        };

        Ok(Arc::new_cyclic(|weak| MutationQueue {
            weak: weak.clone(),
            store,
            executors,
            connectivity,
            records: Mutex::new(records),
            draining: AtomicBool::new(false),
            exec_timeout: config.exec_timeout(),
            default_max_retries: config.default_max_retries,
        }))
    }

    /// Number of records waiting to execute.
    pub async fn pending_count(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Ids of waiting records, in execution order.
    pub async fn pending_ids(&self) -> Vec<String> {
        self.records
            .lock()
            .await
            .iter()
            .map(|r| r.id.clone())
            .collect()
    }

    /// Enqueues a mutation with the configured default retry budget.
    pub async fn enqueue(
        &self,
        id: impl Into<String>,
        command: MutationCommand,
        priority: Priority,
    ) -> QueueResult<()> {
        self.enqueue_with_retries(id, command, priority, self.default_max_retries)
            .await
    }

    /// Enqueues a mutation with an explicit retry budget.
    ///
    /// The record is persisted before this returns. If the connectivity
    /// snapshot is online, a drain attempt is triggered fire-and-forget.
    pub async fn enqueue_with_retries(
        &self,
        id: impl Into<String>,
        command: MutationCommand,
        priority: Priority,
        max_retries: u32,
    ) -> QueueResult<()> {
        let record = MutationRecord::new(id, command, priority, max_retries);

        {
            let mut records = self.records.lock().await;
            if records.iter().any(|r| r.id == record.id) {
                return Err(QueueError::DuplicateId(record.id));
            }
            // Insert behind every record of the same or higher priority to
            // keep the vec in execution order.
            let at = records
                .iter()
                .position(|r| r.priority > record.priority)
                .unwrap_or(records.len());
            debug!(id = %record.id, ?priority, at, "mutation enqueued");
            records.insert(at, record);
            self.persist(&records).await;
        }

        if self.connectivity.is_online() {
            if let Some(queue) = self.weak.upgrade() {
                tokio::spawn(async move {
                    queue.drain().await;
                });
            }
        }

        Ok(())
    }

    /// Drains the queue serially while online.
    ///
    /// Single-flight: a call that finds a drain already in progress returns
    /// [`DrainOutcome::AlreadyDraining`] without touching the queue. The loop
    /// pops the head, executes it outside the blob lock with a bounded
    /// timeout, and applies the result:
    ///
    /// - success: remove and persist, continue
    /// - permanent failure or exhausted budget: drop and persist, continue
    /// - retryable failure with budget left: increment and persist, stop
    pub async fn drain(&self) -> DrainOutcome {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("drain already in flight");
            return DrainOutcome::AlreadyDraining;
        }
        let _guard = DrainGuard {
            flag: &self.draining,
        };

        let mut report = DrainReport::default();
        loop {
            if !self.connectivity.is_online() {
                break;
            }
            let head = { self.records.lock().await.first().cloned() };
            let Some(record) = head else { break };

            let result = self.execute(&record).await;

            let stop = {
                let mut records = self.records.lock().await;
                // The queue may have been cleared while the call was in
                // flight; then there is nothing to apply the result to.
                match records.iter().position(|r| r.id == record.id) {
                    None => false,
                    Some(at) => match result {
                        Ok(()) => {
                            records.remove(at);
                            report.executed += 1;
                            debug!(id = %record.id, "mutation executed");
                            self.persist(&records).await;
                            false
                        }
                        Err(err) => {
                            let exhausted = records[at].register_failure();
                            if exhausted || !err.is_retryable() {
                                let dropped = records.remove(at);
                                report.dropped += 1;
                                warn!(
                                    id = %dropped.id,
                                    retries = dropped.retry_count,
                                    error = %err,
                                    "mutation dropped"
                                );
                                self.persist(&records).await;
                                false
                            } else {
                                debug!(
                                    id = %record.id,
                                    retry = records[at].retry_count,
                                    error = %err,
                                    "mutation failed; head blocks until next drain"
                                );
                                self.persist(&records).await;
                                true
                            }
                        }
                    },
                }
            };
            if stop {
                break;
            }
        }

        DrainOutcome::Ran(report)
    }

    /// Removes every queued record and wipes the persisted snapshot.
    ///
    /// Safe to call concurrently with a drain: the drain observes the empty
    /// queue on its next iteration and exits cleanly.
    pub async fn clear(&self) -> QueueResult<()> {
        let mut records = self.records.lock().await;
        records.clear();
        self.store.delete(QUEUE_KEY).await?;
        Ok(())
    }

    /// Executes one record against its registered executor.
    async fn execute(&self, record: &MutationRecord) -> ExecResult<()> {
        let Some(executor) = self.executors.resolve(&record.command.kind) else {
            // A record nothing can execute would block the queue forever.
            return Err(ExecError::Rejected(format!(
                "no executor registered for kind '{}'",
                record.command.kind
            )));
        };

        match tokio::time::timeout(self.exec_timeout, executor.execute(&record.command.args)).await
        {
            Ok(result) => result,
            Err(_) => Err(ExecError::Timeout(self.exec_timeout)),
        }
    }

    /// Persists the snapshot, degrading to in-memory on store failure.
    async fn persist(&self, records: &[MutationRecord]) {
        match serde_json::to_string(records) {
            Ok(json) => {
                if let Err(e) = self.store.put(QUEUE_KEY, &json).await {
                    warn!(error = %e, "queue snapshot write failed; continuing in-memory");
                }
            }
            Err(e) => warn!(error = %e, "queue snapshot serialization failed"),
        }
    }
}

/// Resets the single-flight flag when a drain exits by any path.
struct DrainGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
