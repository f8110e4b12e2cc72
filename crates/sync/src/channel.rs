// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PulseLink Health

//! Realtime channel: connection lifecycle, outbound buffering, inbound
//! dispatch.
//!
//! A single background driver task owns the transport for the lifetime of a
//! connection episode: it connects with capped exponential backoff, flushes
//! the outbound buffer in submission order, then serves inbound frames and
//! outbound nudges until the connection drops or the channel is torn down.
//!
//! Public calls never touch the transport. `emit` appends to the persistent
//! outbound buffer and nudges the driver; `connect` waits on the shared
//! status until the in-flight attempt settles, so concurrent callers share
//! one connection attempt instead of spawning a second.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pulselink_core::{EventEnvelope, KvStore, OutboundEvent};

use crate::config::SyncConfig;
use crate::registry::HandlerRegistry;
use crate::transport::{Transport, TransportError, TransportResult};

/// Store key for the persisted outbound buffer snapshot.
pub const BUFFER_KEY: &str = "sync.outbound_buffer";

/// Channel lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    /// No connection and no driver activity.
    Disconnected,
    /// A first connection attempt is in flight.
    Connecting,
    /// Connected and serving traffic.
    Connected,
    /// Connection lost; the driver is retrying with backoff.
    Reconnecting,
}

/// Error type for channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The handshake rejected the credential. Refresh the token and call
    /// `connect` again; no reconnect-attempt slot was consumed.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// The connection attempt (and its automatic retries) failed.
    #[error("connect failed after {attempts} attempt(s): {error}")]
    ConnectFailed {
        /// Attempts consumed in this episode.
        attempts: u32,
        /// Last transport error observed.
        error: String,
    },
}

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Channel state shared between the driver task and callers.
///
/// The watch channel wakes `connect` callers on every transition; the
/// atomics allow lock-free status queries from anywhere.
struct SharedChannelState {
    status_tx: watch::Sender<ChannelStatus>,
    attempt: AtomicU32,
    gave_up: AtomicBool,
}

impl SharedChannelState {
    fn new() -> Self {
        let (status_tx, _) = watch::channel(ChannelStatus::Disconnected);
        SharedChannelState {
            status_tx,
            attempt: AtomicU32::new(0),
            gave_up: AtomicBool::new(false),
        }
    }

    fn status(&self) -> ChannelStatus {
        *self.status_tx.borrow()
    }

    fn set(&self, status: ChannelStatus) {
        let _ = self.status_tx.send_replace(status);
    }

    fn subscribe(&self) -> watch::Receiver<ChannelStatus> {
        self.status_tx.subscribe()
    }

    fn attempt(&self) -> u32 {
        self.attempt.load(Ordering::Acquire)
    }

    fn set_attempt(&self, attempt: u32) {
        self.attempt.store(attempt, Ordering::Release);
    }

    fn gave_up(&self) -> bool {
        self.gave_up.load(Ordering::Acquire)
    }

    fn set_gave_up(&self, value: bool) {
        self.gave_up.store(value, Ordering::Release);
    }
}

/// Handle on the running driver task.
struct DriverHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Persistent bidirectional connection with offline buffering.
pub struct RealtimeChannel<T: Transport> {
    config: SyncConfig,
    transport: Arc<Mutex<T>>,
    store: Arc<dyn KvStore>,
    registry: Arc<HandlerRegistry>,
    shared: Arc<SharedChannelState>,
    outbound: Arc<Mutex<Vec<OutboundEvent>>>,
    outbound_notify: Arc<Notify>,
    auth_token: Arc<StdMutex<Option<String>>>,
    last_error: Arc<StdMutex<Option<TransportError>>>,
    driver: StdMutex<Option<DriverHandle>>,
}

impl<T: Transport> RealtimeChannel<T> {
    /// Opens the channel, rehydrating any outbound buffer persisted by a
    /// previous process. Does not connect.
    pub async fn open(
        config: SyncConfig,
        transport: T,
        store: Arc<dyn KvStore>,
        registry: Arc<HandlerRegistry>,
    ) -> Self {
        let buffered: Vec<OutboundEvent> = match store.get(BUFFER_KEY).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(items) => items,
                Err(e) => {
                    warn!(error = %e, "persisted outbound buffer unreadable; starting empty");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "failed to read outbound buffer; starting empty");
                Vec::new()
            }
        };

        RealtimeChannel {
            config,
            transport: Arc::new(Mutex::new(transport)),
            store,
            registry,
            shared: Arc::new(SharedChannelState::new()),
            outbound: Arc::new(Mutex::new(buffered)),
            outbound_notify: Arc::new(Notify::new()),
            auth_token: Arc::new(StdMutex::new(None)),
            last_error: Arc::new(StdMutex::new(None)),
            driver: StdMutex::new(None),
        }
    }

    /// Current lifecycle state.
    pub fn status(&self) -> ChannelStatus {
        self.shared.status()
    }

    /// Whether the channel is currently connected.
    pub fn is_connected(&self) -> bool {
        self.status() == ChannelStatus::Connected
    }

    /// Attempts consumed in the current reconnection episode.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.attempt()
    }

    /// Number of events waiting in the outbound buffer.
    pub async fn buffered_count(&self) -> usize {
        self.outbound.lock().await.len()
    }

    /// Connects with the given bearer credential.
    ///
    /// No-op when already connected. When an attempt is already in flight
    /// the caller awaits that attempt instead of spawning a second
    /// connection. A manual connect resets the reconnect counter and clears
    /// the gave-up latch left by an exhausted episode.
    pub async fn connect(&self, token: impl Into<String>) -> ChannelResult<()> {
        *self.auth_token.lock().unwrap_or_else(|e| e.into_inner()) = Some(token.into());
        self.shared.set_gave_up(false);
        self.shared.set_attempt(0);
        self.ensure_driver();
        self.await_settled().await
    }

    /// Connectivity-online hook: restarts the driver when a credential is
    /// present and the channel has not given up.
    ///
    /// Unlike [`connect`](Self::connect), this never overrides an exhausted
    /// reconnect cap or a rejected credential; those require a manual
    /// connect.
    pub fn resume(&self) {
        if self.shared.gave_up() {
            return;
        }
        if self
            .auth_token
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
        {
            return;
        }
        self.ensure_driver();
    }

    /// Emits a named event.
    ///
    /// The event is appended to the persistent outbound buffer and handed to
    /// the transport by the driver as soon as the channel is connected;
    /// while offline it simply stays buffered. Emitting while offline is not
    /// a failure, so this never returns an error.
    pub async fn emit(&self, event: impl Into<String>, payload: Value) {
        let item = OutboundEvent::new(EventEnvelope::new(event, payload));
        {
            let mut outbound = self.outbound.lock().await;
            outbound.push(item);
            persist_outbound(&*self.store, &outbound).await;
        }
        self.outbound_notify.notify_one();
    }

    /// Tears the connection down.
    ///
    /// Cancels the driver (including any pending backoff timer), closes the
    /// transport, and clears the connection handle. The outbound buffer is
    /// kept: it flushes on the next successful connect.
    pub async fn disconnect(&self) {
        let handle = self
            .driver
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        match handle {
            Some(DriverHandle { cancel, task }) => {
                cancel.cancel();
                let _ = task.await;
            }
            None => self.shared.set(ChannelStatus::Disconnected),
        }
    }

    /// Spawns the driver task unless one is already running.
    fn ensure_driver(&self) {
        let mut slot = self.driver.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = slot.as_ref() {
            if !handle.task.is_finished() {
                return;
            }
        }

        // Set before spawning so a connect caller that checks immediately
        // never mistakes "driver starting" for a settled disconnect.
        self.shared.set(ChannelStatus::Connecting);

        let cancel = CancellationToken::new();
        let ctx = DriverContext {
            config: self.config.clone(),
            transport: Arc::clone(&self.transport),
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
            shared: Arc::clone(&self.shared),
            outbound: Arc::clone(&self.outbound),
            outbound_notify: Arc::clone(&self.outbound_notify),
            auth_token: Arc::clone(&self.auth_token),
            last_error: Arc::clone(&self.last_error),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(drive(ctx));
        *slot = Some(DriverHandle { cancel, task });
    }

    /// Waits until the driver reaches a settled state.
    async fn await_settled(&self) -> ChannelResult<()> {
        let mut status_rx = self.shared.subscribe();
        loop {
            let status = *status_rx.borrow_and_update();
            match status {
                ChannelStatus::Connected => return Ok(()),
                ChannelStatus::Disconnected => {
                    let error = self
                        .last_error
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .take();
                    return Err(match error {
                        Some(TransportError::AuthRejected(message)) => ChannelError::Auth(message),
                        Some(e) => ChannelError::ConnectFailed {
                            attempts: self.shared.attempt(),
                            error: e.to_string(),
                        },
                        None => ChannelError::ConnectFailed {
                            attempts: self.shared.attempt(),
                            error: "disconnected".to_string(),
                        },
                    });
                }
                ChannelStatus::Connecting | ChannelStatus::Reconnecting => {
                    if status_rx.changed().await.is_err() {
                        // Sender lives in self.shared; this cannot happen
                        // while the channel exists.
                        return Err(ChannelError::ConnectFailed {
                            attempts: self.shared.attempt(),
                            error: "channel dropped".to_string(),
                        });
                    }
                }
            }
        }
    }
}

/// Everything the driver task needs, cloned out of the channel.
struct DriverContext<T: Transport> {
    config: SyncConfig,
    transport: Arc<Mutex<T>>,
    store: Arc<dyn KvStore>,
    registry: Arc<HandlerRegistry>,
    shared: Arc<SharedChannelState>,
    outbound: Arc<Mutex<Vec<OutboundEvent>>>,
    outbound_notify: Arc<Notify>,
    auth_token: Arc<StdMutex<Option<String>>>,
    last_error: Arc<StdMutex<Option<TransportError>>>,
    cancel: CancellationToken,
}

/// Why the connected loop returned.
enum Exit {
    Cancelled,
    ConnectionLost,
}

/// Driver task: connect with backoff, then serve until the connection drops
/// or the channel is torn down.
async fn drive<T: Transport>(ctx: DriverContext<T>) {
    // Held for the whole episode: the driver is the only transport user.
    let mut transport = ctx.transport.lock().await;
    let mut delay = ctx.config.initial_delay();

    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }
        let token = match ctx
            .auth_token
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
        {
            Some(token) => token,
            None => break,
        };

        let connect_result = tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            result = transport.connect(&ctx.config.url, &token) => result,
        };

        match connect_result {
            Ok(()) => {
                ctx.shared.set_attempt(0);
                delay = ctx.config.initial_delay();
                info!(url = %ctx.config.url, "realtime channel connected");
                ctx.shared.set(ChannelStatus::Connected);

                match run_connected(&ctx, &mut *transport).await {
                    Exit::Cancelled => break,
                    Exit::ConnectionLost => {
                        ctx.shared.set(ChannelStatus::Reconnecting);
                        // Retry immediately once; backoff applies from the
                        // first failed attempt onward.
                        continue;
                    }
                }
            }
            Err(TransportError::AuthRejected(message)) => {
                // An invalid credential cannot be retried into validity.
                // Surface it to the session coordinator without consuming a
                // reconnect-attempt slot.
                warn!(error = %message, "handshake rejected; waiting for a fresh token");
                *ctx.last_error.lock().unwrap_or_else(|e| e.into_inner()) =
                    Some(TransportError::AuthRejected(message));
                ctx.shared.set_gave_up(true);
                ctx.shared.set(ChannelStatus::Disconnected);
                return;
            }
            Err(e) => {
                let attempt = ctx.shared.attempt().saturating_add(1);
                ctx.shared.set_attempt(attempt);
                *ctx.last_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(e);

                if attempt >= ctx.config.reconnect_max_attempts {
                    warn!(attempts = attempt, "reconnect attempts exhausted");
                    ctx.shared.set_gave_up(true);
                    ctx.shared.set(ChannelStatus::Disconnected);
                    return;
                }

                ctx.shared.set(ChannelStatus::Reconnecting);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "reconnect backoff");
                tokio::select! {
                    _ = ctx.cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
                delay = next_delay(delay, ctx.config.max_delay());
            }
        }
    }

    // Cancelled teardown path.
    let _ = transport.disconnect().await;
    ctx.shared.set(ChannelStatus::Disconnected);
}

/// Serves one connected episode.
async fn run_connected<T: Transport>(ctx: &DriverContext<T>, transport: &mut T) -> Exit {
    enum Wake {
        Cancel,
        Outbound,
        Inbound(TransportResult<Option<EventEnvelope>>),
    }

    loop {
        if !flush_outbound(ctx, transport).await {
            return Exit::ConnectionLost;
        }

        let wake = tokio::select! {
            _ = ctx.cancel.cancelled() => Wake::Cancel,
            _ = ctx.outbound_notify.notified() => Wake::Outbound,
            inbound = transport.recv() => Wake::Inbound(inbound),
        };

        match wake {
            Wake::Cancel => return Exit::Cancelled,
            // Loop back to flush what was just buffered.
            Wake::Outbound => continue,
            Wake::Inbound(Ok(Some(envelope))) => {
                ctx.registry.dispatch(&envelope.event, &envelope.payload);
            }
            Wake::Inbound(Ok(None)) => {
                info!("server closed the connection");
                return Exit::ConnectionLost;
            }
            Wake::Inbound(Err(e)) => {
                warn!(error = %e, "receive failed");
                return Exit::ConnectionLost;
            }
        }
    }
}

/// Sends every buffered event in submission order.
///
/// The buffer is cleared only after the whole batch was handed to the
/// transport. On a mid-flush failure it is left intact and the episode ends;
/// the events are resent on the next connect (at-least-once delivery).
async fn flush_outbound<T: Transport>(ctx: &DriverContext<T>, transport: &mut T) -> bool {
    let batch: Vec<OutboundEvent> = { ctx.outbound.lock().await.clone() };
    if batch.is_empty() {
        return true;
    }

    for item in &batch {
        if let Err(e) = transport.send(item.envelope.clone()).await {
            warn!(error = %e, buffered = batch.len(), "outbound flush interrupted");
            return false;
        }
    }

    {
        let mut outbound = ctx.outbound.lock().await;
        // Events emitted during the flush sit behind the batch and survive.
        let remaining = outbound.split_off(batch.len());
        *outbound = remaining;
        persist_outbound(&*ctx.store, &outbound).await;
    }
    debug!(count = batch.len(), "outbound buffer flushed");
    true
}

/// Persists the outbound buffer snapshot, degrading to in-memory on failure.
async fn persist_outbound(store: &dyn KvStore, outbound: &[OutboundEvent]) {
    match serde_json::to_string(outbound) {
        Ok(json) => {
            if let Err(e) = store.put(BUFFER_KEY, &json).await {
                warn!(error = %e, "outbound buffer write failed; continuing in-memory");
            }
        }
        Err(e) => warn!(error = %e, "outbound buffer serialization failed"),
    }
}

/// Next backoff delay: doubled, capped at the ceiling.
pub(crate) fn next_delay(current: Duration, ceiling: Duration) -> Duration {
    current.saturating_mul(2).min(ceiling)
}
