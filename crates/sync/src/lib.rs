// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PulseLink Health

//! pulselink-sync: offline-first synchronization and realtime delivery.
//!
//! The engine behind the PulseLink client: a durable, priority-ordered
//! mutation queue that survives restarts and outages, and a persistent
//! bidirectional channel that reconnects with bounded backoff and buffers
//! outbound traffic while disconnected.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐ online  ┌───────────────┐ execute ┌──────────────┐
//! │ Connectivity │────────►│ MutationQueue │────────►│  Executor    │
//! │   Monitor    │         │  (persisted)  │         │  Registry    │
//! └──────┬───────┘         └───────────────┘         └──────────────┘
//!        │ resume
//!        ▼
//! ┌──────────────┐         ┌───────────────┐ dispatch ┌──────────────┐
//! │  Realtime    │◄───────►│   Transport   │─────────►│   Handler    │
//! │  Channel     │         │    (trait)    │          │   Registry   │
//! └──────────────┘         └───────────────┘          └──────────────┘
//! ```
//!
//! # Features
//!
//! - Priority-then-FIFO mutation queue persisted before every state change
//! - Serializable tagged commands resolved against an executor table at drain
//!   time, so queued work resumes after a restart
//! - Single-flight drain with bounded per-mutation timeouts and retry budgets
//! - Realtime channel with single-flight connect, capped exponential
//!   reconnect backoff, and an order-preserving persistent outbound buffer
//! - Multi-subscriber handler fan-out with per-handler error isolation
//! - Injectable storage and transport for deterministic testing

pub mod channel;
pub mod config;
pub mod connectivity;
pub mod executor;
pub mod queue;
pub mod registry;
pub mod service;
pub mod transport;

pub use channel::{ChannelError, ChannelStatus, RealtimeChannel, BUFFER_KEY};
pub use config::{ConfigError, SyncConfig};
pub use connectivity::{ConnectivityMonitor, Subscription};
pub use executor::{ExecError, ExecResult, ExecutorRegistry, MutationExecutor};
pub use queue::{DrainOutcome, DrainReport, MutationQueue, QueueError, QueueResult, QUEUE_KEY};
pub use registry::{EventHandler, HandlerError, HandlerRegistry, HandlerResult};
pub use service::SyncService;
pub use transport::{Transport, TransportError, TransportResult, WebSocketTransport};

#[cfg(test)]
mod test_helpers;





#[cfg(test)]
mod integration_tests;
