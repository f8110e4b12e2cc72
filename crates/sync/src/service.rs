// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PulseLink Health

//! Service wiring.
//!
//! Builds the engine as one explicit object graph with injectable storage
//! and transport - no ambient module state - and subscribes the drain and
//! reconnect triggers to connectivity-online transitions. Consumers and the
//! session coordinator hold the service (or `Arc` clones of its parts) and
//! drive it directly.

use std::sync::Arc;

use pulselink_core::KvStore;

use crate::channel::RealtimeChannel;
use crate::config::SyncConfig;
use crate::connectivity::{ConnectivityMonitor, Subscription};
use crate::executor::ExecutorRegistry;
use crate::queue::{MutationQueue, QueueResult};
use crate::registry::HandlerRegistry;
use crate::transport::Transport;

/// The assembled sync engine.
///
/// On every transition to online, the service fires a queue drain and a
/// channel resume as fire-and-forget tasks. Stale-cache refresh hooks and
/// other feature-level reactions subscribe to the connectivity monitor on
/// their own.
pub struct SyncService<T: Transport> {
    connectivity: Arc<ConnectivityMonitor>,
    executors: Arc<ExecutorRegistry>,
    handlers: Arc<HandlerRegistry>,
    queue: Arc<MutationQueue>,
    channel: Arc<RealtimeChannel<T>>,
    _drain_on_online: Subscription,
    _resume_on_online: Subscription,
}

impl<T: Transport> SyncService<T> {
    /// Builds the full engine.
    ///
    /// `initial_online` seeds the connectivity snapshot until a platform
    /// source is attached via
    /// [`ConnectivityMonitor::attach_source`].
    pub async fn new(
        config: SyncConfig,
        store: Arc<dyn KvStore>,
        transport: T,
        initial_online: bool,
    ) -> QueueResult<Self> {
        let connectivity = ConnectivityMonitor::new(initial_online);
        let executors = Arc::new(ExecutorRegistry::new());
        let handlers = Arc::new(HandlerRegistry::new());

        let queue = MutationQueue::open(
            Arc::clone(&store),
            Arc::clone(&executors),
            Arc::clone(&connectivity),
            &config,
        )
        .await?;

        let channel = Arc::new(
            RealtimeChannel::open(config, transport, store, Arc::clone(&handlers)).await,
        );

        let drain_on_online = {
            let queue = Arc::clone(&queue);
            connectivity.subscribe(move |online| {
                if online {
                    let queue = Arc::clone(&queue);
                    tokio::spawn(async move {
                        queue.drain().await;
                    });
                }
            })
        };

        let resume_on_online = {
            let channel = Arc::clone(&channel);
            connectivity.subscribe(move |online| {
                if online {
                    channel.resume();
                }
            })
        };

        Ok(SyncService {
            connectivity,
            executors,
            handlers,
            queue,
            channel,
            _drain_on_online: drain_on_online,
            _resume_on_online: resume_on_online,
        })
    }

    /// The connectivity monitor.
    pub fn connectivity(&self) -> &Arc<ConnectivityMonitor> {
        &self.connectivity
    }

    /// The executor registry, for registering command kinds at startup.
    pub fn executors(&self) -> &Arc<ExecutorRegistry> {
        &self.executors
    }

    /// The handler registry, for registering inbound event consumers.
    pub fn handlers(&self) -> &Arc<HandlerRegistry> {
        &self.handlers
    }

    /// The mutation queue.
    pub fn queue(&self) -> &Arc<MutationQueue> {
        &self.queue
    }

    /// The realtime channel.
    pub fn channel(&self) -> &Arc<RealtimeChannel<T>> {
        &self.channel
    }
}
