// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PulseLink Health

//! Connectivity monitor.
//!
//! Observes platform reachability, exposes a snapshot, and notifies
//! subscribers exactly once per observed transition. Notifications are
//! fire-and-forget: listeners run on the reporting thread and must offload
//! anything slow (the service wiring spawns tasks for drain and reconnect).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

type Listener = Arc<dyn Fn(bool) + Send + Sync>;

/// Process-wide connectivity snapshot with change notification.
pub struct ConnectivityMonitor {
    weak: Weak<ConnectivityMonitor>,
    online: AtomicBool,
    source_attached: AtomicBool,
    last_transition: Mutex<Option<DateTime<Utc>>>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_id: AtomicU64,
}

impl ConnectivityMonitor {
    /// Creates a monitor seeded with the given snapshot.
    ///
    /// The seed stands in for the last known value until a platform source
    /// reports a real observation.
    pub fn new(initial_online: bool) -> Arc<Self> {
        Arc::new_cyclic(|weak| ConnectivityMonitor {
            weak: weak.clone(),
            online: AtomicBool::new(initial_online),
            source_attached: AtomicBool::new(false),
            last_transition: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        })
    }

    /// Returns the last known snapshot. Never blocks, never fails.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Returns when the snapshot last changed, if it has.
    pub fn last_transition(&self) -> Option<DateTime<Utc>> {
        *self
            .last_transition
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Records an observation from the platform reachability signal.
    ///
    /// Listeners are notified only when the value actually changed; redundant
    /// repeats are dropped here.
    pub fn report(&self, online: bool) {
        let previous = self.online.swap(online, Ordering::AcqRel);
        if previous == online {
            return;
        }

        *self
            .last_transition
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(Utc::now());
        debug!(online, "connectivity transition");

        // Snapshot under the lock, invoke outside it: a listener may
        // subscribe or unsubscribe from inside its callback.
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(online);
        }
    }

    /// Registers a transition listener.
    ///
    /// The listener is called with the new snapshot on every real change.
    /// Dropping the returned [`Subscription`] removes it.
    pub fn subscribe(&self, listener: impl Fn(bool) + Send + Sync + 'static) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(listener)));

        Subscription {
            monitor: self.weak.clone(),
            id,
        }
    }

    /// Attaches the platform reachability signal.
    ///
    /// Only the first call takes effect; later calls return `None`. The
    /// spawned task forwards every observation (including the current one)
    /// through [`report`](Self::report) until the sender side is dropped.
    pub fn attach_source(&self, mut source: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
        if self.source_attached.swap(true, Ordering::AcqRel) {
            return None;
        }
        let monitor = self.weak.upgrade()?;

        Some(tokio::spawn(async move {
            monitor.report(*source.borrow());
            while source.changed().await.is_ok() {
                let online = *source.borrow();
                monitor.report(online);
            }
        }))
    }

    fn unsubscribe_id(&self, id: u64) {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(listener_id, _)| *listener_id != id);
    }
}

/// Listener registration handle; unsubscribes when dropped.
pub struct Subscription {
    monitor: Weak<ConnectivityMonitor>,
    id: u64,
}

impl Subscription {
    /// Removes the listener now rather than at drop time.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(monitor) = self.monitor.upgrade() {
            monitor.unsubscribe_id(self.id);
        }
    }
}
