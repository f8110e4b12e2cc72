// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PulseLink Health

//! Inbound event fan-out.
//!
//! Decouples the realtime channel from its consumers: the channel looks up
//! handlers by event name and knows nothing about what a handler does.
//! Every event name maps to an ordered list of independent subscribers, so
//! one feature registering for an event never clobbers another's handler.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::{debug, warn};

/// Error a handler may surface.
///
/// Isolated and logged by the dispatcher; never propagated to the channel or
/// to sibling handlers.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    /// Creates a handler error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        HandlerError(message.into())
    }
}

/// Result type for event handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// A registered callback for one event name.
pub type EventHandler = Arc<dyn Fn(&Value) -> HandlerResult + Send + Sync>;

/// Mapping from event name to its ordered subscriber list.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Vec<EventHandler>>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        HandlerRegistry {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Appends a handler to the event's fan-out list.
    pub fn register(
        &self,
        event: impl Into<String>,
        handler: impl Fn(&Value) -> HandlerResult + Send + Sync + 'static,
    ) {
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(event.into())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Merges a whole mapping into the registry.
    ///
    /// Existing registrations are kept; the new handlers are appended after
    /// them in their event's list.
    pub fn register_handlers(&self, mapping: impl IntoIterator<Item = (String, EventHandler)>) {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        for (event, handler) in mapping {
            handlers.entry(event).or_default().push(handler);
        }
    }

    /// Number of handlers registered for an event name.
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(event)
            .map(|list| list.len())
            .unwrap_or(0)
    }

    /// Dispatches one inbound event to every registered handler, in
    /// registration order.
    ///
    /// Unknown event names are silently ignored. A failing handler is logged
    /// and does not affect its siblings. Returns the number of handlers
    /// invoked.
    pub fn dispatch(&self, event: &str, payload: &Value) -> usize {
        let handlers: Vec<EventHandler> = {
            self.handlers
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .get(event)
                .cloned()
                .unwrap_or_default()
        };

        if handlers.is_empty() {
            debug!(event, "no handlers registered; ignoring");
            return 0;
        }

        for handler in &handlers {
            if let Err(e) = handler(payload) {
                warn!(event, error = %e, "event handler failed");
            }
        }
        handlers.len()
    }
}
