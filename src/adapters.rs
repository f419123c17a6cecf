//! In-process host handles.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::debug;

use modhost_protocols::{ConnectionHandle, EventListener, PreludeHandle};

/// Host state handed to modules before the connection exists.
pub(crate) struct LocalPrelude {
    name: String,
    tick_rate: Duration,
}

impl LocalPrelude {
    pub(crate) fn new(name: impl Into<String>, tick_rate: Duration) -> Self {
        Self {
            name: name.into(),
            tick_rate,
        }
    }

    pub(crate) fn tick_rate(&self) -> Duration {
        self.tick_rate
    }
}

impl PreludeHandle for LocalPrelude {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// In-process event hub standing in for a network connection.
pub(crate) struct LocalConnection {
    name: String,
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
}

impl LocalConnection {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Deliver an event to every attached listener. Returns the number reached.
    pub(crate) fn publish(&self, event: &serde_json::Value) -> usize {
        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            listener.on_event(event);
        }
        listeners.len()
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl ConnectionHandle for LocalConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn add_event_listener(&self, listener: Arc<dyn EventListener>) {
        debug!("Attaching listener {} to {}", listener.name(), self.name);
        self.listeners.write().push(listener);
    }

    fn remove_event_listener(&self, listener: &Arc<dyn EventListener>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
