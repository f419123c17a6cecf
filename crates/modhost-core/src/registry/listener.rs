//! Per-module listener bridge.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use modhost_protocols::{ConnectionHandle, EventListener, ListenerRegistryAccess, ModuleError};

/// Tracks the listeners one module registered and attaches them to the
/// connection.
pub struct ListenerBridge {
    owner: String,
    listeners: Mutex<Vec<Arc<dyn EventListener>>>,
    connection: RwLock<Option<Arc<dyn ConnectionHandle>>>,
}

impl ListenerBridge {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            listeners: Mutex::new(Vec::new()),
            connection: RwLock::new(None),
        }
    }

    /// Attach to a connection. Listeners registered later go straight to it.
    pub fn connect(&self, connection: Arc<dyn ConnectionHandle>) {
        *self.connection.write() = Some(connection);
    }

    pub fn is_connected(&self) -> bool {
        self.connection.read().is_some()
    }

    /// Detach every registered listener from the connection and forget them.
    ///
    /// Returns the number of listeners removed.
    pub fn detach_all(&self) -> usize {
        let listeners = std::mem::take(&mut *self.listeners.lock());
        if let Some(connection) = self.connection.read().as_ref() {
            for listener in &listeners {
                connection.remove_event_listener(listener);
            }
        }
        if !listeners.is_empty() {
            debug!(module = %self.owner, "Detached {} listener(s)", listeners.len());
        }
        listeners.len()
    }

    /// Detach all listeners and drop the connection.
    pub fn disconnect(&self) -> usize {
        let removed = self.detach_all();
        *self.connection.write() = None;
        removed
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }
}

impl ListenerRegistryAccess for ListenerBridge {
    fn register_listener(&self, listener: Arc<dyn EventListener>) -> Result<bool, ModuleError> {
        let connection = self.connection.read().clone().ok_or_else(|| {
            ModuleError::NotConnected(format!(
                "{} must register listeners from on_enable or later",
                self.owner
            ))
        })?;

        let mut listeners = self.listeners.lock();
        if listeners.iter().any(|l| l.name() == listener.name()) {
            warn!(module = %self.owner, "Listener {} already registered, skipping", listener.name());
            return Ok(false);
        }

        connection.add_event_listener(listener.clone());
        debug!(module = %self.owner, "Registered listener {}", listener.name());
        listeners.push(listener);
        Ok(true)
    }

    fn listeners(&self) -> Vec<Arc<dyn EventListener>> {
        self.listeners.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;

    #[derive(Default)]
    struct RecordingConnection {
        attached: Mutex<Vec<String>>,
    }

    impl ConnectionHandle for RecordingConnection {
        fn name(&self) -> &str {
            "recording"
        }

        fn add_event_listener(&self, listener: Arc<dyn EventListener>) {
            self.attached.lock().push(listener.name().to_string());
        }

        fn remove_event_listener(&self, listener: &Arc<dyn EventListener>) -> bool {
            let mut attached = self.attached.lock();
            let before = attached.len();
            attached.retain(|name| name != listener.name());
            attached.len() != before
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct Named(&'static str);

    impl EventListener for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn on_event(&self, _event: &serde_json::Value) {}
    }

    #[test]
    fn test_register_requires_connection() {
        let bridge = ListenerBridge::new("m");
        let result = bridge.register_listener(Arc::new(Named("chat")));
        assert!(matches!(result, Err(ModuleError::NotConnected(_))));
        assert!(bridge.is_empty());
    }

    #[test]
    fn test_register_attaches_and_skips_duplicates() {
        let connection = Arc::new(RecordingConnection::default());
        let bridge = ListenerBridge::new("m");
        bridge.connect(connection.clone());

        assert!(bridge.register_listener(Arc::new(Named("chat"))).unwrap());
        assert!(!bridge.register_listener(Arc::new(Named("chat"))).unwrap());
        assert!(bridge.register_listener(Arc::new(Named("join"))).unwrap());

        assert_eq!(bridge.len(), 2);
        assert_eq!(*connection.attached.lock(), vec!["chat", "join"]);
    }

    #[test]
    fn test_detach_all() {
        let connection = Arc::new(RecordingConnection::default());
        let bridge = ListenerBridge::new("m");
        bridge.connect(connection.clone());
        bridge.register_listener(Arc::new(Named("chat"))).unwrap();

        assert_eq!(bridge.disconnect(), 1);
        assert!(connection.attached.lock().is_empty());
        assert!(!bridge.is_connected());
        assert!(bridge.listeners().is_empty());
    }
}
