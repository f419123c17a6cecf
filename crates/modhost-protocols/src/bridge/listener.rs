//! Event listener registration types.

use std::sync::Arc;

use crate::error::ModuleError;

/// Receives events delivered through the host connection.
pub trait EventListener: Send + Sync {
    /// Name of the listener, unique within one module.
    fn name(&self) -> &str;

    /// Handle an event.
    fn on_event(&self, event: &serde_json::Value);
}

/// Bridge through which a module registers event listeners.
pub trait ListenerRegistryAccess: Send + Sync {
    /// Register a listener.
    ///
    /// Returns `Ok(false)` when a listener with the same name is already
    /// registered for this module.
    fn register_listener(&self, listener: Arc<dyn EventListener>) -> Result<bool, ModuleError>;

    /// Listeners currently registered through this bridge.
    fn listeners(&self) -> Vec<Arc<dyn EventListener>>;
}
