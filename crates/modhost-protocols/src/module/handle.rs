//! Opaque host handles injected into modules.

use std::any::Any;
use std::sync::Arc;

use crate::bridge::EventListener;

/// Partially initialized host state available before the connection exists.
pub trait PreludeHandle: Send + Sync {
    /// Human-readable name of the prelude.
    fn name(&self) -> &str;

    /// Returns the handle as `Any` so modules can downcast to the host type.
    fn as_any(&self) -> &dyn Any;
}

/// Finalized connection handle, available from `on_enable` onward.
pub trait ConnectionHandle: Send + Sync {
    /// Human-readable name of the connection.
    fn name(&self) -> &str;

    /// Attach an event listener.
    fn add_event_listener(&self, listener: Arc<dyn EventListener>);

    /// Detach a previously attached listener. Returns false if it was not attached.
    fn remove_event_listener(&self, listener: &Arc<dyn EventListener>) -> bool;

    /// Returns the handle as `Any` so modules can downcast to the host type.
    fn as_any(&self) -> &dyn Any;
}
