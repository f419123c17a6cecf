//! Module context passed to lifecycle hooks.

use std::path::PathBuf;
use std::sync::Arc;

use super::{ConnectionHandle, ModuleDescriptor, PreludeHandle};
use crate::bridge::{CommandHandler, CommandRegistryAccess, EventListener, ListenerRegistryAccess};
use crate::error::ModuleError;
use crate::scheduler::ModuleScheduler;

/// Context handed to every lifecycle hook.
///
/// The host fills in `prelude` before `pre_enable` and `connection` before
/// `on_enable`; both stay `None` until then.
#[derive(Clone)]
pub struct ModuleContext {
    /// Descriptor of the module this context belongs to.
    pub descriptor: Arc<ModuleDescriptor>,

    /// Scheduler handle; tasks are tagged with this module's id.
    pub scheduler: ModuleScheduler,

    /// Handle available before the connection is finalized.
    pub prelude: Option<Arc<dyn PreludeHandle>>,

    /// Finalized connection handle.
    pub connection: Option<Arc<dyn ConnectionHandle>>,

    /// Bridge for registering command handlers.
    pub commands: Arc<dyn CommandRegistryAccess>,

    /// Bridge for registering event listeners.
    pub listeners: Arc<dyn ListenerRegistryAccess>,

    /// Directory the module was loaded from.
    pub data_dir: PathBuf,
}

impl ModuleContext {
    /// Create a new module context with no host handles attached.
    pub fn new(
        descriptor: Arc<ModuleDescriptor>,
        scheduler: ModuleScheduler,
        commands: Arc<dyn CommandRegistryAccess>,
        listeners: Arc<dyn ListenerRegistryAccess>,
        data_dir: PathBuf,
    ) -> Self {
        Self {
            descriptor,
            scheduler,
            prelude: None,
            connection: None,
            commands,
            listeners,
            data_dir,
        }
    }

    /// Id of the owning module.
    pub fn module_id(&self) -> &str {
        &self.descriptor.id
    }

    /// Whether the connection handle has been injected.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Get a configuration value from the module descriptor.
    pub fn get_config<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.descriptor
            .config
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Register a command handler with the host.
    pub fn register_command_handler(
        &self,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<(), ModuleError> {
        self.commands.register_command_handler(handler)
    }

    /// Register event listeners with the host.
    ///
    /// Listeners already registered by this module are skipped. Returns the
    /// number of newly registered listeners.
    pub fn register_event_listeners<I>(&self, listeners: I) -> Result<usize, ModuleError>
    where
        I: IntoIterator<Item = Arc<dyn EventListener>>,
    {
        let mut added = 0;
        for listener in listeners {
            if self.listeners.register_listener(listener)? {
                added += 1;
            }
        }
        Ok(added)
    }
}
