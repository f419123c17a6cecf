//! Module records owned by the lifecycle manager.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use modhost_protocols::{ModuleContext, ModuleDescriptor, ModuleState, TaskScheduler};

use crate::loader::{DiscoveredModule, LoadContext};
use crate::registry::{CommandRegistry, ListenerBridge};

/// One module's runtime instance together with its bookkeeping.
pub(crate) struct ModuleRecord {
    pub(crate) source: DiscoveredModule,
    pub(crate) state: ModuleState,
    pub(crate) load: LoadContext,
    pub(crate) context: ModuleContext,
    pub(crate) listeners: Arc<ListenerBridge>,
}

impl ModuleRecord {
    pub(crate) fn id(&self) -> &str {
        &self.source.descriptor.id
    }

    pub(crate) fn descriptor(&self) -> &Arc<ModuleDescriptor> {
        &self.source.descriptor
    }

    /// Cancel tasks, detach listeners and drop commands owned by this module.
    pub(crate) fn release(&self, scheduler: &dyn TaskScheduler, commands: &CommandRegistry) {
        scheduler.cancel_tasks_for(self.id());
        self.listeners.detach_all();
        commands.unregister_module(self.id());
    }

    pub(crate) fn snapshot(&self) -> ModuleSnapshot {
        ModuleSnapshot {
            descriptor: ModuleDescriptor::clone(&self.source.descriptor),
            state: self.state,
            instance_id: self.load.id(),
            loaded_at: self.load.loaded_at(),
            loaded: self.load.is_loaded(),
        }
    }
}

/// Read-only view of a module record.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleSnapshot {
    pub descriptor: ModuleDescriptor,
    pub state: ModuleState,
    /// Id of the loading context; changes on every reload.
    pub instance_id: Uuid,
    pub loaded_at: DateTime<Utc>,
    /// Whether a runtime instance is currently held.
    pub loaded: bool,
}

impl ModuleSnapshot {
    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn version(&self) -> &str {
        &self.descriptor.version
    }
}
