//! Module trait definition.

use async_trait::async_trait;
use std::any::Any;

use super::ModuleContext;
use crate::error::ModuleError;

/// Core trait for all modules.
///
/// The host calls the four hooks in order `pre_enable`, `on_enable`,
/// `pre_disable`, `on_disable`. Every hook defaults to a no-op so a module
/// only overrides the phases it cares about. Returning an error (or
/// panicking) from a hook isolates this module; siblings keep going.
#[async_trait]
pub trait Module: Send + Sync + 'static {
    /// Called before the host connection exists.
    async fn pre_enable(&mut self, _ctx: &ModuleContext) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Called once the connection handle is available.
    async fn on_enable(&mut self, _ctx: &ModuleContext) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Called before the module is disabled.
    async fn pre_disable(&mut self, _ctx: &ModuleContext) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Called when the module is disabled.
    async fn on_disable(&mut self, _ctx: &ModuleContext) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Returns a reference to the module as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}
