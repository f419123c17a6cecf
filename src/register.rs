//! Built-in modules and their factory registration.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use modhost_core::{LoadContext, ModuleFactoryRegistry};
use modhost_protocols::{
    ArgumentKind, CommandArgument, CommandHandler, CommandSpec, EventListener, Module,
    ModuleContext, ModuleError, TaskId,
};

use crate::adapters::{LocalConnection, LocalPrelude};

/// Default heartbeat period: 10 seconds at 20 ticks per second.
const DEFAULT_HEARTBEAT_TICKS: i64 = 200;

/// Register factories for the modules shipped with the host.
pub(crate) fn register_builtin_factories(factories: &ModuleFactoryRegistry) -> Result<(), ModuleError> {
    factories.register_fn("heartbeat", |_: &LoadContext| {
        Ok(Box::new(Heartbeat::default()) as Box<dyn Module>)
    })?;
    factories.register_fn("echo", |_: &LoadContext| Ok(Box::new(Echo) as Box<dyn Module>))?;
    info!("Registered built-in module factories: {}", factories.entries().join(", "));
    Ok(())
}

// ----------------------------------------------------------------------------
// heartbeat
// ----------------------------------------------------------------------------

/// Publishes a heartbeat event on the connection at a fixed tick interval.
#[derive(Default)]
pub(crate) struct Heartbeat {
    beats: Arc<AtomicU64>,
    task: Option<TaskId>,
}

impl Heartbeat {
    pub(crate) fn beats(&self) -> u64 {
        self.beats.load(Ordering::SeqCst)
    }
}

struct HeartbeatStatus {
    spec: CommandSpec,
    beats: Arc<AtomicU64>,
}

impl CommandHandler for HeartbeatStatus {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    fn handle(&self, _args: &serde_json::Value) -> anyhow::Result<serde_json::Value> {
        Ok(json!({ "beats": self.beats.load(Ordering::SeqCst) }))
    }
}

#[async_trait]
impl Module for Heartbeat {
    async fn pre_enable(&mut self, ctx: &ModuleContext) -> Result<(), ModuleError> {
        if let Some(prelude) = ctx
            .prelude
            .as_ref()
            .and_then(|p| p.as_any().downcast_ref::<LocalPrelude>())
        {
            debug!("Heartbeat preparing with {:?} ticks", prelude.tick_rate());
        }
        Ok(())
    }

    async fn on_enable(&mut self, ctx: &ModuleContext) -> Result<(), ModuleError> {
        let interval: i64 = ctx
            .get_config("interval_ticks")
            .unwrap_or(DEFAULT_HEARTBEAT_TICKS);
        let connection = ctx
            .connection
            .clone()
            .ok_or_else(|| ModuleError::NotConnected(ctx.module_id().to_string()))?;

        let beats = self.beats.clone();
        let scheduler = ctx.scheduler.clone();
        let task = ctx.scheduler.run_task_timer_async(
            move || {
                let beat = beats.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(local) = connection.as_any().downcast_ref::<LocalConnection>() {
                    local.publish(&json!({
                        "type": "heartbeat",
                        "beat": beat,
                        "tick": scheduler.current_tick(),
                    }));
                }
                Ok(())
            },
            interval,
            interval,
        );
        self.task = Some(task.id());

        ctx.register_command_handler(Arc::new(HeartbeatStatus {
            spec: CommandSpec::new("heartbeat.status", "Number of heartbeats sent"),
            beats: self.beats.clone(),
        }))?;

        info!("Heartbeat every {} ticks (task #{})", interval, task.id());
        Ok(())
    }

    async fn on_disable(&mut self, ctx: &ModuleContext) -> Result<(), ModuleError> {
        if let Some(task_id) = self.task.take() {
            ctx.scheduler.cancel_task(task_id);
        }
        info!("Heartbeat stopped after {} beats", self.beats());
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ----------------------------------------------------------------------------
// echo
// ----------------------------------------------------------------------------

/// Echoes command arguments back and logs connection events.
pub(crate) struct Echo;

struct EchoCommand {
    spec: CommandSpec,
}

impl EchoCommand {
    fn new() -> Self {
        Self {
            spec: CommandSpec::new("echo", "Echo text back")
                .argument(CommandArgument::required("text", ArgumentKind::String))
                .argument(
                    CommandArgument::optional("upper", ArgumentKind::Boolean)
                        .with_description("Uppercase the reply"),
                ),
        }
    }
}

impl CommandHandler for EchoCommand {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    fn handle(&self, args: &serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let text = args["text"].as_str().unwrap_or_default();
        let reply = if args["upper"].as_bool().unwrap_or(false) {
            text.to_uppercase()
        } else {
            text.to_string()
        };
        Ok(json!({ "text": reply }))
    }
}

struct EventLogger;

impl EventListener for EventLogger {
    fn name(&self) -> &str {
        "echo.events"
    }

    fn on_event(&self, event: &serde_json::Value) {
        debug!("[echo] event: {}", event);
    }
}

#[async_trait]
impl Module for Echo {
    async fn on_enable(&mut self, ctx: &ModuleContext) -> Result<(), ModuleError> {
        ctx.register_command_handler(Arc::new(EchoCommand::new()))?;
        ctx.register_event_listeners([Arc::new(EventLogger) as Arc<dyn EventListener>])?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use modhost_core::{DiscoveredModule, ModuleLoader, ModuleManager};
    use modhost_protocols::{ModuleDescriptor, ModuleState};
    use modhost_scheduler::{SchedulerConfig, TickScheduler};

    fn manager() -> (ModuleManager, Arc<TickScheduler>) {
        let factories = ModuleFactoryRegistry::new();
        register_builtin_factories(&factories).unwrap();
        let scheduler = Arc::new(TickScheduler::new(SchedulerConfig::default()));
        let loader = ModuleLoader::new("/nonexistent", Arc::new(factories));
        (ModuleManager::new(loader, scheduler.clone()), scheduler)
    }

    #[test]
    fn test_register_builtin_factories() {
        let factories = ModuleFactoryRegistry::new();
        register_builtin_factories(&factories).unwrap();
        assert_eq!(factories.entries(), vec!["echo", "heartbeat"]);
        assert!(register_builtin_factories(&factories).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_heartbeat_and_echo() {
        let (manager, scheduler) = manager();
        manager
            .load(DiscoveredModule::new(
                ModuleDescriptor::new("heartbeat", "1.0.0").with_config(json!({"interval_ticks": 2})),
                "/mods/heartbeat",
            ))
            .await
            .unwrap();
        manager
            .load(DiscoveredModule::new(ModuleDescriptor::new("echo", "1.0.0"), "/mods/echo"))
            .await
            .unwrap();

        let connection = Arc::new(LocalConnection::new("local"));
        manager
            .pre_enable_all(Arc::new(LocalPrelude::new("test", Duration::from_millis(50))))
            .await;
        let report = manager.enable_all(connection.clone()).await;
        assert!(report.is_clean());
        assert_eq!(connection.listener_count(), 1);

        for _ in 0..5 {
            scheduler.tick();
        }
        assert!(scheduler.wait_idle(Duration::from_secs(5)).await);

        let status = manager
            .commands()
            .dispatch("heartbeat.status", &serde_json::Value::Null)
            .unwrap();
        assert_eq!(status["beats"], 2);

        let reply = manager
            .commands()
            .dispatch("echo", &json!({"text": "hi", "upper": true}))
            .unwrap();
        assert_eq!(reply["text"], "HI");

        manager.disable("heartbeat").await.unwrap();
        assert_eq!(manager.get_state("heartbeat"), Some(ModuleState::Disabled));
        assert!(!manager.commands().contains("heartbeat.status"));
    }
}
