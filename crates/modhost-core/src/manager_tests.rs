use super::*;
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use serde_json::json;

use modhost_protocols::{CommandHandler, CommandSpec, EventListener, ModuleError};
use modhost_scheduler::{SchedulerConfig, TickScheduler};

use crate::registry::ModuleFactoryRegistry;

type Log = Arc<SyncMutex<Vec<String>>>;

struct Probe {
    serial: usize,
    log: Log,
    fail: Option<String>,
    panic: Option<String>,
}

impl Probe {
    fn record(&self, hook: &str, ctx: &ModuleContext) -> Result<(), ModuleError> {
        self.log.lock().push(format!("{}:{}", hook, ctx.module_id()));
        if self.panic.as_deref() == Some(hook) {
            panic!("{} exploded in {}", ctx.module_id(), hook);
        }
        if self.fail.as_deref() == Some(hook) {
            return Err(ModuleError::Custom(format!("{} refused {}", ctx.module_id(), hook)));
        }
        Ok(())
    }
}

struct Ping {
    spec: CommandSpec,
}

impl CommandHandler for Ping {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    fn handle(&self, _args: &serde_json::Value) -> anyhow::Result<serde_json::Value> {
        Ok(json!("pong"))
    }
}

struct Quiet(String);

impl EventListener for Quiet {
    fn name(&self) -> &str {
        &self.0
    }

    fn on_event(&self, _event: &serde_json::Value) {}
}

#[async_trait]
impl Module for Probe {
    async fn pre_enable(&mut self, ctx: &ModuleContext) -> Result<(), ModuleError> {
        self.record("pre_enable", ctx)
    }

    async fn on_enable(&mut self, ctx: &ModuleContext) -> Result<(), ModuleError> {
        ctx.scheduler.run_task_timer(|| Ok(()), 0, 1);
        ctx.register_command_handler(Arc::new(Ping {
            spec: CommandSpec::new(format!("{}-ping", ctx.module_id()), "ping"),
        }))?;
        ctx.register_event_listeners([
            Arc::new(Quiet(format!("{}-listener", ctx.module_id()))) as Arc<dyn EventListener>
        ])?;
        self.record("on_enable", ctx)
    }

    async fn pre_disable(&mut self, ctx: &ModuleContext) -> Result<(), ModuleError> {
        self.record("pre_disable", ctx)
    }

    async fn on_disable(&mut self, ctx: &ModuleContext) -> Result<(), ModuleError> {
        self.record("on_disable", ctx)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Default)]
struct TestConnection {
    listeners: SyncMutex<Vec<String>>,
}

impl ConnectionHandle for TestConnection {
    fn name(&self) -> &str {
        "test"
    }

    fn add_event_listener(&self, listener: Arc<dyn EventListener>) {
        self.listeners.lock().push(listener.name().to_string());
    }

    fn remove_event_listener(&self, listener: &Arc<dyn EventListener>) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|name| name != listener.name());
        before != listeners.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct TestPrelude;

impl PreludeHandle for TestPrelude {
    fn name(&self) -> &str {
        "prelude"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct Harness {
    manager: ModuleManager,
    scheduler: Arc<TickScheduler>,
    connection: Arc<TestConnection>,
    log: Log,
}

impl Harness {
    fn new() -> Self {
        let log: Log = Arc::new(SyncMutex::new(Vec::new()));
        let serials = Arc::new(AtomicUsize::new(0));
        let factories = ModuleFactoryRegistry::new();
        let factory_log = log.clone();
        factories
            .register_fn("probe", move |ctx: &LoadContext| {
                let config = &ctx.descriptor().config;
                let setting = |key: &str| config.get(key).and_then(|v| v.as_str()).map(String::from);
                Ok(Box::new(Probe {
                    serial: serials.fetch_add(1, Ordering::SeqCst),
                    log: factory_log.clone(),
                    fail: setting("fail"),
                    panic: setting("panic"),
                }) as Box<dyn Module>)
            })
            .unwrap();

        let scheduler = Arc::new(TickScheduler::new(SchedulerConfig::default()));
        let loader = ModuleLoader::new("/nonexistent", Arc::new(factories));
        Self {
            manager: ModuleManager::new(loader, scheduler.clone()),
            scheduler,
            connection: Arc::new(TestConnection::default()),
            log,
        }
    }

    async fn add(&self, id: &str, deps: &[&str]) {
        self.add_with(id, deps, serde_json::Value::Null).await;
    }

    async fn add_with(&self, id: &str, deps: &[&str], config: serde_json::Value) {
        let mut descriptor = ModuleDescriptor::new(id, "1.0.0")
            .with_entry("probe")
            .with_config(config);
        for dep in deps {
            descriptor = descriptor.with_dependency(*dep);
        }
        self.manager
            .load(DiscoveredModule::new(descriptor, format!("/mods/{}", id)))
            .await
            .unwrap();
    }

    async fn start(&self) -> (BatchReport, BatchReport) {
        let pre = self.manager.pre_enable_all(Arc::new(TestPrelude)).await;
        let enable = self.manager.enable_all(self.connection.clone()).await;
        (pre, enable)
    }

    /// Module ids that went through `hook`, in call order.
    fn calls(&self, hook: &str) -> Vec<String> {
        let prefix = format!("{}:", hook);
        self.log
            .lock()
            .iter()
            .filter_map(|entry| entry.strip_prefix(&prefix).map(String::from))
            .collect()
    }

    fn tasks_of(&self, id: &str) -> usize {
        self.scheduler.tasks().iter().filter(|t| t.owner() == id).count()
    }

    fn state(&self, id: &str) -> Option<ModuleState> {
        self.manager.get_state(id)
    }
}

#[tokio::test]
async fn test_enable_in_dependency_order() {
    let h = Harness::new();
    h.add("c", &["b"]).await;
    h.add("a", &[]).await;
    h.add("b", &["a"]).await;

    let (pre, enable) = h.start().await;
    assert_eq!(pre.succeeded, vec!["a", "b", "c"]);
    assert_eq!(enable.succeeded, vec!["a", "b", "c"]);
    assert_eq!(h.calls("pre_enable"), vec!["a", "b", "c"]);
    assert_eq!(h.calls("on_enable"), vec!["a", "b", "c"]);
    for id in ["a", "b", "c"] {
        assert_eq!(h.state(id), Some(ModuleState::Enabled));
    }
}

#[tokio::test]
async fn test_states_after_pre_enable() {
    let h = Harness::new();
    h.add("a", &[]).await;
    assert_eq!(h.state("a"), Some(ModuleState::Discovered));

    h.manager.pre_enable_all(Arc::new(TestPrelude)).await;
    assert_eq!(h.state("a"), Some(ModuleState::PendingEnable));
    assert!(h.calls("on_enable").is_empty());
}

#[tokio::test]
async fn test_failing_on_enable_is_isolated() {
    let h = Harness::new();
    h.add_with("m", &[], json!({"fail": "on_enable"})).await;
    h.add("n", &[]).await;

    let (_, enable) = h.start().await;
    assert_eq!(h.state("m"), Some(ModuleState::Invalid));
    assert_eq!(h.state("n"), Some(ModuleState::Enabled));
    assert_eq!(enable.failed_ids(), vec!["m"]);
    assert_eq!(enable.succeeded, vec!["n"]);

    let snapshot = h.manager.get_module("m").unwrap();
    assert!(!snapshot.loaded);
    assert_eq!(h.tasks_of("m"), 0);
    assert!(!h.manager.commands().contains("m-ping"));
    assert_eq!(*h.connection.listeners.lock(), vec!["n-listener"]);
}

#[tokio::test]
async fn test_panicking_pre_enable_invalidates_dependents() {
    let h = Harness::new();
    h.add_with("base", &[], json!({"panic": "pre_enable"})).await;
    h.add("child", &["base"]).await;
    h.add("other", &[]).await;

    let (pre, _) = h.start().await;
    assert_eq!(h.state("base"), Some(ModuleState::Invalid));
    assert_eq!(h.state("child"), Some(ModuleState::Invalid));
    assert_eq!(h.state("other"), Some(ModuleState::Enabled));
    assert_eq!(pre.failed_ids(), vec!["base", "child"]);
    assert!(pre.failed[0].1.contains("panicked"));
    assert!(!h.calls("pre_enable").contains(&"child".to_string()));
}

#[tokio::test]
async fn test_missing_dependency() {
    let h = Harness::new();
    h.add("lonely", &["ghost"]).await;

    let (pre, _) = h.start().await;
    assert_eq!(h.state("lonely"), Some(ModuleState::Invalid));
    assert!(pre.failed[0].1.contains("ghost"));
}

#[tokio::test]
async fn test_cycle_invalidates_only_affected_modules() {
    let h = Harness::new();
    h.add("x", &["y"]).await;
    h.add("y", &["x"]).await;
    h.add("z", &["x"]).await;
    h.add("free", &[]).await;

    let (pre, enable) = h.start().await;
    for id in ["x", "y", "z"] {
        assert_eq!(h.state(id), Some(ModuleState::Invalid));
    }
    assert_eq!(h.state("free"), Some(ModuleState::Enabled));
    assert_eq!(pre.failed.len(), 3);
    assert!(pre.failed[0].1.contains("Circular dependency"));
    assert_eq!(enable.succeeded, vec!["free"]);
}

#[tokio::test]
async fn test_enable_preconditions() {
    let h = Harness::new();
    h.add("a", &[]).await;
    h.add_with("bad", &[], json!({"fail": "pre_enable"})).await;

    assert!(matches!(
        h.manager.enable("a").await,
        Err(LifecycleError::NotConnected(_))
    ));
    assert_eq!(h.state("a"), Some(ModuleState::Discovered));

    h.start().await;
    assert!(matches!(
        h.manager.enable("a").await,
        Err(LifecycleError::InvalidTransition { state: ModuleState::Enabled, .. })
    ));
    assert!(matches!(
        h.manager.enable("bad").await,
        Err(LifecycleError::InvalidTransition { state: ModuleState::Invalid, .. })
    ));
    assert!(matches!(
        h.manager.enable("nope").await,
        Err(LifecycleError::UnknownModule(_))
    ));
    assert_eq!(h.calls("on_enable"), vec!["a"]);
}

#[tokio::test]
async fn test_enable_single_discovered_module() {
    let h = Harness::new();
    h.start().await;
    h.add("late", &[]).await;

    h.manager.enable("late").await.unwrap();
    assert_eq!(h.state("late"), Some(ModuleState::Enabled));
    assert_eq!(h.calls("pre_enable"), vec!["late"]);
    assert_eq!(h.calls("on_enable"), vec!["late"]);
}

#[tokio::test]
async fn test_disable_cancels_tasks_and_releases_bridges() {
    let h = Harness::new();
    h.add("a", &[]).await;
    h.add("b", &[]).await;
    h.start().await;

    assert_eq!(h.tasks_of("a"), 1);
    assert!(h.manager.commands().contains("a-ping"));

    h.manager.disable("a").await.unwrap();
    assert_eq!(h.state("a"), Some(ModuleState::Disabled));
    assert_eq!(h.tasks_of("a"), 0);
    assert_eq!(h.tasks_of("b"), 1);
    assert!(!h.manager.commands().contains("a-ping"));
    assert_eq!(*h.connection.listeners.lock(), vec!["b-listener"]);
    assert_eq!(h.calls("pre_disable"), vec!["a"]);
    assert_eq!(h.calls("on_disable"), vec!["a"]);
    assert!(h.manager.get_module("a").unwrap().loaded);

    assert!(matches!(
        h.manager.disable("a").await,
        Err(LifecycleError::InvalidTransition { state: ModuleState::Disabled, .. })
    ));

    h.manager.enable("a").await.unwrap();
    assert_eq!(h.state("a"), Some(ModuleState::Enabled));
    assert_eq!(h.tasks_of("a"), 1);
    assert_eq!(h.calls("pre_enable"), vec!["a", "b"]);
}

#[tokio::test]
async fn test_failing_disable_invalidates() {
    let h = Harness::new();
    h.add_with("a", &[], json!({"fail": "on_disable"})).await;
    h.start().await;

    let err = h.manager.disable("a").await.unwrap_err();
    assert!(matches!(err, LifecycleError::LifecycleHook { hook: HookKind::OnDisable, .. }));
    assert_eq!(h.state("a"), Some(ModuleState::Invalid));
    assert_eq!(h.tasks_of("a"), 0);
}

#[tokio::test]
async fn test_reload_creates_new_instance() {
    let h = Harness::new();
    h.add("m", &[]).await;
    h.start().await;

    let before = h.manager.get_module("m").unwrap();
    let serial_before = h
        .manager
        .with_module("m", |m| m.as_any().downcast_ref::<Probe>().map(|p| p.serial))
        .await
        .flatten()
        .unwrap();

    let after = h.manager.reload("m").await.unwrap();
    let serial_after = h
        .manager
        .with_module("m", |m| m.as_any().downcast_ref::<Probe>().map(|p| p.serial))
        .await
        .flatten()
        .unwrap();

    assert_eq!(after.id(), "m");
    assert_eq!(after.version(), before.version());
    assert_ne!(after.instance_id, before.instance_id);
    assert_ne!(serial_after, serial_before);
    assert_eq!(after.state, ModuleState::Enabled);
    assert_eq!(h.tasks_of("m"), 1);
    assert_eq!(h.calls("on_disable"), vec!["m"]);
    assert_eq!(h.calls("on_enable"), vec!["m", "m"]);
}

#[tokio::test]
async fn test_reload_surfaces_hook_failure() {
    let h = Harness::new();
    h.add_with("m", &[], json!({"fail": "pre_disable"})).await;
    h.start().await;

    let err = h.manager.reload("m").await.unwrap_err();
    assert!(matches!(err, LifecycleError::LifecycleHook { hook: HookKind::PreDisable, .. }));
    assert_eq!(h.state("m"), Some(ModuleState::Invalid));
}

#[tokio::test]
async fn test_reload_rejects_invalid_module() {
    let h = Harness::new();
    h.add("m", &["late"]).await;
    h.start().await;
    assert_eq!(h.state("m"), Some(ModuleState::Invalid));

    h.add("late", &[]).await;
    h.manager.enable("late").await.unwrap();

    let err = h.manager.reload("m").await.unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::InvalidTransition { state: ModuleState::Invalid, operation: "reload", .. }
    ));
    assert_eq!(h.state("m"), Some(ModuleState::Invalid));
    assert!(h.calls("pre_enable").iter().all(|id| id != "m"));
    assert!(!h.manager.get_module("m").unwrap().loaded);
}

#[tokio::test]
async fn test_reload_without_connection_changes_nothing() {
    let h = Harness::new();
    h.add("m", &[]).await;
    h.manager.pre_enable_all(Arc::new(TestPrelude)).await;
    let before = h.manager.get_module("m").unwrap();

    let err = h.manager.reload("m").await.unwrap_err();
    assert!(matches!(err, LifecycleError::NotConnected(_)));
    assert_eq!(h.state("m"), Some(ModuleState::PendingEnable));
    assert_eq!(h.manager.get_module("m").unwrap().instance_id, before.instance_id);
    assert!(h.calls("pre_disable").is_empty());
    assert!(h.calls("on_disable").is_empty());

    let report = h.manager.enable_all(h.connection.clone()).await;
    assert_eq!(report.succeeded, vec!["m"]);
    assert_eq!(h.state("m"), Some(ModuleState::Enabled));
}

#[tokio::test]
async fn test_reload_with_disabled_dependency_changes_nothing() {
    let h = Harness::new();
    h.add("a", &[]).await;
    h.add("b", &["a"]).await;
    h.start().await;
    h.manager.disable("a").await.unwrap();

    let err = h.manager.reload("b").await.unwrap_err();
    assert!(matches!(err, LifecycleError::MissingDependency { ref dependency, .. } if dependency == "a"));
    assert_eq!(h.state("b"), Some(ModuleState::Enabled));
    assert_eq!(h.tasks_of("b"), 1);
    assert_eq!(h.calls("on_disable"), vec!["a"]);
}

#[tokio::test]
async fn test_disabled_module_cannot_register_listeners() {
    let h = Harness::new();
    h.add("a", &[]).await;
    h.start().await;
    let listeners = h.manager.records.lock().await["a"].context.listeners.clone();

    h.manager.disable("a").await.unwrap();
    let late = listeners.register_listener(Arc::new(Quiet("late".to_string())));
    assert!(matches!(late, Err(ModuleError::NotConnected(_))));
    assert!(h.connection.listeners.lock().is_empty());

    h.manager.enable("a").await.unwrap();
    assert!(listeners
        .register_listener(Arc::new(Quiet("late".to_string())))
        .unwrap());
    assert_eq!(*h.connection.listeners.lock(), vec!["a-listener", "late"]);
}

#[tokio::test]
async fn test_teardown_in_reverse_order() {
    let h = Harness::new();
    h.add("a", &[]).await;
    h.add("b", &["a"]).await;
    h.add("c", &["b"]).await;
    h.start().await;

    let pre = h.manager.pre_disable_all().await;
    assert!(pre.is_clean());
    for id in ["a", "b", "c"] {
        assert_eq!(h.state(id), Some(ModuleState::PendingDisable));
    }

    let disable = h.manager.disable_all().await;
    assert_eq!(disable.succeeded, vec!["c", "b", "a"]);
    assert_eq!(h.calls("pre_disable"), vec!["c", "b", "a"]);
    assert_eq!(h.calls("on_disable"), vec!["c", "b", "a"]);
    assert!(h.manager.is_empty());
    assert!(h.manager.states().is_empty());
    assert!(h.scheduler.tasks().is_empty());
    assert!(h.manager.commands().is_empty());
    assert!(h.connection.listeners.lock().is_empty());
}

#[tokio::test]
async fn test_disable_all_is_best_effort() {
    let h = Harness::new();
    h.add_with("a", &[], json!({"fail": "on_disable"})).await;
    h.add("b", &[]).await;
    h.start().await;

    let report = h.manager.disable_all().await;
    assert_eq!(report.failed_ids(), vec!["a"]);
    assert_eq!(report.succeeded, vec!["b"]);
    assert_eq!(h.calls("on_disable"), vec!["b", "a"]);
    assert!(h.manager.is_empty());
}

#[tokio::test]
async fn test_load_and_unload() {
    let h = Harness::new();
    h.add("a", &[]).await;

    let duplicate = h
        .manager
        .load(DiscoveredModule::new(
            ModuleDescriptor::new("a", "2.0").with_entry("probe"),
            "/mods/a2",
        ))
        .await;
    assert!(matches!(duplicate, Err(LifecycleError::InvalidTransition { .. })));

    let missing = h
        .manager
        .load(DiscoveredModule::new(ModuleDescriptor::new("x", "1.0"), "/mods/x"))
        .await;
    assert!(matches!(missing, Err(LifecycleError::Instantiation { .. })));
    assert!(h.state("x").is_none());

    h.start().await;
    assert!(matches!(
        h.manager.unload("a").await,
        Err(LifecycleError::InvalidTransition { .. })
    ));
    h.manager.disable("a").await.unwrap();
    h.manager.unload("a").await.unwrap();
    assert!(h.manager.get_module("a").is_none());
    assert!(matches!(
        h.manager.unload("a").await,
        Err(LifecycleError::UnknownModule(_))
    ));
}

#[tokio::test]
async fn test_states_snapshot_is_detached() {
    let h = Harness::new();
    h.add("a", &[]).await;
    let snapshot = h.manager.states();
    h.start().await;

    assert_eq!(snapshot["a"], ModuleState::Discovered);
    assert_eq!(h.manager.states()["a"], ModuleState::Enabled);
    assert_eq!(h.manager.modules().len(), 1);
}

#[tokio::test]
async fn test_context_receives_handles() {
    let h = Harness::new();
    h.add("a", &[]).await;
    h.start().await;

    let result = h.manager.commands().dispatch("a-ping", &serde_json::Value::Null).unwrap();
    assert_eq!(result, json!("pong"));
    assert_eq!(h.manager.connection().unwrap().name(), "test");
}
