//! Module lifecycle manager.
//!
//! Owns every module record and is the only place module state changes.
//! Batch operations walk modules in dependency order and contain failures
//! to the module that caused them.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use modhost_protocols::{
    ConnectionHandle, Module, ModuleContext, ModuleDescriptor, ModuleScheduler, ModuleState,
    PreludeHandle, TaskScheduler, panic_message,
};

use crate::dependency::DependencyGraph;
use crate::error::{HookKind, LifecycleError, LifecycleResult};
use crate::loader::{DiscoveredModule, LoadContext, ModuleLoader};
use crate::record::{ModuleRecord, ModuleSnapshot};
use crate::registry::{CommandBridge, CommandRegistry, ListenerBridge};

/// Per-module outcome of a batch operation.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Modules that completed the transition, in processing order.
    pub succeeded: Vec<String>,
    /// Modules that failed, with the reason.
    pub failed: Vec<(String, String)>,
}

impl BatchReport {
    fn succeed(&mut self, id: &str) {
        self.succeeded.push(id.to_string());
    }

    fn fail(&mut self, id: &str, err: &LifecycleError) {
        self.failed.push((id.to_string(), err.to_string()));
    }

    fn log(&self, phase: &str) {
        info!(
            "{}: {} modules succeeded, {} failed",
            phase,
            self.succeeded.len(),
            self.failed.len()
        );
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_ids(&self) -> Vec<&str> {
        self.failed.iter().map(|(id, _)| id.as_str()).collect()
    }
}

/// Outcome of loading modules from disk.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    /// Units skipped during discovery or instantiation.
    pub failures: Vec<LifecycleError>,
}

/// Drives modules through `DISCOVERED -> PENDING_ENABLE -> ENABLED ->
/// PENDING_DISABLE -> DISABLED`, with `INVALID` on unrecovered faults.
pub struct ModuleManager {
    loader: ModuleLoader,
    scheduler: Arc<dyn TaskScheduler>,
    commands: Arc<CommandRegistry>,
    records: Mutex<BTreeMap<String, ModuleRecord>>,
    snapshots: DashMap<String, ModuleSnapshot>,
    prelude: RwLock<Option<Arc<dyn PreludeHandle>>>,
    connection: RwLock<Option<Arc<dyn ConnectionHandle>>>,
}

impl ModuleManager {
    pub fn new(loader: ModuleLoader, scheduler: Arc<dyn TaskScheduler>) -> Self {
        Self::with_command_registry(loader, scheduler, Arc::new(CommandRegistry::new()))
    }

    /// Create a manager sharing an existing command registry.
    pub fn with_command_registry(
        loader: ModuleLoader,
        scheduler: Arc<dyn TaskScheduler>,
        commands: Arc<CommandRegistry>,
    ) -> Self {
        Self {
            loader,
            scheduler,
            commands,
            records: Mutex::new(BTreeMap::new()),
            snapshots: DashMap::new(),
            prelude: RwLock::new(None),
            connection: RwLock::new(None),
        }
    }

    pub fn loader(&self) -> &ModuleLoader {
        &self.loader
    }

    pub fn scheduler(&self) -> &Arc<dyn TaskScheduler> {
        &self.scheduler
    }

    pub fn commands(&self) -> &Arc<CommandRegistry> {
        &self.commands
    }

    /// Connection handle injected by the last `enable_all`.
    pub fn connection(&self) -> Option<Arc<dyn ConnectionHandle>> {
        self.connection.read().clone()
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Discover units under the loader's root and instantiate each one.
    pub async fn load_all(&self) -> LoadReport {
        let discovery = self.loader.discover();
        let mut report = LoadReport {
            loaded: Vec::new(),
            failures: discovery.failures,
        };

        for module in discovery.modules {
            let id = module.id().to_string();
            match self.load(module).await {
                Ok(()) => report.loaded.push(id),
                Err(e) => {
                    error!(module = %id, "{}", e);
                    report.failures.push(e);
                }
            }
        }

        info!(
            "Loaded {} modules, {} failed",
            report.loaded.len(),
            report.failures.len()
        );
        report
    }

    /// Instantiate one discovered module and record it as `DISCOVERED`.
    pub async fn load(&self, module: DiscoveredModule) -> LifecycleResult<()> {
        let mut records = self.records.lock().await;
        if let Some(existing) = records.get(module.id()) {
            return Err(LifecycleError::InvalidTransition {
                id: module.id().to_string(),
                state: existing.state,
                operation: "load",
            });
        }

        let load = self.loader.instantiate(&module)?;
        let record = self.build_record(module, load);
        info!(
            module = %record.id(),
            "Loaded module {} v{}",
            record.id(),
            record.descriptor().version
        );
        self.snapshots.insert(record.id().to_string(), record.snapshot());
        records.insert(record.id().to_string(), record);
        Ok(())
    }

    /// Drop a module that is not active and forget it.
    pub async fn unload(&self, id: &str) -> LifecycleResult<()> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| LifecycleError::UnknownModule(id.to_string()))?;
        if record.state.is_active() || record.state.is_transitional() {
            return Err(LifecycleError::InvalidTransition {
                id: id.to_string(),
                state: record.state,
                operation: "unload",
            });
        }

        self.teardown(record);
        records.remove(id);
        self.snapshots.remove(id);
        info!(module = %id, "Unloaded module {}", id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Batch operations
    // ------------------------------------------------------------------

    /// Run `pre_enable` on every `DISCOVERED` module in dependency order.
    pub async fn pre_enable_all(&self, prelude: Arc<dyn PreludeHandle>) -> BatchReport {
        *self.prelude.write() = Some(prelude.clone());
        let mut records = self.records.lock().await;
        let mut report = BatchReport::default();

        let order = self.batch_order(&mut records, &mut report, |s| s == ModuleState::Discovered);
        for id in order {
            let Some(record) = records.get_mut(&id) else { continue };
            match self.pre_enable_record(record, Some(&prelude)).await {
                Ok(()) => report.succeed(&id),
                Err(e) => {
                    error!(module = %id, "{}", e);
                    report.fail(&id, &e);
                }
            }
        }

        report.log("Pre-enable");
        report
    }

    /// Run `on_enable` on every `PENDING_ENABLE` module in dependency order.
    pub async fn enable_all(&self, connection: Arc<dyn ConnectionHandle>) -> BatchReport {
        *self.connection.write() = Some(connection.clone());
        let mut records = self.records.lock().await;
        let mut report = BatchReport::default();

        let order = self.batch_order(&mut records, &mut report, |s| s == ModuleState::PendingEnable);
        for id in order {
            let Some(record) = records.get_mut(&id) else { continue };
            match self.enable_record(record, &connection).await {
                Ok(()) => report.succeed(&id),
                Err(e) => {
                    error!(module = %id, "{}", e);
                    report.fail(&id, &e);
                }
            }
        }

        report.log("Enable");
        report
    }

    /// Run `pre_disable` on every active module, dependents first.
    ///
    /// Failures are logged and do not stop the batch.
    pub async fn pre_disable_all(&self) -> BatchReport {
        let mut records = self.records.lock().await;
        let mut report = BatchReport::default();

        let mut order = self.batch_order(&mut records, &mut report, |s| s.is_active());
        order.reverse();
        for id in order {
            let Some(record) = records.get_mut(&id) else { continue };
            match self.pre_disable_record(record).await {
                Ok(()) => report.succeed(&id),
                Err(e) => {
                    warn!(module = %id, "{}", e);
                    report.fail(&id, &e);
                }
            }
        }

        report.log("Pre-disable");
        report
    }

    /// Run `on_disable` on every module still running, dependents first,
    /// then unload and forget all modules.
    pub async fn disable_all(&self) -> BatchReport {
        let mut records = self.records.lock().await;
        let mut report = BatchReport::default();

        let mut order = self.batch_order(&mut records, &mut report, |s| {
            s.is_active() || s == ModuleState::PendingDisable
        });
        order.reverse();
        for id in order {
            let Some(record) = records.get_mut(&id) else { continue };
            let outcome = match record.state {
                ModuleState::PendingDisable => self.on_disable_record(record).await,
                _ => self.disable_record(record).await,
            };
            match outcome {
                Ok(()) => report.succeed(&id),
                Err(e) => {
                    warn!(module = %id, "{}", e);
                    report.fail(&id, &e);
                }
            }
        }
        report.log("Disable");

        let count = records.len();
        for record in records.values_mut() {
            self.teardown(record);
        }
        records.clear();
        self.snapshots.clear();
        info!("Unloaded {} modules", count);

        report
    }

    // ------------------------------------------------------------------
    // Single-module operations
    // ------------------------------------------------------------------

    /// Enable one module.
    ///
    /// From `DISCOVERED` this runs `pre_enable` then `on_enable`; from
    /// `DISABLED` only `on_enable`. Requires a connection from `enable_all`.
    pub async fn enable(&self, id: &str) -> LifecycleResult<()> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| LifecycleError::UnknownModule(id.to_string()))?;

        match record.state {
            ModuleState::Discovered | ModuleState::Disabled => {}
            state => {
                return Err(LifecycleError::InvalidTransition {
                    id: id.to_string(),
                    state,
                    operation: "enable",
                });
            }
        }
        let connection = self
            .connection()
            .ok_or_else(|| LifecycleError::NotConnected(id.to_string()))?;

        if record.state == ModuleState::Discovered {
            let prelude = self.prelude.read().clone();
            self.pre_enable_record(record, prelude.as_ref()).await?;
        }
        self.enable_record(record, &connection).await?;
        info!(module = %id, "Enabled module {}", id);
        Ok(())
    }

    /// Disable one module that is `ENABLED` or `PENDING_ENABLE`.
    ///
    /// Its tasks are cancelled, listeners detached and commands removed. The
    /// listener bridge is disconnected until the module is enabled again.
    /// The instance stays loaded.
    pub async fn disable(&self, id: &str) -> LifecycleResult<()> {
        let mut records = self.records.lock().await;
        let state = records
            .get(id)
            .map(|r| r.state)
            .ok_or_else(|| LifecycleError::UnknownModule(id.to_string()))?;
        if !state.is_active() {
            return Err(LifecycleError::InvalidTransition {
                id: id.to_string(),
                state,
                operation: "disable",
            });
        }

        let active = DependencyGraph::from_descriptors(
            records
                .values()
                .filter(|r| r.state.is_active())
                .map(|r| r.descriptor().as_ref()),
        );
        let dependents = active.transitive_dependents(id);
        if !dependents.is_empty() {
            warn!(
                module = %id,
                "Disabling {} while {} still depend on it",
                id,
                dependents.into_iter().collect::<Vec<_>>().join(", ")
            );
        }

        let Some(record) = records.get_mut(id) else {
            return Err(LifecycleError::UnknownModule(id.to_string()));
        };
        self.disable_record(record).await?;
        info!(module = %id, "Disabled module {}", id);
        Ok(())
    }

    /// Disable, unload, reinstantiate and enable a module.
    ///
    /// The id and descriptor are kept; the runtime instance and its loading
    /// context are new. Rejected for `INVALID` and `PENDING_DISABLE` modules,
    /// without a connection, or while a dependency is not `ENABLED`; nothing
    /// is torn down in those cases.
    pub async fn reload(&self, id: &str) -> LifecycleResult<ModuleSnapshot> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| LifecycleError::UnknownModule(id.to_string()))?;

        if matches!(record.state, ModuleState::Invalid | ModuleState::PendingDisable) {
            return Err(LifecycleError::InvalidTransition {
                id: id.to_string(),
                state: record.state,
                operation: "reload",
            });
        }
        let connection = self
            .connection()
            .ok_or_else(|| LifecycleError::NotConnected(id.to_string()))?;
        self.check_dependencies(record, |s| s == ModuleState::Enabled)?;
        info!(module = %id, "Reloading module {}", id);

        if record.state.is_active() {
            self.disable_record(record).await?;
        }
        self.teardown(record);

        match self.loader.instantiate(&record.source) {
            Ok(load) => {
                *record = self.build_record(record.source.clone(), load);
                self.snapshots.insert(id.to_string(), record.snapshot());
            }
            Err(e) => {
                self.set_state(record, ModuleState::Invalid);
                error!(module = %id, "{}", e);
                return Err(e);
            }
        }

        let prelude = self.prelude.read().clone();
        self.pre_enable_record(record, prelude.as_ref()).await?;
        self.enable_record(record, &connection).await?;
        info!(module = %id, "Reloaded module {}", id);
        Ok(record.snapshot())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Snapshot of one module record.
    pub fn get_module(&self, id: &str) -> Option<ModuleSnapshot> {
        self.snapshots.get(id).map(|s| s.clone())
    }

    /// State of one module, `None` if no record exists.
    pub fn get_state(&self, id: &str) -> Option<ModuleState> {
        self.snapshots.get(id).map(|s| s.state)
    }

    /// Immutable snapshot of every module's state.
    pub fn states(&self) -> BTreeMap<String, ModuleState> {
        self.snapshots
            .iter()
            .map(|s| (s.key().clone(), s.state))
            .collect()
    }

    /// Snapshots of every module, ordered by id.
    pub fn modules(&self) -> Vec<ModuleSnapshot> {
        let mut modules: Vec<ModuleSnapshot> = self.snapshots.iter().map(|s| s.clone()).collect();
        modules.sort_by(|a, b| a.descriptor.id.cmp(&b.descriptor.id));
        modules
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Borrow a module's runtime instance.
    pub async fn with_module<R>(&self, id: &str, f: impl FnOnce(&dyn Module) -> R) -> Option<R> {
        let records = self.records.lock().await;
        records.get(id).and_then(|r| r.load.instance()).map(f)
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    fn build_record(&self, source: DiscoveredModule, load: LoadContext) -> ModuleRecord {
        let id = source.id().to_string();
        let listeners = Arc::new(ListenerBridge::new(&id));
        let context = ModuleContext::new(
            source.descriptor.clone(),
            ModuleScheduler::new(&id, self.scheduler.clone()),
            Arc::new(CommandBridge::new(&id, self.commands.clone())),
            listeners.clone(),
            source.directory.clone(),
        );
        ModuleRecord {
            source,
            state: ModuleState::Discovered,
            load,
            context,
            listeners,
        }
    }

    fn set_state(&self, record: &mut ModuleRecord, state: ModuleState) {
        debug!(module = %record.id(), "{} -> {}", record.state, state);
        record.state = state;
        self.snapshots.insert(record.id().to_string(), record.snapshot());
    }

    /// Release host resources held for the module and drop its instance.
    fn teardown(&self, record: &mut ModuleRecord) {
        record.release(self.scheduler.as_ref(), &self.commands);
        record.listeners.disconnect();
        record.load.unload();
    }

    /// Isolate a faulty module: tear it down and mark it `INVALID`.
    fn invalidate(&self, record: &mut ModuleRecord) {
        self.teardown(record);
        self.set_state(record, ModuleState::Invalid);
    }

    /// Dependency order of the records whose state matches `select`.
    ///
    /// Records caught in a dependency cycle are invalidated and reported.
    fn batch_order(
        &self,
        records: &mut BTreeMap<String, ModuleRecord>,
        report: &mut BatchReport,
        select: impl Fn(ModuleState) -> bool,
    ) -> Vec<String> {
        let selected: Vec<&ModuleDescriptor> = records
            .values()
            .filter(|r| select(r.state))
            .map(|r| r.descriptor().as_ref())
            .collect();
        let resolution = DependencyGraph::from_descriptors(selected).resolve();

        if let Some(cycle) = resolution.cycle {
            let err = LifecycleError::CircularDependency { cycle };
            error!("{}", err);
            for id in &resolution.blocked {
                if let Some(record) = records.get_mut(id) {
                    self.invalidate(record);
                    report.fail(id, &err);
                }
            }
        }
        resolution.order
    }

    /// Fail unless every dependency of `record` is in a state `accept` allows.
    fn check_dependencies(
        &self,
        record: &ModuleRecord,
        accept: impl Fn(ModuleState) -> bool,
    ) -> LifecycleResult<()> {
        for dependency in &record.descriptor().dependencies {
            let satisfied = self
                .get_state(dependency)
                .map(&accept)
                .unwrap_or(false);
            if !satisfied {
                return Err(LifecycleError::MissingDependency {
                    module: record.id().to_string(),
                    dependency: dependency.clone(),
                });
            }
        }
        Ok(())
    }

    async fn pre_enable_record(
        &self,
        record: &mut ModuleRecord,
        prelude: Option<&Arc<dyn PreludeHandle>>,
    ) -> LifecycleResult<()> {
        if let Err(e) = self.check_dependencies(record, |s| s.is_active()) {
            self.invalidate(record);
            return Err(e);
        }

        record.context.prelude = prelude.cloned();
        if let Err(e) = invoke(record, HookKind::PreEnable).await {
            self.invalidate(record);
            return Err(e);
        }
        self.set_state(record, ModuleState::PendingEnable);
        Ok(())
    }

    async fn enable_record(
        &self,
        record: &mut ModuleRecord,
        connection: &Arc<dyn ConnectionHandle>,
    ) -> LifecycleResult<()> {
        if let Err(e) = self.check_dependencies(record, |s| s == ModuleState::Enabled) {
            self.invalidate(record);
            return Err(e);
        }

        record.context.connection = Some(connection.clone());
        record.listeners.connect(connection.clone());
        if let Err(e) = invoke(record, HookKind::OnEnable).await {
            self.invalidate(record);
            return Err(e);
        }
        self.set_state(record, ModuleState::Enabled);
        Ok(())
    }

    async fn pre_disable_record(&self, record: &mut ModuleRecord) -> LifecycleResult<()> {
        if let Err(e) = invoke(record, HookKind::PreDisable).await {
            self.invalidate(record);
            return Err(e);
        }
        self.set_state(record, ModuleState::PendingDisable);
        Ok(())
    }

    async fn on_disable_record(&self, record: &mut ModuleRecord) -> LifecycleResult<()> {
        let outcome = invoke(record, HookKind::OnDisable).await;
        record.release(self.scheduler.as_ref(), &self.commands);
        record.listeners.disconnect();
        record.context.connection = None;
        record.context.prelude = None;
        match outcome {
            Ok(()) => {
                self.set_state(record, ModuleState::Disabled);
                Ok(())
            }
            Err(e) => {
                self.invalidate(record);
                Err(e)
            }
        }
    }

    async fn disable_record(&self, record: &mut ModuleRecord) -> LifecycleResult<()> {
        self.pre_disable_record(record).await?;
        self.on_disable_record(record).await
    }
}

/// Call one hook on the module's instance, converting errors and panics.
async fn invoke(record: &mut ModuleRecord, hook: HookKind) -> LifecycleResult<()> {
    let id = record.id().to_string();
    let ctx = record.context.clone();
    let hook_error = |reason: String| LifecycleError::LifecycleHook {
        id: id.clone(),
        hook,
        reason,
    };

    let Some(module) = record.load.instance_mut() else {
        return Err(hook_error("module instance is not loaded".to_string()));
    };

    debug!(module = %id, "Calling {}", hook);
    let call = match hook {
        HookKind::PreEnable => module.pre_enable(&ctx),
        HookKind::OnEnable => module.on_enable(&ctx),
        HookKind::PreDisable => module.pre_disable(&ctx),
        HookKind::OnDisable => module.on_disable(&ctx),
    };

    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(hook_error(e.to_string())),
        Err(payload) => Err(hook_error(format!(
            "panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
