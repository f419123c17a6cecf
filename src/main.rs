//! modhost - module host runtime
//!
//! Main entry point for the modhost CLI.

mod adapters;
mod cli;
mod cmd_modules;
mod register;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::json;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use modhost_config::{Config, ConfigLoader, ConfigValidator, LoggingConfig};
use modhost_core::{ModuleFactoryRegistry, ModuleLoader, ModuleManager};
use modhost_scheduler::{SchedulerConfig, TickScheduler};

use crate::adapters::{LocalConnection, LocalPrelude};
use crate::cli::{Cli, Commands};
use crate::register::register_builtin_factories;

/// How long shutdown waits for in-flight async tasks.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialize tracing with console and optional file output.
///
/// `RUST_LOG` takes precedence over the configured level. Log files rotate
/// daily.
fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let mut file_text = None;
    let mut file_json = None;
    if let Some(log_dir) = logging.directory_path() {
        std::fs::create_dir_all(&log_dir)?;
        let file_appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("modhost")
            .filename_suffix("log")
            .max_log_files(14)
            .build(&log_dir)?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        // Keep the writer alive for the program duration
        static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
            std::sync::OnceLock::new();
        let _ = GUARD.set(guard);

        if logging.json {
            file_json = Some(fmt::layer().json().with_writer(non_blocking));
        } else {
            file_text = Some(fmt::layer().with_writer(non_blocking).with_ansi(false));
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .with(file_text)
        .with(file_json)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::load_or_default(&cli.config)?;
    let warnings = ConfigValidator::validate(&config).into_result()?;
    init_tracing(&config.logging)?;
    for warning in warnings {
        warn!("Config {}: {}", warning.path, warning.message);
    }

    let modules_dir = cli
        .modules
        .unwrap_or_else(|| config.modules.directory_path());

    let factories = Arc::new(ModuleFactoryRegistry::new());
    register_builtin_factories(&factories)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config, modules_dir, factories).await,
        Commands::Modules { format } => cmd_modules::list_modules(
            &modules_dir,
            &config.modules.descriptor_file,
            factories,
            &format,
        ),
    }
}

/// Load and enable modules, drive the scheduler until Ctrl-C, then shut down.
async fn run(
    config: Config,
    modules_dir: PathBuf,
    factories: Arc<ModuleFactoryRegistry>,
) -> anyhow::Result<()> {
    info!("Starting modhost v{}", env!("CARGO_PKG_VERSION"));
    info!("Module directory: {}", modules_dir.display());

    let tick_rate = config.scheduler.tick_rate();
    let scheduler = Arc::new(TickScheduler::new(SchedulerConfig::with_tick_rate(tick_rate)));
    let loader = ModuleLoader::new(&modules_dir, factories)
        .with_descriptor_file(&config.modules.descriptor_file);
    let manager = ModuleManager::new(loader, scheduler.clone());

    let loaded = manager.load_all().await;
    for failure in &loaded.failures {
        warn!("Skipped module: {}", failure);
    }

    manager
        .pre_enable_all(Arc::new(LocalPrelude::new("modhost", tick_rate)))
        .await;
    let connection = Arc::new(LocalConnection::new("local"));
    manager.enable_all(connection.clone()).await;

    scheduler.start()?;
    connection.publish(&json!({
        "type": "host_started",
        "modules": manager.states(),
    }));
    info!(
        "modhost running with {} module(s), press Ctrl-C to stop",
        manager.len()
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    shutdown(&scheduler, &manager).await;
    Ok(())
}

/// Stop the scheduler, then tear modules down dependents first.
async fn shutdown(scheduler: &TickScheduler, manager: &ModuleManager) {
    scheduler.shutdown().await;
    if !scheduler.wait_idle(DRAIN_TIMEOUT).await {
        warn!("Async tasks still running after {:?}", DRAIN_TIMEOUT);
    }

    manager.pre_disable_all().await;
    manager.disable_all().await;
    info!("modhost stopped");
}
