//! Module discovery and instantiation.
//!
//! Every immediate child directory of the discovery root that holds a
//! descriptor file is one module unit. A unit's entry names a factory in the
//! [`ModuleFactoryRegistry`]; each instantiation gets its own [`LoadContext`].

use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use modhost_protocols::{panic_message, Module, ModuleDescriptor};

use crate::error::{LifecycleError, LifecycleResult};
use crate::registry::ModuleFactoryRegistry;

/// Default descriptor file name inside a unit directory.
pub const DESCRIPTOR_FILE: &str = "module.toml";

/// A parsed descriptor and the directory it was found in.
#[derive(Debug, Clone)]
pub struct DiscoveredModule {
    pub descriptor: Arc<ModuleDescriptor>,
    pub directory: PathBuf,
}

impl DiscoveredModule {
    pub fn new(descriptor: ModuleDescriptor, directory: impl Into<PathBuf>) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            directory: directory.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }
}

/// Result of scanning a discovery root.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Valid units in lexical directory order.
    pub modules: Vec<DiscoveredModule>,
    /// Units that were skipped.
    pub failures: Vec<LifecycleError>,
}

/// Isolated loading scope for one module instance.
///
/// Reloading a module discards its context and creates a new one, so two
/// instances never share a context id.
pub struct LoadContext {
    id: Uuid,
    descriptor: Arc<ModuleDescriptor>,
    directory: PathBuf,
    loaded_at: DateTime<Utc>,
    instance: Option<Box<dyn Module>>,
}

impl LoadContext {
    pub fn new(descriptor: Arc<ModuleDescriptor>, directory: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            descriptor,
            directory: directory.into(),
            loaded_at: Utc::now(),
            instance: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn descriptor(&self) -> &Arc<ModuleDescriptor> {
        &self.descriptor
    }

    /// Directory the unit was loaded from.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn is_loaded(&self) -> bool {
        self.instance.is_some()
    }

    pub fn instance(&self) -> Option<&dyn Module> {
        self.instance.as_deref()
    }

    pub fn instance_mut(&mut self) -> Option<&mut (dyn Module + 'static)> {
        self.instance.as_deref_mut()
    }

    /// Drop the module instance.
    pub fn unload(&mut self) -> bool {
        let was_loaded = self.instance.take().is_some();
        if was_loaded {
            debug!(module = %self.descriptor.id, context = %self.id, "Unloaded module instance");
        }
        was_loaded
    }
}

/// Discovers module units on disk and instantiates them through factories.
pub struct ModuleLoader {
    root: PathBuf,
    descriptor_file: String,
    factories: Arc<ModuleFactoryRegistry>,
}

impl ModuleLoader {
    pub fn new(root: impl Into<PathBuf>, factories: Arc<ModuleFactoryRegistry>) -> Self {
        Self {
            root: root.into(),
            descriptor_file: DESCRIPTOR_FILE.to_string(),
            factories,
        }
    }

    /// Use a different descriptor file name.
    pub fn with_descriptor_file(mut self, name: impl Into<String>) -> Self {
        self.descriptor_file = name.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn factories(&self) -> &Arc<ModuleFactoryRegistry> {
        &self.factories
    }

    /// Scan the discovery root.
    ///
    /// Malformed units are reported in [`Discovery::failures`] and skipped.
    /// A missing root yields an empty discovery.
    pub fn discover(&self) -> Discovery {
        let mut discovery = Discovery::default();

        if !self.root.is_dir() {
            debug!("Module directory does not exist: {}", self.root.display());
            return discovery;
        }

        let mut seen = BTreeSet::new();
        let units = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir());

        for unit in units {
            let descriptor_path = unit.path().join(&self.descriptor_file);
            if !descriptor_path.is_file() {
                debug!("Skipping {}: no {}", unit.path().display(), self.descriptor_file);
                continue;
            }

            match parse_descriptor_file(&descriptor_path) {
                Ok(descriptor) if !seen.insert(descriptor.id.clone()) => {
                    let err = LifecycleError::DescriptorParse {
                        path: descriptor_path,
                        reason: format!("duplicate module id '{}'", descriptor.id),
                    };
                    warn!("{}", err);
                    discovery.failures.push(err);
                }
                Ok(descriptor) => {
                    debug!("Discovered module {} v{}", descriptor.id, descriptor.version);
                    discovery
                        .modules
                        .push(DiscoveredModule::new(descriptor, unit.path()));
                }
                Err(err) => {
                    warn!("{}", err);
                    discovery.failures.push(err);
                }
            }
        }

        info!(
            "Discovered {} module(s) in {}, {} skipped",
            discovery.modules.len(),
            self.root.display(),
            discovery.failures.len()
        );
        discovery
    }

    /// Construct a fresh instance of a discovered module.
    ///
    /// The returned context owns the instance. Factory errors and panics
    /// become [`LifecycleError::Instantiation`].
    pub fn instantiate(&self, module: &DiscoveredModule) -> LifecycleResult<LoadContext> {
        let descriptor = &module.descriptor;
        let entry = descriptor.entry();
        let instantiation = |reason: String| LifecycleError::Instantiation {
            id: descriptor.id.clone(),
            reason,
        };

        let factory = self
            .factories
            .get(entry)
            .ok_or_else(|| instantiation(format!("no factory registered for entry '{}'", entry)))?;
        if !factory.is_instantiable() {
            return Err(instantiation(format!("entry '{}' is not instantiable", entry)));
        }

        let mut ctx = LoadContext::new(descriptor.clone(), &module.directory);
        let instance = match panic::catch_unwind(AssertUnwindSafe(|| factory.create(&ctx))) {
            Ok(Ok(instance)) => instance,
            Ok(Err(e)) => return Err(instantiation(e.to_string())),
            Err(payload) => {
                return Err(instantiation(format!(
                    "factory panicked: {}",
                    panic_message(payload.as_ref())
                )));
            }
        };

        ctx.instance = Some(instance);
        debug!(module = %descriptor.id, context = %ctx.id, "Instantiated module");
        Ok(ctx)
    }
}

/// Read and validate a descriptor file.
pub fn parse_descriptor_file(path: &Path) -> LifecycleResult<ModuleDescriptor> {
    let content = std::fs::read_to_string(path).map_err(|e| LifecycleError::DescriptorParse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_descriptor(&content).map_err(|reason| LifecycleError::DescriptorParse {
        path: path.to_path_buf(),
        reason,
    })
}

/// Parse and validate descriptor TOML.
pub fn parse_descriptor(content: &str) -> Result<ModuleDescriptor, String> {
    let descriptor: ModuleDescriptor = toml::from_str(content).map_err(|e| e.to_string())?;
    validate_descriptor(&descriptor)?;
    Ok(descriptor)
}

fn validate_descriptor(descriptor: &ModuleDescriptor) -> Result<(), String> {
    if descriptor.id.is_empty() {
        return Err("module id must not be empty".to_string());
    }
    if !descriptor
        .id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(format!(
            "module id '{}' may only contain letters, digits, '_', '.' and '-'",
            descriptor.id
        ));
    }
    if descriptor.version.trim().is_empty() {
        return Err(format!("module {} has an empty version", descriptor.id));
    }
    if descriptor.depends_on(&descriptor.id) {
        return Err(format!("module {} depends on itself", descriptor.id));
    }
    Ok(())
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;
