//! Module factory registry.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use modhost_protocols::{Module, ModuleError};

use crate::loader::LoadContext;

/// Constructs module instances for one entry key.
pub trait ModuleFactory: Send + Sync {
    /// Entry key that descriptors refer to.
    fn entry(&self) -> &str;

    /// Whether this factory can produce instances at all.
    fn is_instantiable(&self) -> bool {
        true
    }

    /// Create a fresh instance inside `ctx`.
    fn create(&self, ctx: &LoadContext) -> Result<Box<dyn Module>, ModuleError>;
}

/// Factory backed by a closure.
pub struct FnModuleFactory<F> {
    entry: String,
    create: F,
}

impl<F> FnModuleFactory<F>
where
    F: Fn(&LoadContext) -> Result<Box<dyn Module>, ModuleError> + Send + Sync,
{
    pub fn new(entry: impl Into<String>, create: F) -> Self {
        Self {
            entry: entry.into(),
            create,
        }
    }
}

impl<F> ModuleFactory for FnModuleFactory<F>
where
    F: Fn(&LoadContext) -> Result<Box<dyn Module>, ModuleError> + Send + Sync,
{
    fn entry(&self) -> &str {
        &self.entry
    }

    fn create(&self, ctx: &LoadContext) -> Result<Box<dyn Module>, ModuleError> {
        (self.create)(ctx)
    }
}

/// Registry of module factories keyed by entry.
pub struct ModuleFactoryRegistry {
    factories: DashMap<String, Arc<dyn ModuleFactory>>,
}

impl ModuleFactoryRegistry {
    pub fn new() -> Self {
        Self {
            factories: DashMap::new(),
        }
    }

    /// Register a factory. Fails if the entry key is taken.
    pub fn register(&self, factory: Arc<dyn ModuleFactory>) -> Result<(), ModuleError> {
        let entry = factory.entry().to_string();
        match self.factories.entry(entry) {
            Entry::Occupied(slot) => Err(ModuleError::AlreadyRegistered(slot.key().clone())),
            Entry::Vacant(slot) => {
                slot.insert(factory);
                Ok(())
            }
        }
    }

    /// Register a closure as the factory for `entry`.
    pub fn register_fn<F>(&self, entry: impl Into<String>, create: F) -> Result<(), ModuleError>
    where
        F: Fn(&LoadContext) -> Result<Box<dyn Module>, ModuleError> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnModuleFactory::new(entry, create)))
    }

    pub fn unregister(&self, entry: &str) -> Result<(), ModuleError> {
        self.factories
            .remove(entry)
            .ok_or_else(|| ModuleError::NotFound(entry.to_string()))?;
        Ok(())
    }

    pub fn get(&self, entry: &str) -> Option<Arc<dyn ModuleFactory>> {
        self.factories.get(entry).map(|f| f.clone())
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.factories.contains_key(entry)
    }

    /// Registered entry keys, sorted.
    pub fn entries(&self) -> Vec<String> {
        let mut entries: Vec<String> = self.factories.iter().map(|f| f.key().clone()).collect();
        entries.sort();
        entries
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Default for ModuleFactoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}
