//! Module descriptor types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Immutable metadata describing one packaged module.
///
/// Parsed from the unit's metadata file at discovery time and never mutated
/// afterwards; the host shares it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub authors: Vec<String>,
    /// Ids of modules that must be active before this one.
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
    /// Factory key used to construct the module; defaults to `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
    /// Free-form module configuration.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub config: serde_json::Value,
}

impl ModuleDescriptor {
    /// Create a new descriptor.
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            description: String::new(),
            authors: Vec::new(),
            dependencies: BTreeSet::new(),
            entry: None,
            config: serde_json::Value::Null,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }

    pub fn with_dependency(mut self, id: impl Into<String>) -> Self {
        self.dependencies.insert(id.into());
        self
    }

    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    /// Factory key for this module.
    pub fn entry(&self) -> &str {
        self.entry.as_deref().unwrap_or(&self.id)
    }

    /// Check whether this module declares a dependency on `id`.
    pub fn depends_on(&self, id: &str) -> bool {
        self.dependencies.contains(id)
    }
}

#[cfg(test)]
#[path = "descriptor_tests.rs"]
mod tests;
