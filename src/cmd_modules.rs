//! `modhost modules`: inspect the module directory without enabling anything.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use modhost_core::{DependencyGraph, ModuleFactoryRegistry, ModuleLoader};

/// Print discovered modules, skipped units and the activation order.
pub(crate) fn list_modules(
    modules_dir: &Path,
    descriptor_file: &str,
    factories: Arc<ModuleFactoryRegistry>,
    format: &str,
) -> anyhow::Result<()> {
    let loader = ModuleLoader::new(modules_dir, factories.clone()).with_descriptor_file(descriptor_file);
    let discovery = loader.discover();
    let graph = DependencyGraph::from_descriptors(discovery.modules.iter().map(|m| m.descriptor.as_ref()));
    let resolution = graph.resolve();
    let missing = graph.missing_dependencies();
    let shutdown_order = graph.reverse_order().ok();

    if format == "json" {
        let output = json!({
            "directory": modules_dir.display().to_string(),
            "modules": discovery.modules.iter().map(|m| json!({
                "descriptor": m.descriptor.as_ref(),
                "directory": m.directory.display().to_string(),
                "factory": factories.contains(m.descriptor.entry()),
            })).collect::<Vec<_>>(),
            "failures": discovery.failures.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
            "order": resolution.order,
            "shutdown_order": shutdown_order,
            "cycle": resolution.cycle,
            "missing_dependencies": missing,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Modules in {}:", modules_dir.display());
    if discovery.modules.is_empty() {
        println!("  (none)");
    }
    for module in &discovery.modules {
        let d = &module.descriptor;
        let deps = if d.dependencies.is_empty() {
            "-".to_string()
        } else {
            d.dependencies.iter().cloned().collect::<Vec<_>>().join(", ")
        };
        let factory = if factories.contains(d.entry()) { "" } else { "  [no factory]" };
        println!("  {:<20} {:<10} deps: {}{}", d.id, d.version, deps, factory);
        if !d.description.is_empty() {
            println!("  {:<20} {}", "", d.description);
        }
    }

    if !discovery.failures.is_empty() {
        println!();
        println!("Skipped:");
        for failure in &discovery.failures {
            println!("  {}", failure);
        }
    }

    println!();
    println!("Activation order: {}", resolution.order.join(" -> "));
    if let Some(order) = &shutdown_order {
        println!("Shutdown order:   {}", order.join(" -> "));
    }
    if let Some(cycle) = &resolution.cycle {
        println!("Circular dependency: {}", cycle.join(" -> "));
        println!(
            "Blocked: {}",
            resolution.blocked.iter().cloned().collect::<Vec<_>>().join(", ")
        );
    }
    for (module, deps) in &missing {
        println!("Missing dependencies of {}: {}", module, deps.join(", "));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::register_builtin_factories;

    fn write_unit(root: &Path, dir: &str, content: &str) {
        let unit = root.join(dir);
        std::fs::create_dir_all(&unit).unwrap();
        std::fs::write(unit.join("module.toml"), content).unwrap();
    }

    fn factories() -> Arc<ModuleFactoryRegistry> {
        let factories = Arc::new(ModuleFactoryRegistry::new());
        register_builtin_factories(&factories).unwrap();
        factories
    }

    #[test]
    fn test_list_modules_formats() {
        let temp = tempfile::TempDir::new().unwrap();
        write_unit(temp.path(), "echo", "id = \"echo\"\nversion = \"1.0.0\"\n");
        write_unit(
            temp.path(),
            "heartbeat",
            "id = \"heartbeat\"\nversion = \"1.0.0\"\ndependencies = [\"echo\"]\n",
        );
        write_unit(temp.path(), "broken", "this is not toml [");

        list_modules(temp.path(), "module.toml", factories(), "table").unwrap();
        list_modules(temp.path(), "module.toml", factories(), "json").unwrap();
    }

    #[test]
    fn test_list_modules_missing_directory() {
        let temp = tempfile::TempDir::new().unwrap();
        let missing = temp.path().join("nope");
        list_modules(&missing, "module.toml", factories(), "table").unwrap();
    }
}
