//! Module dependency graph.
//!
//! Ordering uses Kahn's algorithm. When several modules become ready at the
//! same time the lexically smallest id goes first, so activation order is
//! stable across runs regardless of discovery order.

use std::collections::{BTreeMap, BTreeSet};

use modhost_protocols::ModuleDescriptor;

use crate::error::{LifecycleError, LifecycleResult};

/// Outcome of ordering a graph that may contain cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Modules in dependency order.
    pub order: Vec<String>,
    /// Modules that are part of a cycle or depend on one.
    pub blocked: BTreeSet<String>,
    /// One cycle among the blocked modules, first element repeated at the end.
    pub cycle: Option<Vec<String>>,
}

impl Resolution {
    pub fn is_acyclic(&self) -> bool {
        self.blocked.is_empty()
    }
}

/// Mapping from module id to the ids it requires.
///
/// Dependencies on ids that are not nodes of the graph are kept but do not
/// constrain ordering; checking that they are satisfied is up to the caller.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from module descriptors.
    pub fn from_descriptors<'a, I>(descriptors: I) -> Self
    where
        I: IntoIterator<Item = &'a ModuleDescriptor>,
    {
        let mut graph = Self::new();
        for descriptor in descriptors {
            graph.add_module(&descriptor.id, descriptor.dependencies.iter().cloned());
        }
        graph
    }

    /// Add a module node with its dependencies. Re-adding replaces them.
    pub fn add_module<I, S>(&mut self, id: &str, dependencies: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.edges
            .insert(id.to_string(), dependencies.into_iter().map(Into::into).collect());
    }

    pub fn contains(&self, id: &str) -> bool {
        self.edges.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Declared dependencies of `id`.
    pub fn dependencies(&self, id: &str) -> Vec<String> {
        self.edges
            .get(id)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Nodes that directly depend on `id`.
    pub fn dependents(&self, id: &str) -> Vec<String> {
        self.edges
            .iter()
            .filter(|(_, deps)| deps.contains(id))
            .map(|(node, _)| node.clone())
            .collect()
    }

    /// Nodes that depend on `id` directly or transitively.
    pub fn transitive_dependents(&self, id: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            for dependent in self.dependents(&current) {
                if found.insert(dependent.clone()) {
                    stack.push(dependent);
                }
            }
        }
        found
    }

    /// Dependencies that are not nodes of the graph, per module.
    pub fn missing_dependencies(&self) -> BTreeMap<String, Vec<String>> {
        self.edges
            .iter()
            .filter_map(|(id, deps)| {
                let missing: Vec<String> =
                    deps.iter().filter(|d| !self.contains(d)).cloned().collect();
                (!missing.is_empty()).then(|| (id.clone(), missing))
            })
            .collect()
    }

    /// Order every node after all of its dependencies.
    ///
    /// Fails with [`LifecycleError::CircularDependency`] if the graph has a cycle.
    pub fn sort(&self) -> LifecycleResult<Vec<String>> {
        let resolution = self.resolve();
        match resolution.cycle {
            Some(cycle) => Err(LifecycleError::CircularDependency { cycle }),
            None => Ok(resolution.order),
        }
    }

    /// Order as many nodes as possible and report the ones blocked by cycles.
    pub fn resolve(&self) -> Resolution {
        let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
        let mut reverse: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for (id, deps) in &self.edges {
            let count = deps.iter().filter(|d| self.contains(d)).count();
            in_degree.insert(id.as_str(), count);
            for dep in deps.iter().filter(|d| self.contains(d)) {
                reverse.entry(dep.as_str()).or_default().push(id.as_str());
            }
        }

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut order = Vec::with_capacity(self.edges.len());

        while let Some(id) = ready.pop_first() {
            order.push(id.to_string());
            for &dependent in reverse.get(id).map(Vec::as_slice).unwrap_or_default() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        let blocked: BTreeSet<String> = in_degree
            .into_iter()
            .filter(|&(_, degree)| degree > 0)
            .map(|(id, _)| id.to_string())
            .collect();
        let cycle = self.find_cycle(&blocked);

        Resolution {
            order,
            blocked,
            cycle,
        }
    }

    /// Ids in teardown order: dependents before their dependencies.
    pub fn reverse_order(&self) -> LifecycleResult<Vec<String>> {
        let mut order = self.sort()?;
        order.reverse();
        Ok(order)
    }

    /// Walk unsatisfied edges from the smallest blocked node until a node repeats.
    ///
    /// Every blocked node has at least one blocked dependency, so the walk
    /// always closes a cycle.
    fn find_cycle(&self, blocked: &BTreeSet<String>) -> Option<Vec<String>> {
        let mut current = blocked.first()?.clone();
        let mut path: Vec<String> = Vec::new();

        loop {
            if let Some(pos) = path.iter().position(|id| *id == current) {
                let mut cycle = path.split_off(pos);
                cycle.push(current);
                return Some(cycle);
            }
            let next = self
                .edges
                .get(&current)?
                .iter()
                .find(|dep| blocked.contains(*dep))?
                .clone();
            path.push(current);
            current = next;
        }
    }
}

#[cfg(test)]
#[path = "dependency_tests.rs"]
mod tests;
