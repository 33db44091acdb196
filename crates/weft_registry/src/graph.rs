//! Dependency graph between registered protocols.
//!
//! Forward edges map a protocol to what it depends on, reverse edges map a
//! protocol to what depends on it. Both sides are kept in step by `link`
//! and `unlink`; nothing else mutates them.

use indexmap::{IndexMap, IndexSet};

/// Symmetric adjacency between protocol ids
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    /// Protocol -> its dependencies
    dependencies: IndexMap<String, IndexSet<String>>,
    /// Protocol -> its dependents
    dependents: IndexMap<String, IndexSet<String>>,
}

impl DependencyGraph {
    /// Create an empty graph
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `node` depends on each of `deps`, replacing earlier edges
    pub fn link(&mut self, node: &str, deps: &[String]) {
        self.unlink(node);
        if deps.is_empty() {
            return;
        }

        let forward: IndexSet<String> = deps.iter().cloned().collect();
        for dep in &forward {
            self.dependents
                .entry(dep.clone())
                .or_insert_with(IndexSet::new)
                .insert(node.to_string());
        }
        self.dependencies.insert(node.to_string(), forward);
    }

    /// Drop the forward edges of `node` and the matching reverse edges
    pub fn unlink(&mut self, node: &str) {
        let Some(deps) = self.dependencies.shift_remove(node) else {
            return;
        };
        for dep in deps {
            if let Some(set) = self.dependents.get_mut(&dep) {
                set.shift_remove(node);
                if set.is_empty() {
                    self.dependents.shift_remove(&dep);
                }
            }
        }
    }

    /// Direct dependencies of `node`
    #[must_use]
    pub fn dependencies_of(&self, node: &str) -> Vec<String> {
        self.dependencies
            .get(node)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Direct dependents of `node`, in link order
    #[must_use]
    pub fn dependents_of(&self, node: &str) -> Vec<String> {
        self.dependents
            .get(node)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether anything depends on `node`
    #[must_use]
    pub fn has_dependents(&self, node: &str) -> bool {
        self.dependents.get(node).is_some_and(|set| !set.is_empty())
    }

    /// Whether `from` reaches `to` through forward edges
    #[must_use]
    pub fn depends_on(&self, from: &str, to: &str) -> bool {
        let mut visited: IndexSet<&str> = IndexSet::new();
        let mut stack = vec![from];

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(deps) = self.dependencies.get(current) {
                for dep in deps {
                    if dep == to {
                        return true;
                    }
                    stack.push(dep.as_str());
                }
            }
        }
        false
    }

    /// First of `deps` that would close a cycle through `node`
    #[must_use]
    pub fn find_cycle<'a>(&self, node: &str, deps: &'a [String]) -> Option<&'a String> {
        deps.iter()
            .find(|dep| dep.as_str() == node || self.depends_on(dep, node))
    }

    /// Total number of edges
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.dependencies.values().map(IndexSet::len).sum()
    }

    /// Whether the graph has no edges
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Remove every edge
    pub fn clear(&mut self) {
        self.dependencies.clear();
        self.dependents.clear();
    }
}
