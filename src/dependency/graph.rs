use crate::error::{Error, Result};
use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;

/// Dependency graph over registered services.
///
/// Nodes and edges keep their insertion order, so every traversal is
/// deterministic for a fixed registration order.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: IndexSet<String>,
    /// `edges[A] = [B, C]` means A depends on B and C
    edges: IndexMap<String, Vec<String>>,
    /// `reverse[A] = [B, C]` means B and C depend on A
    reverse: IndexMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a node. Only declared nodes may be the target of a resolved edge.
    pub fn add_node(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.edges.entry(name.clone()).or_default();
        self.reverse.entry(name.clone()).or_default();
        self.nodes.insert(name);
    }

    /// Add a dependency edge (`from` depends on `to`).
    ///
    /// `from` is declared if it is not already; `to` is not, so an edge to a
    /// name that is never declared surfaces as [`Error::UnknownDependency`]
    /// when the graph is sorted.
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) {
        let from = from.into();
        let to = to.into();
        self.add_node(from.clone());

        let deps = self.edges.entry(from.clone()).or_default();
        if !deps.contains(&to) {
            deps.push(to.clone());
            self.reverse.entry(to).or_default().push(from);
        }
    }

    /// Build a graph from `(name, dependencies)` pairs, in order.
    pub fn from_dependencies<'a, I, D>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, D)>,
        D: IntoIterator<Item = &'a String>,
    {
        let mut graph = Self::new();
        for (name, deps) in entries {
            graph.add_node(name);
            for dep in deps {
                graph.add_edge(name, dep.as_str());
            }
        }
        graph
    }

    pub fn contains(&self, node: &str) -> bool {
        self.nodes.contains(node)
    }

    /// Declared nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get direct dependencies of a node
    pub fn get_direct_dependencies(&self, node: &str) -> Vec<String> {
        self.edges.get(node).cloned().unwrap_or_default()
    }

    /// Get nodes that directly depend on the given node
    pub fn get_dependents(&self, node: &str) -> Vec<String> {
        self.reverse.get(node).cloned().unwrap_or_default()
    }

    /// Get all transitive dependencies of a node, dependencies first.
    pub fn get_dependencies(&self, node: &str) -> Result<Vec<String>> {
        let mut marks = HashMap::new();
        let mut order = Vec::new();
        let mut path = Vec::new();
        self.visit(node, &mut marks, &mut path, &mut order)?;
        order.retain(|n| n != node);
        Ok(order)
    }

    /// Get all transitive dependents of a node in stop order: every dependent
    /// appears before anything it depends on.
    pub fn get_all_dependents(&self, node: &str) -> Result<Vec<String>> {
        let mut affected = IndexSet::new();
        let mut stack = vec![node.to_string()];
        while let Some(current) = stack.pop() {
            for dependent in self.reverse.get(&current).into_iter().flatten() {
                if affected.insert(dependent.clone()) {
                    stack.push(dependent.clone());
                }
            }
        }

        let mut order = self.topological_sort()?;
        order.retain(|n| affected.contains(n));
        order.reverse();
        Ok(order)
    }

    /// Topological sort - returns nodes in dependency order (dependencies first).
    ///
    /// Depth-first with three-colour marking, visiting nodes and their
    /// dependencies in insertion order.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownDependency`] if an edge points at an undeclared node
    /// - [`Error::CircularDependency`] naming the node reached while still in
    ///   progress, along with the cycle path
    pub fn topological_sort(&self) -> Result<Vec<String>> {
        let mut marks = HashMap::with_capacity(self.nodes.len());
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut path = Vec::new();

        for node in &self.nodes {
            self.visit(node, &mut marks, &mut path, &mut order)?;
        }

        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        node: &'a str,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
        order: &mut Vec<String>,
    ) -> Result<()> {
        match marks.get(node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => {
                let start = path.iter().position(|n| *n == node).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
                cycle.push(node.to_string());
                return Err(Error::CircularDependency {
                    service: node.to_string(),
                    cycle,
                });
            }
            None => {}
        }

        marks.insert(node, Mark::InProgress);
        path.push(node);

        if let Some(deps) = self.edges.get(node) {
            for dep in deps {
                if !self.nodes.contains(dep) {
                    return Err(Error::UnknownDependency {
                        service: node.to_string(),
                        dependency: dep.clone(),
                    });
                }
                self.visit(dep, marks, path, order)?;
            }
        }

        path.pop();
        marks.insert(node, Mark::Done);
        order.push(node.to_string());
        Ok(())
    }

    /// Get groups of nodes that can be started in parallel.
    ///
    /// A node's group is one past the deepest group among its dependencies,
    /// so every dependency lands in an earlier group. Members keep their
    /// topological order.
    pub fn get_parallel_groups(&self) -> Result<Vec<Vec<String>>> {
        let order = self.topological_sort()?;

        let mut levels: HashMap<&str, usize> = HashMap::with_capacity(order.len());
        let mut groups: Vec<Vec<String>> = Vec::new();

        for node in &order {
            let level = self
                .edges
                .get(node.as_str())
                .into_iter()
                .flatten()
                .filter_map(|dep| levels.get(dep.as_str()))
                .map(|l| l + 1)
                .max()
                .unwrap_or(0);
            levels.insert(node.as_str(), level);

            if groups.len() <= level {
                groups.resize_with(level + 1, Vec::new);
            }
            groups[level].push(node.clone());
        }

        Ok(groups)
    }

    /// Check if the graph has any cycles
    pub fn has_cycle(&self) -> bool {
        matches!(
            self.topological_sort(),
            Err(Error::CircularDependency { .. })
        )
    }
}
