// src/core/plugin_graph.rs

use crate::errors::ConfigError;
use crate::models::PluginDependencyEdge;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Adjacency view over a set of plugin dependency edges. Iteration order is
/// alphabetical everywhere, so results are deterministic.
#[derive(Debug, Default)]
pub struct PluginGraph<'a> {
    adjacency: BTreeMap<&'a str, BTreeSet<&'a str>>,
}

impl<'a> PluginGraph<'a> {
    pub fn new<I>(edges: I) -> Self
    where
        I: IntoIterator<Item = &'a PluginDependencyEdge>,
    {
        let mut adjacency: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for edge in edges {
            adjacency
                .entry(edge.plugin.as_str())
                .or_default()
                .insert(edge.required.as_str());
            adjacency.entry(edge.required.as_str()).or_default();
        }
        Self { adjacency }
    }

    /// Fails with the members of the first cycle found, in traversal order.
    pub fn check_acyclic(&self) -> Result<(), ConfigError> {
        self.topological_order().map(|_| ())
    }

    /// Every plugin, required plugins before the plugins requiring them.
    pub fn topological_order(&self) -> Result<Vec<String>, ConfigError> {
        let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();
        let mut order = Vec::with_capacity(self.adjacency.len());
        let mut path = Vec::new();

        for node in self.adjacency.keys() {
            self.visit(*node, &mut marks, &mut path, &mut order)?;
        }
        Ok(order)
    }

    fn visit(
        &self,
        node: &'a str,
        marks: &mut BTreeMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
        order: &mut Vec<String>,
    ) -> Result<(), ConfigError> {
        match marks.get(node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = path.iter().position(|n| *n == node).unwrap_or(0);
                let members = path
                    .get(start..)
                    .unwrap_or_default()
                    .iter()
                    .map(|n| n.to_string())
                    .collect();
                return Err(ConfigError::DependencyCycle { members });
            }
            None => {}
        }

        marks.insert(node, Mark::Visiting);
        path.push(node);
        if let Some(required) = self.adjacency.get(node) {
            for next in required {
                self.visit(*next, marks, path, order)?;
            }
        }
        path.pop();
        marks.insert(node, Mark::Done);
        order.push(node.to_string());
        Ok(())
    }
}

/// Rejects an edge set containing a cycle.
pub fn validate_acyclic<'a, I>(edges: I) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = &'a PluginDependencyEdge>,
{
    PluginGraph::new(edges).check_acyclic()
}
