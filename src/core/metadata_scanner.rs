//! # Metadata Scanner
//!
//! Merges the markers declared on a build-definition type and its ancestors into
//! one [`BuildMetadata`] record.
//!
//! The walk goes most-derived to least-derived:
//!
//! - **Singular markers** (documentation text, hide flag) are first-wins: an
//!   ancestor only fills what no more-derived type has set.
//! - **Repeatable markers** (classpath, repositories, compile options) accumulate
//!   in declaration order, the scanned type's own declarations first, then each
//!   ancestor in turn.
//! - **Property injections** are recorded per field, the most-derived declaration
//!   of a field winning. Values are not read here.
//! - **Plugin requirements** become one edge per required type. The edges of every
//!   reachable plugin are collected and checked for cycles once the walk is over.
//!
//! Malformed values are configuration errors naming the type and member; nothing
//! is silently dropped.

use crate::core::markers;
use crate::core::plugin_graph::PluginGraph;
use crate::core::registry::MetadataRegistry;
use crate::errors::ConfigError;
use crate::models::{
    BuildMetadata, DocEntry, PluginDependencyEdge, PropertyInjection, TypeDeclaration,
};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

/// Scans types registered in a [`MetadataRegistry`].
#[derive(Debug, Clone, Copy)]
pub struct MetadataScanner<'a> {
    registry: &'a MetadataRegistry,
}

impl<'a> MetadataScanner<'a> {
    pub fn new(registry: &'a MetadataRegistry) -> Self {
        Self { registry }
    }

    /// Produces the merged metadata of `type_name`.
    pub fn scan(&self, type_name: &str) -> Result<BuildMetadata, ConfigError> {
        let chain = self.registry.type_chain(type_name)?;
        log::debug!(
            "Scanning '{}' through {} type(s).",
            type_name,
            chain.len()
        );

        let mut metadata = BuildMetadata {
            type_name: type_name.to_string(),
            hierarchy: chain.iter().map(|d| d.name.clone()).collect(),
            ..Default::default()
        };
        let mut doc_text: Option<String> = None;
        let mut doc_hidden: Option<bool> = None;
        let mut injected_targets: HashSet<String> = HashSet::new();
        let mut member_docs: BTreeMap<String, (Option<String>, Option<bool>)> = BTreeMap::new();

        for declaration in &chain {
            // --- Singular markers: first-wins ---
            if doc_text.is_none() {
                doc_text.clone_from(&declaration.doc);
            }
            if doc_hidden.is_none() {
                doc_hidden = declaration.hide;
            }

            // --- Repeatable markers: accumulate ---
            collect_repeatables(declaration, &mut metadata)?;

            // --- Members: docs and injections ---
            for member in &declaration.members {
                let (text, hidden) = member_docs.entry(member.name.clone()).or_default();
                if text.is_none() {
                    text.clone_from(&member.doc);
                }
                if hidden.is_none() {
                    *hidden = member.hide;
                }

                if let Some(raw) = &member.inject_env {
                    if injected_targets.contains(&member.name) {
                        continue;
                    }
                    let env_var = markers::parse_env_var_name(raw)
                        .map_err(|reason| malformed(declaration, &member.name, raw, reason))?;
                    injected_targets.insert(member.name.clone());
                    metadata.injections.insert(PropertyInjection {
                        target: member.name.clone(),
                        env_var,
                        declared_on: declaration.name.clone(),
                    });
                }
            }

            // --- Plugin requirements ---
            metadata
                .plugin_edges
                .extend(requirement_edges(declaration)?);
        }

        metadata.doc = DocEntry {
            text: doc_text,
            hidden: doc_hidden.unwrap_or(false),
        };
        metadata.documentation = member_docs
            .into_iter()
            .map(|(name, (text, hidden))| {
                let entry = DocEntry {
                    text,
                    hidden: hidden.unwrap_or(false),
                };
                (name, entry)
            })
            .collect();

        self.collect_transitive_edges(&mut metadata.plugin_edges)?;
        PluginGraph::new(&metadata.plugin_edges).check_acyclic()?;

        Ok(metadata)
    }

    /// Adds the requirement edges of every plugin reachable from `edges`.
    fn collect_transitive_edges(
        &self,
        edges: &mut BTreeSet<PluginDependencyEdge>,
    ) -> Result<(), ConfigError> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<(String, String)> = edges
            .iter()
            .map(|e| (e.plugin.clone(), e.required.clone()))
            .collect();

        while let Some((requester, required)) = queue.pop_front() {
            if !visited.insert(required.clone()) {
                continue;
            }
            let chain = self.registry.type_chain(&required).map_err(|e| match e {
                ConfigError::UnknownType { name } if name == required => {
                    ConfigError::UnknownPlugin {
                        type_name: requester.clone(),
                        required: name,
                    }
                }
                other => other,
            })?;
            for declaration in chain {
                for edge in requirement_edges(declaration)? {
                    if edges.insert(edge.clone()) {
                        queue.push_back((edge.plugin, edge.required));
                    }
                }
            }
        }
        Ok(())
    }
}

fn collect_repeatables(
    declaration: &TypeDeclaration,
    metadata: &mut BuildMetadata,
) -> Result<(), ConfigError> {
    for raw in &declaration.classpath {
        let entry = markers::parse_classpath_entry(raw)
            .map_err(|reason| malformed(declaration, "classpath", raw, reason))?;
        metadata.classpath.push(entry);
    }
    for raw in &declaration.repositories {
        let repo = markers::parse_repository(raw)
            .map_err(|reason| malformed(declaration, "repositories", raw, reason))?;
        // Only exact duplicates collapse.
        if !metadata.repositories.contains(&repo) {
            metadata.repositories.push(repo);
        }
    }
    for raw in &declaration.compile_options {
        let tokens = markers::parse_compile_option(raw)
            .map_err(|reason| malformed(declaration, "compile_options", raw, reason))?;
        metadata.compile_options.extend(tokens);
    }
    Ok(())
}

fn requirement_edges(
    declaration: &TypeDeclaration,
) -> Result<Vec<PluginDependencyEdge>, ConfigError> {
    declaration
        .requires
        .iter()
        .map(|raw| {
            markers::parse_required_plugin(raw)
                .map(|required| PluginDependencyEdge::new(declaration.name.clone(), required))
                .map_err(|reason| malformed(declaration, "requires", raw, reason))
        })
        .collect()
}

fn malformed(
    declaration: &TypeDeclaration,
    member: &str,
    value: &str,
    reason: String,
) -> ConfigError {
    ConfigError::MalformedMarker {
        type_name: declaration.name.clone(),
        member: member.to_string(),
        value: value.to_string(),
        reason,
    }
}
