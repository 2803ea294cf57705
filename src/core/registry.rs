// src/core/registry.rs

use crate::constants::KBEAN_SUFFIX;
use crate::errors::ConfigError;
use crate::models::TypeDeclaration;
use std::collections::BTreeMap;

/// The typed metadata registry: type name -> declared markers.
///
/// Populated either programmatically with [`MetadataRegistry::register`] or from
/// a `keel.toml` file by the definition loader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataRegistry {
    types: BTreeMap<String, TypeDeclaration>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type, replacing any previous declaration with the same name.
    pub fn register(&mut self, declaration: TypeDeclaration) -> &mut Self {
        if self.types.contains_key(&declaration.name) {
            log::debug!("Type '{}' re-registered.", declaration.name);
        }
        self.types.insert(declaration.name.clone(), declaration);
        self
    }

    pub fn get(&self, name: &str) -> Option<&TypeDeclaration> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Registered type names, alphabetically.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// The type followed by its ancestors, most-derived first.
    pub fn type_chain(&self, name: &str) -> Result<Vec<&TypeDeclaration>, ConfigError> {
        let mut chain: Vec<&TypeDeclaration> = Vec::new();
        let mut current = Some(name);

        while let Some(type_name) = current {
            let declaration = self.types.get(type_name).ok_or_else(|| {
                ConfigError::UnknownType {
                    name: type_name.to_string(),
                }
            })?;
            if chain.iter().any(|d| d.name == declaration.name) {
                let mut names: Vec<String> = chain.iter().map(|d| d.name.clone()).collect();
                names.push(declaration.name.clone());
                return Err(ConfigError::InheritanceCycle {
                    type_name: name.to_string(),
                    chain: names,
                });
            }
            chain.push(declaration);
            current = declaration.extends.as_deref();
        }
        Ok(chain)
    }

    /// Finds the registered type a user-typed plugin name refers to.
    ///
    /// An exact match wins. Otherwise the first letter's case is ignored and a
    /// trailing `KBean` suffix may be omitted, so `project` finds `ProjectKBean`.
    pub fn find_plugin(&self, name: &str) -> Option<&TypeDeclaration> {
        if let Some(exact) = self.types.get(name) {
            return Some(exact);
        }
        self.types
            .values()
            .find(|declaration| plugin_name_matches(&declaration.name, name))
    }
}

/// Loose plugin-name matching used on command-line targets.
pub fn plugin_name_matches(type_name: &str, candidate: &str) -> bool {
    if candidate.is_empty() {
        return false;
    }
    let short = type_name.strip_suffix(KBEAN_SUFFIX).unwrap_or(type_name);
    [type_name, short]
        .iter()
        .any(|form| !form.is_empty() && eq_ignoring_first_case(form, candidate))
}

fn eq_ignoring_first_case(a: &str, b: &str) -> bool {
    let mut a_chars = a.chars();
    let mut b_chars = b.chars();
    match (a_chars.next(), b_chars.next()) {
        (Some(x), Some(y)) => {
            x.to_lowercase().eq(y.to_lowercase()) && a_chars.as_str() == b_chars.as_str()
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> MetadataRegistry {
        let mut registry = MetadataRegistry::new();
        registry
            .register(TypeDeclaration::new("Base"))
            .register(TypeDeclaration::new("ProjectKBean").extends("Base"))
            .register(TypeDeclaration::new("MyBuild").extends("ProjectKBean"));
        registry
    }

    #[test]
    fn test_type_chain_is_most_derived_first() {
        let registry = registry();
        let chain: Vec<&str> = registry
            .type_chain("MyBuild")
            .unwrap()
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(chain, vec!["MyBuild", "ProjectKBean", "Base"]);
    }

    #[test]
    fn test_type_chain_reports_unknown_ancestor() {
        let mut registry = registry();
        registry.register(TypeDeclaration::new("Orphan").extends("Missing"));
        assert_eq!(
            registry.type_chain("Orphan").unwrap_err(),
            ConfigError::UnknownType {
                name: "Missing".into()
            }
        );
    }

    #[test]
    fn test_type_chain_detects_inheritance_loops() {
        let mut registry = MetadataRegistry::new();
        registry
            .register(TypeDeclaration::new("A").extends("B"))
            .register(TypeDeclaration::new("B").extends("A"));
        let err = registry.type_chain("A").unwrap_err();
        assert!(matches!(err, ConfigError::InheritanceCycle { ref chain, .. } if chain.len() == 3));
    }

    #[test]
    fn test_plugin_name_matching() {
        assert!(plugin_name_matches("ProjectKBean", "ProjectKBean"));
        assert!(plugin_name_matches("ProjectKBean", "projectKBean"));
        assert!(plugin_name_matches("ProjectKBean", "project"));
        assert!(plugin_name_matches("ProjectKBean", "Project"));
        assert!(!plugin_name_matches("ProjectKBean", "PROJECT"));
        assert!(!plugin_name_matches("ProjectKBean", "proj"));
        assert!(!plugin_name_matches("KBean", ""));
    }

    #[test]
    fn test_find_plugin_prefers_exact_name() {
        let mut registry = registry();
        registry.register(TypeDeclaration::new("project"));
        assert_eq!(registry.find_plugin("project").unwrap().name, "project");
        assert_eq!(
            registry.find_plugin("Project").unwrap().name,
            "ProjectKBean"
        );
    }
}
