//! # Config Loader
//!
//! Reads `keel.toml` and turns it into a [`ProjectDefinition`]: the typed
//! [`MetadataRegistry`] holding every declared type, plus the project-level
//! settings the bootstrap needs.
//!
//! ```toml
//! [project]
//! definition = "Build"
//! classpath = ["libs/*.jar"]
//!
//! [types.Build]
//! extends = "ProjectKBean"
//! classpath = ["org.example:tool:1.0"]
//!
//! [types.Build.fields.token]
//! inject_env = "SONAR_TOKEN"
//!
//! [types.Build.actions.pack]
//! doc = "Creates the archive."
//! run = "zip -r keel-output/app.zip src"
//! ```
//!
//! Marker values are kept raw here; they are validated when a type is scanned.
//! Without a `keel.toml`, an implicit `Build` type with no markers is used.

use crate::constants::{DEFAULT_SOURCE_DIR, DEFINITION_FILENAME};
use crate::core::registry::MetadataRegistry;
use crate::errors::ConfigError;
use crate::models::{MemberDeclaration, MemberKind, TypeDeclaration};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the build-definition type when nothing is declared.
pub const IMPLICIT_DEFINITION_TYPE: &str = "Build";

// --- RAW FILE SHAPE ---

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct DefinitionFile {
    #[serde(default)]
    project: ProjectSection,
    #[serde(default)]
    compiler: CompilerSection,
    #[serde(default)]
    types: BTreeMap<String, TypeSection>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct ProjectSection {
    definition: Option<String>,
    default_kbean: Option<String>,
    source_dir: Option<String>,
    #[serde(default)]
    classpath: Vec<String>,
    #[serde(default)]
    repositories: Vec<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct CompilerSection {
    command: Option<String>,
    output_dir: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct TypeSection {
    extends: Option<String>,
    doc: Option<String>,
    hide: Option<bool>,
    #[serde(default)]
    classpath: Vec<String>,
    #[serde(default)]
    repositories: Vec<String>,
    #[serde(default)]
    compile_options: Vec<String>,
    #[serde(default)]
    requires: Vec<String>,
    #[serde(default)]
    fields: BTreeMap<String, FieldSection>,
    #[serde(default)]
    actions: BTreeMap<String, ActionSection>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct FieldSection {
    doc: Option<String>,
    hide: Option<bool>,
    inject_env: Option<String>,
}

/// `run = "cmd"` or `run = ["cmd1", "cmd2"]`.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum Lines {
    One(String),
    Many(Vec<String>),
}

impl Default for Lines {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl From<Lines> for Vec<String> {
    fn from(lines: Lines) -> Self {
        match lines {
            Lines::One(line) => vec![line],
            Lines::Many(lines) => lines,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct ActionSection {
    doc: Option<String>,
    hide: Option<bool>,
    #[serde(default)]
    run: Lines,
    #[serde(default)]
    prepare: Lines,
}

// --- LOADED PROJECT ---

/// A project's build definition, ready for the bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDefinition {
    pub root: PathBuf,
    /// The file it was read from; `None` for the implicit definition.
    pub file: Option<PathBuf>,
    pub registry: MetadataRegistry,
    pub definition_type: String,
    pub default_kbean: Option<String>,
    pub source_root: PathBuf,
    pub classpath: Vec<String>,
    pub repositories: Vec<String>,
    pub compiler_command: Option<String>,
    pub compiler_output_dir: Option<PathBuf>,
}

impl ProjectDefinition {
    /// The definition used when the project has no `keel.toml`.
    pub fn implicit(root: &Path) -> Self {
        let mut registry = MetadataRegistry::new();
        registry.register(TypeDeclaration::new(IMPLICIT_DEFINITION_TYPE));
        Self {
            root: root.to_path_buf(),
            file: None,
            registry,
            definition_type: IMPLICIT_DEFINITION_TYPE.to_string(),
            default_kbean: None,
            source_root: root.join(DEFAULT_SOURCE_DIR),
            classpath: Vec::new(),
            repositories: Vec::new(),
            compiler_command: None,
            compiler_output_dir: None,
        }
    }
}

/// Loads `<root>/keel.toml`, or the implicit definition if there is none.
pub fn load(root: &Path) -> Result<ProjectDefinition, ConfigError> {
    let path = root.join(DEFINITION_FILENAME);
    if !path.is_file() {
        log::debug!("No '{}' in '{}'; using the implicit definition.", DEFINITION_FILENAME, root.display());
        return Ok(ProjectDefinition::implicit(root));
    }
    let content = fs::read_to_string(&path).map_err(|e| ConfigError::InvalidDefinitionFile {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let mut definition = parse(&content, root, &path)?;
    definition.file = Some(path);
    Ok(definition)
}

/// Parses the content of a `keel.toml` located at `path`.
pub fn parse(content: &str, root: &Path, path: &Path) -> Result<ProjectDefinition, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidDefinitionFile {
        path: path.display().to_string(),
        reason,
    };
    let file: DefinitionFile = toml::from_str(content).map_err(|e| invalid(e.message().to_string()))?;

    let mut registry = MetadataRegistry::new();
    for (name, section) in file.types {
        registry.register(into_declaration(name, section));
    }

    let definition_type = match file.project.definition {
        Some(name) => name,
        None => {
            let names: Vec<String> = registry.names().map(str::to_string).collect();
            match names.as_slice() {
                [] => {
                    registry.register(TypeDeclaration::new(IMPLICIT_DEFINITION_TYPE));
                    IMPLICIT_DEFINITION_TYPE.to_string()
                }
                [only] => only.clone(),
                _ => {
                    return Err(invalid(
                        "several types are declared; set 'project.definition'".to_string(),
                    ));
                }
            }
        }
    };
    if !registry.contains(&definition_type) {
        return Err(ConfigError::UnknownType {
            name: definition_type,
        });
    }

    let source_root = root.join(file.project.source_dir.as_deref().unwrap_or(DEFAULT_SOURCE_DIR));
    log::debug!(
        "Loaded {} type(s) from '{}'; definition type '{}'.",
        registry.len(),
        path.display(),
        definition_type
    );

    Ok(ProjectDefinition {
        root: root.to_path_buf(),
        file: None,
        registry,
        definition_type,
        default_kbean: file.project.default_kbean,
        source_root,
        classpath: file.project.classpath,
        repositories: file.project.repositories,
        compiler_command: file.compiler.command,
        compiler_output_dir: file.compiler.output_dir.map(|dir| root.join(dir)),
    })
}

fn into_declaration(name: String, section: TypeSection) -> TypeDeclaration {
    let mut members: Vec<MemberDeclaration> = Vec::new();
    for (field, f) in section.fields {
        members.push(MemberDeclaration {
            name: field,
            kind: MemberKind::Field,
            doc: f.doc,
            hide: f.hide,
            inject_env: f.inject_env,
            run: Vec::new(),
            prepare: Vec::new(),
        });
    }
    for (action, a) in section.actions {
        members.push(MemberDeclaration {
            name: action,
            kind: MemberKind::Action,
            doc: a.doc,
            hide: a.hide,
            inject_env: None,
            run: a.run.into(),
            prepare: a.prepare.into(),
        });
    }

    TypeDeclaration {
        name,
        extends: section.extends,
        doc: section.doc,
        hide: section.hide,
        classpath: section.classpath,
        repositories: section.repositories,
        compile_options: section.compile_options,
        requires: section.requires,
        members,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"
[project]
definition = "Build"
default_kbean = "project"
classpath = ["libs/*.jar"]

[compiler]
command = "kotlinc"
output_dir = "out/classes"

[types.ProjectKBean]
doc = "Builds a project."

[types.ProjectKBean.actions.pack]
doc = "Creates the archive."
run = "zip -r app.zip src"

[types.Build]
extends = "ProjectKBean"
classpath = ["org.example:tool:1.0"]
requires = ["ProjectKBean"]

[types.Build.fields.token]
doc = "Sonar token."
inject_env = "SONAR_TOKEN"

[types.Build.actions.deploy]
run = ["echo one", "echo two"]
prepare = "echo prepare"
"#;

    #[test]
    fn test_parse_sample_definition() {
        // --- Execute ---
        let root = Path::new("/project");
        let def = parse(SAMPLE, root, &root.join("keel.toml")).unwrap();

        // --- Assert ---
        assert_eq!(def.definition_type, "Build");
        assert_eq!(def.default_kbean.as_deref(), Some("project"));
        assert_eq!(def.source_root, root.join("keel-src"));
        assert_eq!(def.compiler_output_dir, Some(root.join("out/classes")));
        assert_eq!(def.classpath, vec!["libs/*.jar"]);

        let build = def.registry.get("Build").unwrap();
        assert_eq!(build.extends.as_deref(), Some("ProjectKBean"));
        assert_eq!(
            build.find_member("token").unwrap().inject_env.as_deref(),
            Some("SONAR_TOKEN")
        );
        let deploy = build.find_member("deploy").unwrap();
        assert_eq!(deploy.kind, MemberKind::Action);
        assert_eq!(deploy.run, vec!["echo one", "echo two"]);
        assert_eq!(deploy.prepare, vec!["echo prepare"]);

        let pack = def.registry.get("ProjectKBean").unwrap().find_member("pack").unwrap();
        assert_eq!(pack.run, vec!["zip -r app.zip src"]);
    }

    #[test]
    fn test_single_type_is_the_definition() {
        let def = parse("[types.Main]\n", Path::new("/p"), Path::new("/p/keel.toml")).unwrap();
        assert_eq!(def.definition_type, "Main");
    }

    #[test]
    fn test_ambiguous_or_unknown_definition() {
        let p = Path::new("/p/keel.toml");
        assert!(matches!(
            parse("[types.A]\n[types.B]\n", Path::new("/p"), p),
            Err(ConfigError::InvalidDefinitionFile { .. })
        ));
        assert_eq!(
            parse("[project]\ndefinition = \"Ghost\"\n", Path::new("/p"), p).unwrap_err(),
            ConfigError::UnknownType {
                name: "Ghost".into()
            }
        );
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = parse("[project]\ndefinitoin = \"Build\"\n", Path::new("/p"), Path::new("/p/keel.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDefinitionFile { ref reason, .. } if reason.contains("definitoin")));
    }

    #[test]
    fn test_load_without_file_is_implicit() {
        let dir = tempdir().unwrap();
        let def = load(dir.path()).unwrap();
        assert_eq!(def.definition_type, IMPLICIT_DEFINITION_TYPE);
        assert!(def.file.is_none());
        assert!(def.registry.contains(IMPLICIT_DEFINITION_TYPE));
    }

    #[test]
    fn test_load_reads_the_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(DEFINITION_FILENAME), SAMPLE).unwrap();
        let def = load(dir.path()).unwrap();
        assert_eq!(def.file, Some(dir.path().join(DEFINITION_FILENAME)));
        assert_eq!(def.registry.len(), 2);
    }
}
