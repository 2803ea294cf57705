// src/models.rs

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

// --- LOCATIONS ---

/// An opaque reference to a code/resource container (a directory or an archive)
/// that a module loader can search for symbols.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location(PathBuf);

impl Location {
    /// Wraps a filesystem path as a location.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// The path this location points to.
    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl From<PathBuf> for Location {
    fn from(path: PathBuf) -> Self {
        Self(path)
    }
}

impl From<&Path> for Location {
    fn from(path: &Path) -> Self {
        Self(path.to_path_buf())
    }
}

// --- BUILD METADATA (what the scanner produces) ---

/// A `group:artifact[:version]` module coordinate. A missing version means
/// "unspecified" and is left to the dependency resolver.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleCoordinate {
    pub group: String,
    pub artifact: String,
    pub version: Option<String>,
}

impl fmt::Display for ModuleCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}:{}:{}", self.group, self.artifact, v),
            None => write!(f, "{}:{}", self.group, self.artifact),
        }
    }
}

/// One classpath contribution. Declaration order is significant.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClasspathEntry {
    ModuleCoordinate(ModuleCoordinate),
    /// A glob relative to the project root.
    FilePattern(String),
}

impl ClasspathEntry {
    /// Returns the coordinate if this entry is a module coordinate.
    pub fn as_coordinate(&self) -> Option<&ModuleCoordinate> {
        match self {
            Self::ModuleCoordinate(c) => Some(c),
            Self::FilePattern(_) => None,
        }
    }
}

impl fmt::Display for ClasspathEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModuleCoordinate(c) => write!(f, "{}", c),
            Self::FilePattern(p) => write!(f, "{}", p),
        }
    }
}

/// A URL or identifier naming a source from which coordinates are resolved.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryRef(pub String);

impl RepositoryRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Binds an environment variable to a field of a build-definition type.
/// Resolution of the actual value is deferred to the environment reader.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyInjection {
    /// The field receiving the value.
    pub target: String,
    /// The environment variable supplying it.
    pub env_var: String,
    /// The type whose declaration carried the marker.
    pub declared_on: String,
}

/// `plugin -> required`: `plugin` cannot run without `required` being loaded.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginDependencyEdge {
    pub plugin: String,
    pub required: String,
}

impl PluginDependencyEdge {
    pub fn new(plugin: impl Into<String>, required: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            required: required.into(),
        }
    }
}

/// Help text and visibility of a type or member.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct DocEntry {
    pub text: Option<String>,
    pub hidden: bool,
}

/// The merged metadata of one build-definition type and its ancestors.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildMetadata {
    /// The scanned type.
    pub type_name: String,
    /// The scanned type followed by its ancestors, most-derived first.
    pub hierarchy: Vec<String>,
    /// Documentation of the type itself.
    pub doc: DocEntry,
    pub classpath: Vec<ClasspathEntry>,
    pub repositories: Vec<RepositoryRef>,
    pub compile_options: Vec<String>,
    pub injections: BTreeSet<PropertyInjection>,
    pub plugin_edges: BTreeSet<PluginDependencyEdge>,
    /// Member name -> documentation.
    pub documentation: BTreeMap<String, DocEntry>,
}

impl BuildMetadata {
    /// Classpath entries that must go through the dependency resolver.
    pub fn coordinates(&self) -> impl Iterator<Item = &ModuleCoordinate> {
        self.classpath.iter().filter_map(ClasspathEntry::as_coordinate)
    }
}

// --- TYPE REGISTRY (what the user declares) ---

/// Whether a member is a settable field or an invocable action.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Field,
    Action,
}

/// The markers carried by one member of a build-definition type.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MemberDeclaration {
    pub name: String,
    pub kind: MemberKind,
    pub doc: Option<String>,
    pub hide: Option<bool>,
    /// Property-injection marker: the environment variable feeding this field.
    pub inject_env: Option<String>,
    /// Command lines run when the action is invoked.
    pub run: Vec<String>,
    /// Command lines run before the action, unless compilation is skipped.
    pub prepare: Vec<String>,
}

impl MemberDeclaration {
    pub fn field(name: impl Into<String>) -> Self {
        Self::new(name, MemberKind::Field)
    }

    pub fn action(name: impl Into<String>) -> Self {
        Self::new(name, MemberKind::Action)
    }

    fn new(name: impl Into<String>, kind: MemberKind) -> Self {
        Self {
            name: name.into(),
            kind,
            doc: None,
            hide: None,
            inject_env: None,
            run: Vec::new(),
            prepare: Vec::new(),
        }
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn hidden(mut self, hide: bool) -> Self {
        self.hide = Some(hide);
        self
    }

    pub fn with_injection(mut self, env_var: impl Into<String>) -> Self {
        self.inject_env = Some(env_var.into());
        self
    }

    pub fn with_run(mut self, lines: &[&str]) -> Self {
        self.run = lines.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// The declarative markers of one build-definition or plugin type, as raw
/// values. They are validated when the type is scanned.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeDeclaration {
    pub name: String,
    pub extends: Option<String>,
    pub doc: Option<String>,
    pub hide: Option<bool>,
    pub classpath: Vec<String>,
    pub repositories: Vec<String>,
    pub compile_options: Vec<String>,
    pub requires: Vec<String>,
    pub members: Vec<MemberDeclaration>,
}

impl TypeDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.extends = Some(parent.into());
        self
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn hidden(mut self, hide: bool) -> Self {
        self.hide = Some(hide);
        self
    }

    pub fn classpath(mut self, entry: impl Into<String>) -> Self {
        self.classpath.push(entry.into());
        self
    }

    pub fn repository(mut self, repo: impl Into<String>) -> Self {
        self.repositories.push(repo.into());
        self
    }

    pub fn compile_option(mut self, option: impl Into<String>) -> Self {
        self.compile_options.push(option.into());
        self
    }

    pub fn requires(mut self, plugin: impl Into<String>) -> Self {
        self.requires.push(plugin.into());
        self
    }

    pub fn member(mut self, member: MemberDeclaration) -> Self {
        self.members.push(member);
        self
    }

    /// Finds a member declared directly on this type.
    pub fn find_member(&self, name: &str) -> Option<&MemberDeclaration> {
        self.members.iter().find(|m| m.name == name)
    }
}

// --- COMMANDS ---

/// One resolvable unit of work: an action invoked on a plugin.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineCommand {
    /// The plugin name as typed by the user. `None` targets the default KBean.
    pub target: Option<String>,
    pub action: String,
    pub positional: Vec<String>,
    pub named: BTreeMap<String, String>,
}

impl EngineCommand {
    pub fn new(target: Option<&str>, action: impl Into<String>) -> Self {
        Self {
            target: target.map(str::to_string),
            action: action.into(),
            ..Default::default()
        }
    }
}

impl fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(target) = &self.target {
            write!(f, "{}:", target)?;
        }
        write!(f, "{}", self.action)
    }
}

/// The ordered, immutable sequence of commands consumed by the command queue.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineCommands(Vec<EngineCommand>);

impl EngineCommands {
    pub fn new(commands: Vec<EngineCommand>) -> Self {
        Self(commands)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&EngineCommand> {
        self.0.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EngineCommand> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a EngineCommands {
    type Item = &'a EngineCommand;
    type IntoIter = std::slice::Iter<'a, EngineCommand>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<EngineCommand> for EngineCommands {
    fn from_iter<I: IntoIterator<Item = EngineCommand>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// --- WORK AREAS ---

/// The persisted areas a run may clean before executing commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkArea {
    Work,
    Output,
}

/// Opaque handles on the work and output directories of a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkAreas {
    pub work: PathBuf,
    pub output: PathBuf,
}

impl WorkAreas {
    /// Standard areas under a project root.
    pub fn under(project_root: &Path) -> Self {
        Self {
            work: project_root.join(crate::constants::WORK_DIR),
            output: project_root.join(crate::constants::OUTPUT_DIR),
        }
    }

    pub fn path(&self, area: WorkArea) -> &Path {
        match area {
            WorkArea::Work => &self.work,
            WorkArea::Output => &self.output,
        }
    }
}
