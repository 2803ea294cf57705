//! # Bootstrap Controller
//!
//! Drives one build invocation through an explicit state machine:
//!
//! ```text
//! NotBootstrapped -> LoaderInstalled -> DependenciesResolved -> ReEntered
//!     -> SettingsResolved -> Running -> Completed | Failed
//! ```
//!
//! - **install_loader**: installs the module loader in the execution context.
//!   Idempotent, an existing loader of the same variant is reused.
//! - **resolve_dependencies**: runs the requested cleanups, scans the build
//!   definition, resolves its classpath through the [`DependencyResolver`],
//!   compiles the definition sources with the [`Compiler`] and appends every
//!   produced location to the loader.
//! - **re_enter**: freezes the search path. Happens at most once per loader.
//! - **resolve_settings**: merges the two settings layers, resolves command
//!   targets and applies property injections.
//! - **run**: answers a help request, or runs the command queue.
//!
//! Every error moves the controller to `Failed`. Calling a step out of order is
//! an [`BootstrapError::InvalidTransition`].

use crate::constants::DEFAULT_SOURCE_DIR;
use crate::core::command_queue::{
    self, CommandExecutor, CommandQueue, FailureKind, QueueError, QueueOutcome, WorkspaceCleaner,
};
use crate::core::file_patterns;
use crate::core::injection::{self, EnvSnapshot};
use crate::core::markers;
use crate::core::metadata_scanner::MetadataScanner;
use crate::core::module_loader::{
    Installation, LoaderContext, LoaderStateError, LoaderVariant, ModuleLoader,
};
use crate::core::plugin_graph::PluginGraph;
use crate::core::registry::MetadataRegistry;
use crate::core::settings_resolver::{self, BehaviorSettings, CommandLine, Environment, SettingsLayer};
use crate::errors::{self, ConfigError};
use crate::models::{
    BuildMetadata, ClasspathEntry, EngineCommand, EngineCommands, Location, ModuleCoordinate,
    RepositoryRef, WorkArea, WorkAreas,
};
use anyhow::anyhow;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

// --- COLLABORATOR CONTRACTS ---

/// A coordinate the [`DependencyResolver`] could not resolve.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Could not resolve '{coordinate}': {reason}")]
pub struct ResolutionError {
    /// The coordinate as written, e.g. `group:artifact:version`.
    pub coordinate: String,
    /// Why it failed.
    pub reason: String,
}

/// Turns module coordinates into loadable locations.
pub trait DependencyResolver {
    /// Resolves `coordinates` against `repositories`, keeping their order.
    fn resolve(
        &mut self,
        repositories: &[RepositoryRef],
        coordinates: &[ModuleCoordinate],
    ) -> Result<Vec<Location>, ResolutionError>;
}

/// A failed compilation of the build definition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Compilation failed:\n{diagnostics}")]
pub struct CompilationError {
    /// Compiler output, shown to the user as-is.
    pub diagnostics: String,
}

/// Turns build-definition sources into loadable locations.
pub trait Compiler {
    /// Compiles the sources under `source_root` and returns the produced
    /// locations. A missing source root compiles to nothing.
    fn compile(
        &mut self,
        source_root: &Path,
        options: &[String],
        classpath: &[Location],
    ) -> Result<Vec<Location>, CompilationError>;
}

/// Answers command-help requests. An empty topic asks for general help.
pub trait HelpProvider {
    /// Renders help for `topic`.
    fn show_help(
        &mut self,
        topic: &str,
        registry: &MetadataRegistry,
        metadata: &BuildMetadata,
    ) -> anyhow::Result<()>;
}

/// The external collaborators of one run.
#[allow(missing_docs)]
pub struct Collaborators<'c> {
    pub resolver: &'c mut dyn DependencyResolver,
    pub compiler: &'c mut dyn Compiler,
    pub executor: &'c mut dyn CommandExecutor,
    pub cleaner: &'c mut dyn WorkspaceCleaner,
    pub help: &'c mut dyn HelpProvider,
}

// --- STATE & ERRORS ---

/// Where a [`BootstrapController`] stands. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    /// Nothing done yet.
    NotBootstrapped,
    /// A module loader is active in the context.
    LoaderInstalled,
    /// Areas cleaned, classpath resolved and the definition compiled.
    DependenciesResolved,
    /// The search path is frozen.
    ReEntered,
    /// Settings merged and command targets bound.
    SettingsResolved,
    /// Help or the command queue is running.
    Running,
    /// Terminal: the run succeeded.
    Completed,
    /// Terminal: a step failed.
    Failed,
}

impl fmt::Display for BootstrapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotBootstrapped => "NOT_BOOTSTRAPPED",
            Self::LoaderInstalled => "LOADER_INSTALLED",
            Self::DependenciesResolved => "DEPENDENCIES_RESOLVED",
            Self::ReEntered => "RE-ENTERED",
            Self::SettingsResolved => "SETTINGS_RESOLVED",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Why a bootstrap step failed.
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// The user's build definition, environment or command line is wrong.
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    /// Anything else, reported with its full cause chain.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
    /// A step was called out of order.
    #[error("Cannot move from {from} to {to}.")]
    InvalidTransition {
        /// State the controller was in.
        from: BootstrapState,
        /// State the step would have entered.
        to: BootstrapState,
    },
}

impl BootstrapError {
    /// Whether the error is caused by the user's build definition, environment
    /// or command line.
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::Configuration(_) => true,
            Self::Internal(inner) => errors::is_configuration_error(inner),
            Self::InvalidTransition { .. } => false,
        }
    }
}

// --- PLAN ---

/// Everything a run needs, gathered before the bootstrap starts.
#[derive(Debug, Clone)]
pub struct BootstrapPlan {
    /// Every declared type.
    pub registry: MetadataRegistry,
    /// The build-definition type to scan.
    pub definition_type: String,
    /// Classpath entries given on the command line, placed first.
    pub extra_classpath: Vec<String>,
    /// Project-level classpath entries, placed after the command-line ones.
    pub project_classpath: Vec<String>,
    /// Project-level repositories, placed after the scanned ones.
    pub project_repositories: Vec<String>,
    /// Default plugin when the `kbean` setting is not given.
    pub default_kbean: Option<String>,
    /// Settings given on the command line.
    pub cli: SettingsLayer<CommandLine>,
    /// Settings read from `KEEL_*` variables.
    pub env: SettingsLayer<Environment>,
    /// Commands as parsed, targets not yet bound.
    pub commands: EngineCommands,
    /// Environment captured once, used for property injection.
    pub env_snapshot: EnvSnapshot,
    /// Base of relative classpath patterns.
    pub project_root: PathBuf,
    /// Build-definition sources.
    pub source_root: PathBuf,
    /// Work and output directories.
    pub areas: WorkAreas,
    /// Variant of the loader to install.
    pub loader_variant: LoaderVariant,
}

impl BootstrapPlan {
    /// A plan with no commands, empty settings and the standard layout under
    /// `project_root`.
    pub fn new(
        registry: MetadataRegistry,
        definition_type: impl Into<String>,
        project_root: impl Into<PathBuf>,
    ) -> Self {
        let project_root = project_root.into();
        Self {
            registry,
            definition_type: definition_type.into(),
            extra_classpath: Vec::new(),
            project_classpath: Vec::new(),
            project_repositories: Vec::new(),
            default_kbean: None,
            cli: SettingsLayer::new(),
            env: SettingsLayer::new(),
            commands: EngineCommands::default(),
            env_snapshot: EnvSnapshot::new(),
            source_root: project_root.join(DEFAULT_SOURCE_DIR),
            areas: WorkAreas::under(&project_root),
            project_root,
            loader_variant: LoaderVariant::Strict,
        }
    }
}

/// How a completed run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Help was shown; no command ran.
    Help {
        /// Empty for general help.
        topic: String,
    },
    /// The queue ran to the end.
    Executed(QueueOutcome),
}

// --- CONTROLLER ---

/// Runs one build invocation against a [`LoaderContext`].
pub struct BootstrapController<'c> {
    plan: BootstrapPlan,
    context: &'c LoaderContext,
    state: BootstrapState,
    loader: Option<Arc<ModuleLoader>>,
    metadata: Option<BuildMetadata>,
    load_order: Vec<String>,
    settings: Option<BehaviorSettings>,
    commands: EngineCommands,
    cleaned: Vec<WorkArea>,
}

impl fmt::Debug for BootstrapController<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapController")
            .field("definition_type", &self.plan.definition_type)
            .field("state", &self.state)
            .finish()
    }
}

impl<'c> BootstrapController<'c> {
    /// A controller in `NotBootstrapped`.
    pub fn new(plan: BootstrapPlan, context: &'c LoaderContext) -> Self {
        Self {
            plan,
            context,
            state: BootstrapState::NotBootstrapped,
            loader: None,
            metadata: None,
            load_order: Vec::new(),
            settings: None,
            commands: EngineCommands::default(),
            cleaned: Vec::new(),
        }
    }

    /// The current state.
    pub fn state(&self) -> BootstrapState {
        self.state
    }

    /// The plan the controller was created with.
    pub fn plan(&self) -> &BootstrapPlan {
        &self.plan
    }

    /// The loader installed by [`BootstrapController::install_loader`].
    pub fn loader(&self) -> Option<&Arc<ModuleLoader>> {
        self.loader.as_ref()
    }

    /// Metadata of the build definition, once scanned.
    pub fn metadata(&self) -> Option<&BuildMetadata> {
        self.metadata.as_ref()
    }

    /// Plugins in load order, required plugins first.
    pub fn load_order(&self) -> &[String] {
        &self.load_order
    }

    /// The merged settings, from `SettingsResolved` on.
    pub fn settings(&self) -> Option<&BehaviorSettings> {
        self.settings.as_ref()
    }

    /// Commands with resolved targets and injected properties.
    pub fn commands(&self) -> &EngineCommands {
        &self.commands
    }

    fn advance(&mut self, from: BootstrapState, to: BootstrapState) -> Result<(), BootstrapError> {
        if self.state != from {
            return Err(BootstrapError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        Ok(())
    }

    fn enter(&mut self, to: BootstrapState) {
        log::debug!("Bootstrap: {} -> {}", self.state, to);
        self.state = to;
    }

    fn fail<T>(&mut self, error: impl Into<BootstrapError>) -> Result<T, BootstrapError> {
        let error = error.into();
        log::debug!("Bootstrap failed in {}: {}", self.state, error);
        self.state = BootstrapState::Failed;
        Err(error)
    }

    fn active_loader(&self) -> Result<Arc<ModuleLoader>, BootstrapError> {
        self.loader
            .clone()
            .ok_or_else(|| BootstrapError::Internal(anyhow!("No module loader installed.")))
    }

    // --- NOT_BOOTSTRAPPED -> LOADER_INSTALLED ---

    /// Installs or reuses the loader of the planned variant.
    pub fn install_loader(&mut self) -> Result<Installation, BootstrapError> {
        self.advance(BootstrapState::NotBootstrapped, BootstrapState::LoaderInstalled)?;
        let (loader, installation) = self.context.install(self.plan.loader_variant);
        self.loader = Some(loader);
        self.enter(BootstrapState::LoaderInstalled);
        Ok(installation)
    }

    // --- LOADER_INSTALLED -> DEPENDENCIES_RESOLVED ---

    /// Cleans the requested areas, then loads and compiles the build
    /// definition. Cleanup runs on help requests too.
    pub fn resolve_dependencies(
        &mut self,
        resolver: &mut dyn DependencyResolver,
        compiler: &mut dyn Compiler,
        cleaner: &mut dyn WorkspaceCleaner,
    ) -> Result<(), BootstrapError> {
        self.advance(
            BootstrapState::LoaderInstalled,
            BootstrapState::DependenciesResolved,
        )?;
        match self.load_definition(resolver, compiler, cleaner) {
            Ok(()) => {
                self.enter(BootstrapState::DependenciesResolved);
                Ok(())
            }
            Err(e) => self.fail(e),
        }
    }

    fn load_definition(
        &mut self,
        resolver: &mut dyn DependencyResolver,
        compiler: &mut dyn Compiler,
        cleaner: &mut dyn WorkspaceCleaner,
    ) -> Result<(), BootstrapError> {
        // Cleanup and compile flags; the formal merge happens after re-entry.
        let preliminary = settings_resolver::resolve(&self.plan.cli, &self.plan.env);
        self.cleaned = command_queue::clean_areas(&preliminary, &self.plan.areas, cleaner)
            .map_err(|e| BootstrapError::Internal(e.into()))?;

        let metadata = MetadataScanner::new(&self.plan.registry).scan(&self.plan.definition_type)?;
        self.load_order = PluginGraph::new(&metadata.plugin_edges).topological_order()?;
        if !self.load_order.is_empty() {
            log::debug!("Plugin load order: {}", self.load_order.join(", "));
        }

        let entries = self.classpath_entries(&metadata)?;
        let repositories = self.repositories(&metadata)?;
        let classpath = self.resolve_classpath(&entries, &repositories, resolver)?;

        let loader = self.active_loader()?;
        append_new(&loader, classpath.iter().cloned())?;

        if preliminary.skip_compile() {
            log::debug!("Compilation of '{}' skipped.", self.plan.source_root.display());
        } else {
            match compiler.compile(&self.plan.source_root, &metadata.compile_options, &classpath) {
                Ok(outputs) => {
                    append_new(&loader, outputs)?;
                }
                Err(e) if preliminary.ignore_compile_failure() => {
                    log::warn!("{} Continuing with what is already loadable.", e);
                }
                Err(e) => {
                    return Err(ConfigError::CompilationFailed {
                        source_root: self.plan.source_root.display().to_string(),
                        diagnostics: e.diagnostics,
                    }
                    .into());
                }
            }
        }

        self.metadata = Some(metadata);
        Ok(())
    }

    /// Command-line entries, then project entries, then scanned entries.
    fn classpath_entries(&self, metadata: &BuildMetadata) -> Result<Vec<ClasspathEntry>, ConfigError> {
        let parse = |origin: &str, raw: &String| {
            markers::parse_classpath_entry(raw).map_err(|reason| ConfigError::MalformedMarker {
                type_name: origin.to_string(),
                member: "classpath".to_string(),
                value: raw.clone(),
                reason,
            })
        };
        let mut entries = Vec::new();
        for raw in &self.plan.extra_classpath {
            entries.push(parse("command line", raw)?);
        }
        for raw in &self.plan.project_classpath {
            entries.push(parse("project", raw)?);
        }
        entries.extend(metadata.classpath.iter().cloned());
        Ok(entries)
    }

    /// Scanned repositories, then project repositories. Exact duplicates collapse.
    fn repositories(&self, metadata: &BuildMetadata) -> Result<Vec<RepositoryRef>, ConfigError> {
        let mut repositories = metadata.repositories.clone();
        for raw in &self.plan.project_repositories {
            let repo = markers::parse_repository(raw).map_err(|reason| {
                ConfigError::MalformedMarker {
                    type_name: "project".to_string(),
                    member: "repositories".to_string(),
                    value: raw.clone(),
                    reason,
                }
            })?;
            if !repositories.contains(&repo) {
                repositories.push(repo);
            }
        }
        Ok(repositories)
    }

    /// Resolves entries in order. Consecutive coordinates go to the resolver in
    /// one call; file patterns are expanded in place.
    fn resolve_classpath(
        &self,
        entries: &[ClasspathEntry],
        repositories: &[RepositoryRef],
        resolver: &mut dyn DependencyResolver,
    ) -> Result<Vec<Location>, ConfigError> {
        let mut locations = Vec::new();
        let mut pending: Vec<ModuleCoordinate> = Vec::new();

        let mut flush = |pending: &mut Vec<ModuleCoordinate>,
                         locations: &mut Vec<Location>|
         -> Result<(), ConfigError> {
            if pending.is_empty() {
                return Ok(());
            }
            let resolved = resolver.resolve(repositories, pending.as_slice()).map_err(|e| {
                ConfigError::UnresolvedCoordinate {
                    coordinate: e.coordinate,
                    reason: e.reason,
                }
            })?;
            log::debug!(
                "Resolved {} coordinate(s) into {} location(s).",
                pending.len(),
                resolved.len()
            );
            locations.extend(resolved);
            pending.clear();
            Ok(())
        };

        for entry in entries {
            match entry {
                ClasspathEntry::ModuleCoordinate(coordinate) => pending.push(coordinate.clone()),
                ClasspathEntry::FilePattern(pattern) => {
                    flush(&mut pending, &mut locations)?;
                    locations.extend(file_patterns::expand(&self.plan.project_root, pattern)?);
                }
            }
        }
        flush(&mut pending, &mut locations)?;
        Ok(locations)
    }

    // --- DEPENDENCIES_RESOLVED -> RE-ENTERED ---

    /// Freezes the search path. Returns `false` when the loader had already been
    /// re-entered by an earlier bootstrap, in which case nothing changes.
    pub fn re_enter(&mut self) -> Result<bool, BootstrapError> {
        self.advance(BootstrapState::DependenciesResolved, BootstrapState::ReEntered)?;
        let loader = match self.active_loader() {
            Ok(loader) => loader,
            Err(e) => return self.fail(e),
        };
        let first = !loader.is_frozen();
        if first {
            loader.freeze();
            log::debug!(
                "Re-entered with {} location(s) on the search path.",
                loader.current_locations().len()
            );
        } else {
            log::debug!("Loader already re-entered; re-entry skipped.");
        }
        self.enter(BootstrapState::ReEntered);
        Ok(first)
    }

    // --- RE-ENTERED -> SETTINGS_RESOLVED ---

    /// Merges the settings layers and binds every command to its target.
    pub fn resolve_settings(&mut self) -> Result<&BehaviorSettings, BootstrapError> {
        self.advance(BootstrapState::ReEntered, BootstrapState::SettingsResolved)?;
        let settings = settings_resolver::resolve(&self.plan.cli, &self.plan.env);

        let commands = match self.bind_commands(&settings) {
            Ok(commands) => commands,
            Err(e) => return self.fail(e),
        };
        self.commands = commands;
        self.enter(BootstrapState::SettingsResolved);
        Ok(self.settings.insert(settings))
    }

    /// Resolves each command target to a registered type name and fills the
    /// injected properties of that type.
    fn bind_commands(&self, settings: &BehaviorSettings) -> Result<EngineCommands, ConfigError> {
        let registry = &self.plan.registry;
        let default_name = settings
            .kbean()
            .or(self.plan.default_kbean.as_deref())
            .unwrap_or(&self.plan.definition_type);
        let find = |name: &str| {
            registry
                .find_plugin(name)
                .map(|declaration| declaration.name.clone())
                .ok_or_else(|| ConfigError::UnknownTarget {
                    name: name.to_string(),
                    available: registry.names().map(str::to_string).collect(),
                })
        };
        let default_target = find(default_name)?;

        let mut injected: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        let mut bound = Vec::with_capacity(self.plan.commands.len());
        for command in &self.plan.commands {
            let target = match &command.target {
                Some(name) => find(name.as_str())?,
                None => default_target.clone(),
            };
            if !injected.contains_key(&target) {
                let metadata = MetadataScanner::new(registry).scan(&target)?;
                let values = injection::resolve_injections(&metadata.injections, &self.plan.env_snapshot);
                injected.insert(target.clone(), values);
            }

            let mut resolved: EngineCommand = command.clone();
            resolved.target = Some(target.clone());
            if let Some(values) = injected.get(&target) {
                injection::apply_injections(&mut resolved, values);
            }
            bound.push(resolved);
        }
        Ok(EngineCommands::new(bound))
    }

    // --- SETTINGS_RESOLVED -> RUNNING -> COMPLETED | FAILED ---

    /// Shows help when requested, otherwise runs the bound commands in order.
    pub fn run(
        &mut self,
        executor: &mut dyn CommandExecutor,
        help: &mut dyn HelpProvider,
    ) -> Result<RunOutcome, BootstrapError> {
        self.advance(BootstrapState::SettingsResolved, BootstrapState::Running)?;
        self.enter(BootstrapState::Running);

        let result = self.run_inner(executor, help);
        match result {
            Ok(outcome) => {
                self.enter(BootstrapState::Completed);
                Ok(outcome)
            }
            Err(e) => self.fail(e),
        }
    }

    fn run_inner(
        &self,
        executor: &mut dyn CommandExecutor,
        help: &mut dyn HelpProvider,
    ) -> Result<RunOutcome, BootstrapError> {
        let settings = self
            .settings
            .as_ref()
            .ok_or_else(|| BootstrapError::Internal(anyhow!("Settings were not resolved.")))?;

        if let Some(topic) = settings.command_help() {
            if !self.commands.is_empty() {
                log::debug!(
                    "Help requested; {} queued command(s) not run.",
                    self.commands.len()
                );
            }
            let metadata = self
                .metadata
                .as_ref()
                .ok_or_else(|| BootstrapError::Internal(anyhow!("Metadata was not scanned.")))?;
            help.show_help(topic, &self.plan.registry, metadata)?;
            return Ok(RunOutcome::Help {
                topic: topic.to_string(),
            });
        }

        let queue = CommandQueue::new(self.commands.clone());
        match queue.run_commands(settings, executor) {
            Ok(outcome) => Ok(RunOutcome::Executed(QueueOutcome {
                cleaned: self.cleaned.clone(),
                ..outcome
            })),
            Err(QueueError::CommandFailed {
                index,
                command,
                source,
            }) if source.kind == FailureKind::UnknownTarget => {
                let target = self
                    .commands
                    .get(index)
                    .and_then(|c| c.target.clone())
                    .unwrap_or(command);
                let action = self
                    .commands
                    .get(index)
                    .map(|c| c.action.clone())
                    .unwrap_or_default();
                Err(ConfigError::UnknownAction { target, action }.into())
            }
            Err(e) => Err(BootstrapError::Internal(e.into())),
        }
    }

    /// Runs every remaining step.
    pub fn execute_all(
        &mut self,
        collaborators: Collaborators<'_>,
    ) -> Result<RunOutcome, BootstrapError> {
        let installation = self.install_loader()?;
        log::debug!("Loader installation: {:?}", installation);
        self.resolve_dependencies(
            collaborators.resolver,
            collaborators.compiler,
            collaborators.cleaner,
        )?;
        self.re_enter()?;
        self.resolve_settings()?;
        self.run(collaborators.executor, collaborators.help)
    }
}

/// Appends the locations not already on the search path, in order.
fn append_new<I>(loader: &ModuleLoader, locations: I) -> Result<usize, BootstrapError>
where
    I: IntoIterator<Item = Location>,
{
    let mut current = loader.current_locations();
    let fresh: Vec<Location> = locations
        .into_iter()
        .filter(|location| {
            if current.contains(location) {
                log::trace!("Location '{}' already on the search path.", location);
                false
            } else {
                current.push(location.clone());
                true
            }
        })
        .collect();
    loader.add_locations(fresh).map_err(|e| match e {
        LoaderStateError::Shadowing {
            location,
            symbol,
            resolved_from,
        } => ConfigError::ShadowedSymbol {
            location: location.to_string(),
            symbol,
            resolved_from: resolved_from.to_string(),
        }
        .into(),
        other => BootstrapError::Internal(other.into()),
    })
}
