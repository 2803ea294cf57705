// src/cli/dispatcher.rs

use crate::constants::{ENV_ARGS, ENV_CLASSPATH, ENV_OUTPUT_DIR, ENV_PROP_PREFIX};
use crate::core::command_queue::{CommandExecutor, CommandFailure, FailureKind};
use crate::core::module_loader::LoaderContext;
use crate::core::registry::MetadataRegistry;
use crate::core::settings_resolver::BehaviorSettings;
use crate::models::{EngineCommand, Location, MemberDeclaration, MemberKind, WorkAreas};
use crate::system::executor;
use colored::Colorize;
use std::collections::BTreeMap;
use std::path::PathBuf;

// --- Built-in actions ---

/// An action available on every plugin.
struct BuiltinDefinition {
    name: &'static str,
    aliases: &'static [&'static str],
    handler: fn(&ActionDispatcher<'_>, &EngineCommand, &BehaviorSettings) -> Result<(), CommandFailure>,
}

static BUILTIN_REGISTRY: &[BuiltinDefinition] = &[
    BuiltinDefinition {
        name: "info",
        aliases: &[],
        handler: builtin_info,
    },
    BuiltinDefinition {
        name: "locations",
        aliases: &["classpath"],
        handler: builtin_locations,
    },
];

fn find_builtin(name: &str) -> Option<&'static BuiltinDefinition> {
    BUILTIN_REGISTRY
        .iter()
        .find(|b| b.name == name || b.aliases.contains(&name))
}

/// Names of the built-in actions, for help output.
pub fn builtin_names() -> impl Iterator<Item = &'static str> {
    BUILTIN_REGISTRY.iter().map(|b| b.name)
}

/// Runs commands: scripted actions declared in `keel.toml` first, then the
/// built-in actions.
pub struct ActionDispatcher<'a> {
    registry: &'a MetadataRegistry,
    context: &'a LoaderContext,
    project_root: PathBuf,
    areas: WorkAreas,
}

impl<'a> ActionDispatcher<'a> {
    pub fn new(
        registry: &'a MetadataRegistry,
        context: &'a LoaderContext,
        project_root: PathBuf,
        areas: WorkAreas,
    ) -> Self {
        Self {
            registry,
            context,
            project_root,
            areas,
        }
    }

    fn locations(&self) -> Vec<Location> {
        self.context
            .active()
            .map(|loader| loader.current_locations())
            .unwrap_or_default()
    }

    /// The most-derived declaration of `action` on the command's target.
    fn scripted_action(&self, command: &EngineCommand) -> Option<&'a MemberDeclaration> {
        let target = command.target.as_deref()?;
        let chain = self.registry.type_chain(target).ok()?;
        chain
            .into_iter()
            .filter_map(|declaration| declaration.find_member(&command.action))
            .find(|member| member.kind == MemberKind::Action)
    }

    fn script_env(&self, command: &EngineCommand) -> Result<BTreeMap<String, String>, CommandFailure> {
        let classpath = std::env::join_paths(self.locations().iter().map(Location::path))
            .map_err(|e| CommandFailure::action(format!("Classpath cannot be exported: {}", e)))?;
        let args = shlex::try_join(command.positional.iter().map(String::as_str))
            .map_err(|e| CommandFailure::action(format!("Arguments cannot be quoted: {}", e)))?;

        let mut env: BTreeMap<String, String> = command
            .named
            .iter()
            .map(|(key, value)| (property_var(key), value.clone()))
            .collect();
        env.insert(ENV_CLASSPATH.to_string(), classpath.to_string_lossy().into_owned());
        env.insert(ENV_OUTPUT_DIR.to_string(), self.areas.output.display().to_string());
        env.insert(ENV_ARGS.to_string(), args);
        Ok(env)
    }

    fn run_lines(
        &self,
        command: &EngineCommand,
        lines: &[String],
        kind: FailureKind,
    ) -> Result<(), CommandFailure> {
        if lines.is_empty() {
            return Ok(());
        }
        let env = self.script_env(command)?;
        for line in lines {
            executor::execute_command(line, &self.project_root, &env)
                .map_err(|e| CommandFailure::new(kind, e.to_string()))?;
        }
        Ok(())
    }
}

/// `KEEL_PROP_<KEY>`, upper-cased with separators turned into `_`.
pub fn property_var(key: &str) -> String {
    let normalized: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("{}{}", ENV_PROP_PREFIX, normalized)
}

impl CommandExecutor for ActionDispatcher<'_> {
    fn prepare(
        &mut self,
        command: &EngineCommand,
        _settings: &BehaviorSettings,
    ) -> Result<(), CommandFailure> {
        match self.scripted_action(command) {
            Some(action) => self.run_lines(command, &action.prepare, FailureKind::Compilation),
            None => Ok(()),
        }
    }

    fn execute(
        &mut self,
        command: &EngineCommand,
        settings: &BehaviorSettings,
    ) -> Result<(), CommandFailure> {
        if let Some(action) = self.scripted_action(command) {
            log::debug!("Running scripted action '{}'.", command);
            return self.run_lines(command, &action.run, FailureKind::Action);
        }
        if let Some(builtin) = find_builtin(&command.action) {
            return (builtin.handler)(self, command, settings);
        }
        Err(CommandFailure::new(
            FailureKind::UnknownTarget,
            format!("no action '{}' on '{}'", command.action, command.target.as_deref().unwrap_or("?")),
        ))
    }
}

fn builtin_info(
    dispatcher: &ActionDispatcher<'_>,
    command: &EngineCommand,
    settings: &BehaviorSettings,
) -> Result<(), CommandFailure> {
    let target = command.target.as_deref().unwrap_or_default();
    let hierarchy: Vec<&str> = dispatcher
        .registry
        .type_chain(target)
        .map(|chain| chain.iter().map(|d| d.name.as_str()).collect())
        .unwrap_or_default();

    println!("\n--- {} '{}' ---", t!("info.header"), target.yellow());
    println!(
        "  {:<15} {}",
        t!("info.label.inheritance").blue(),
        hierarchy.join(" -> ").dimmed()
    );
    println!(
        "  {:<15} {}",
        t!("info.label.root_path").blue(),
        dispatcher.project_root.display()
    );
    println!(
        "  {:<15} {}",
        t!("info.label.locations").blue(),
        dispatcher.locations().len()
    );
    println!(
        "  {:<15} {}",
        t!("info.label.skip_compile").blue(),
        settings.skip_compile()
    );
    println!(
        "  {:<15} {}",
        t!("info.label.ignore_failure").blue(),
        settings.ignore_compile_failure()
    );
    Ok(())
}

fn builtin_locations(
    dispatcher: &ActionDispatcher<'_>,
    _command: &EngineCommand,
    _settings: &BehaviorSettings,
) -> Result<(), CommandFailure> {
    let locations = dispatcher.locations();
    if locations.is_empty() {
        println!("{}", t!("locations.empty").dimmed());
    }
    for (i, location) in locations.iter().enumerate() {
        println!("  {:>3}. {}", i + 1, location);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::module_loader::LoaderVariant;
    use crate::models::TypeDeclaration;
    use std::path::Path;

    fn registry() -> MetadataRegistry {
        let mut registry = MetadataRegistry::new();
        registry
            .register(TypeDeclaration::new("Base").member(
                MemberDeclaration::action("pack").with_run(&["- false"]),
            ))
            .register(
                TypeDeclaration::new("Build")
                    .extends("Base")
                    .member(MemberDeclaration::field("pack"))
                    .member(MemberDeclaration::action("deploy")),
            );
        registry
    }

    #[test]
    fn test_scripted_action_is_found_through_the_chain() {
        let registry = registry();
        let context = LoaderContext::new();
        let dispatcher = ActionDispatcher::new(
            &registry,
            &context,
            PathBuf::from("/p"),
            WorkAreas::under(Path::new("/p")),
        );

        // A field of the same name does not hide the inherited action.
        let pack = dispatcher
            .scripted_action(&EngineCommand::new(Some("Build"), "pack"))
            .unwrap();
        assert_eq!(pack.run, vec!["- false"]);
        assert!(
            dispatcher
                .scripted_action(&EngineCommand::new(Some("Build"), "missing"))
                .is_none()
        );
    }

    #[test]
    fn test_unknown_action_is_reported_as_unknown_target() {
        let registry = registry();
        let context = LoaderContext::new();
        let mut dispatcher = ActionDispatcher::new(
            &registry,
            &context,
            PathBuf::from("/p"),
            WorkAreas::under(Path::new("/p")),
        );
        let failure = dispatcher
            .execute(
                &EngineCommand::new(Some("Build"), "missing"),
                &BehaviorSettings::default(),
            )
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::UnknownTarget);
    }

    #[test]
    fn test_builtins_and_env() {
        let registry = registry();
        let context = LoaderContext::new();
        let (loader, _) = context.install(LoaderVariant::Relaxed);
        loader.add_location(Location::new("/repo/a.jar")).unwrap();
        let mut dispatcher = ActionDispatcher::new(
            &registry,
            &context,
            PathBuf::from("/p"),
            WorkAreas::under(Path::new("/p")),
        );

        assert!(find_builtin("classpath").is_some());
        assert!(
            dispatcher
                .execute(&EngineCommand::new(Some("Build"), "locations"), &BehaviorSettings::default())
                .is_ok()
        );

        let mut command = EngineCommand::new(Some("Build"), "deploy");
        command.named.insert("target-env".into(), "prod".into());
        command.positional = vec!["a b".into()];
        let env = dispatcher.script_env(&command).unwrap();
        assert_eq!(env["KEEL_PROP_TARGET_ENV"], "prod");
        assert_eq!(env["KEEL_CLASSPATH"], "/repo/a.jar");
        assert_eq!(env["KEEL_ARGS"], "'a b'");
    }
}
