// src/bin/keel.rs

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use keel::{
    cli::{Cli, dispatcher::ActionDispatcher, help::HelpRenderer},
    core::{
        bootstrap::{BootstrapController, BootstrapPlan, Collaborators, RunOutcome},
        config_loader, injection,
        module_loader::LoaderContext,
        paths,
    },
    errors,
    system::{compiler::CommandCompiler, environment, resolver::LayoutResolver, workspace::FsCleaner},
    t,
};
use std::env;
use std::path::PathBuf;

/// Sets up logging, runs the bootstrap and reports errors by class.
fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if let Err(e) = run_cli(cli) {
        if errors::is_configuration_error(&e) {
            eprintln!("\n{}: {}", t!("error.config").red().bold(), e);
        } else {
            eprintln!("\n{}: {:?}", t!("error.internal").red().bold(), e);
        }
        std::process::exit(1);
    }
}

fn project_root(cli: &Cli) -> Result<PathBuf> {
    if let Some(root) = &cli.root {
        return dunce::canonicalize(root)
            .with_context(|| format!("Project root '{}' is not accessible", root.display()));
    }
    let cwd = env::current_dir().context("Failed to read the current directory")?;
    match paths::find_project_root(&cwd) {
        Ok(root) => Ok(root),
        Err(e) => {
            log::debug!("{} Using '{}'.", e, cwd.display());
            Ok(cwd)
        }
    }
}

fn run_cli(cli: Cli) -> Result<()> {
    log::debug!("CLI args parsed: {:?}", cli);

    let root = project_root(&cli)?;
    let definition = config_loader::load(&root)?;
    let env_snapshot = injection::capture_env();
    let env_layer = environment::read_settings(&env_snapshot)?;
    let commands = cli.engine_commands()?;

    let mut plan = BootstrapPlan::new(
        definition.registry.clone(),
        definition.definition_type.clone(),
        root.clone(),
    );
    plan.extra_classpath = cli.classpath.clone();
    plan.project_classpath = definition.classpath.clone();
    plan.project_repositories = definition.repositories.clone();
    plan.default_kbean = definition.default_kbean.clone();
    plan.source_root = definition.source_root.clone();
    plan.cli = cli.settings_layer();
    plan.env = env_layer;
    plan.commands = commands;
    plan.env_snapshot = env_snapshot;
    let areas = plan.areas.clone();

    let context = LoaderContext::process();
    let mut resolver = LayoutResolver::with_default_repository();
    let mut compiler = CommandCompiler::new(
        definition.compiler_command.clone(),
        definition.compiler_output_dir.clone(),
        &areas,
        &root,
    );
    let mut executor = ActionDispatcher::new(&definition.registry, context, root.clone(), areas);
    let mut cleaner = FsCleaner;
    let mut help = HelpRenderer::new();

    let mut controller = BootstrapController::new(plan, context);
    let outcome = controller.execute_all(Collaborators {
        resolver: &mut resolver,
        compiler: &mut compiler,
        executor: &mut executor,
        cleaner: &mut cleaner,
        help: &mut help,
    })?;

    if let RunOutcome::Executed(outcome) = outcome {
        for (index, failure) in &outcome.ignored {
            eprintln!(
                "{} {}",
                "!".yellow(),
                format!(t!("run.ignored"), index = index + 1, reason = failure)
            );
        }
        if outcome.executed > 0 {
            println!(
                "{} {}",
                "✔".green(),
                format!(t!("run.summary"), count = outcome.executed)
            );
        }
    }
    Ok(())
}
