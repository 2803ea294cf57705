//! # Settings Resolver
//!
//! Behavior flags arrive from two sources with identical shape: the command line
//! and the environment. Both are modelled as one [`SettingsLayer`] type tagged
//! with its provenance, and merged exactly once by [`resolve`].
//!
//! Precedence, field by field: an explicitly set command-line value wins, else
//! the environment value applies, else the default. `resolve` performs no I/O, so
//! it can be re-run at any point of the bootstrap with the same result.

use std::fmt;
use std::marker::PhantomData;

/// Provenance tag of a [`SettingsLayer`].
pub trait Origin: fmt::Debug + Clone + Copy + PartialEq + Eq {
    const NAME: &'static str;
}

/// Values parsed from process arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandLine;

/// Values read from environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Environment;

impl Origin for CommandLine {
    const NAME: &'static str = "command line";
}

impl Origin for Environment {
    const NAME: &'static str = "environment";
}

/// One source's view of the behavior flags. `None` means "not set here".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsLayer<O: Origin> {
    pub kbean: Option<String>,
    pub clean_work: Option<bool>,
    pub clean_output: Option<bool>,
    pub ignore_compile_failure: Option<bool>,
    pub skip_compile: Option<bool>,
    /// `Some("")` requests general help, `Some(topic)` help on one topic.
    pub command_help: Option<String>,
    origin: PhantomData<O>,
}

// Derived `Default` would require `O: Default`.
impl<O: Origin> Default for SettingsLayer<O> {
    fn default() -> Self {
        Self {
            kbean: None,
            clean_work: None,
            clean_output: None,
            ignore_compile_failure: None,
            skip_compile: None,
            command_help: None,
            origin: PhantomData,
        }
    }
}

impl<O: Origin> SettingsLayer<O> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn origin_name(&self) -> &'static str {
        O::NAME
    }

    /// `true` when no field is set.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// The effective execution flags of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BehaviorSettings {
    kbean: Option<String>,
    clean_work: bool,
    clean_output: bool,
    ignore_compile_failure: bool,
    skip_compile: bool,
    command_help: Option<String>,
}

impl BehaviorSettings {
    /// The plugin selected as default command target, if any.
    pub fn kbean(&self) -> Option<&str> {
        self.kbean.as_deref()
    }

    pub fn clean_work(&self) -> bool {
        self.clean_work
    }

    pub fn clean_output(&self) -> bool {
        self.clean_output
    }

    pub fn ignore_compile_failure(&self) -> bool {
        self.ignore_compile_failure
    }

    pub fn skip_compile(&self) -> bool {
        self.skip_compile
    }

    pub fn command_help(&self) -> Option<&str> {
        self.command_help.as_deref()
    }

    pub fn help_requested(&self) -> bool {
        self.command_help.is_some()
    }
}

/// Merges the two layers into the effective settings.
pub fn resolve(
    cli: &SettingsLayer<CommandLine>,
    env: &SettingsLayer<Environment>,
) -> BehaviorSettings {
    fn pick<T: Clone>(cli: &Option<T>, env: &Option<T>) -> Option<T> {
        cli.as_ref().or(env.as_ref()).cloned()
    }

    let settings = BehaviorSettings {
        kbean: pick(&cli.kbean, &env.kbean),
        clean_work: pick(&cli.clean_work, &env.clean_work).unwrap_or(false),
        clean_output: pick(&cli.clean_output, &env.clean_output).unwrap_or(false),
        ignore_compile_failure: pick(&cli.ignore_compile_failure, &env.ignore_compile_failure)
            .unwrap_or(false),
        skip_compile: pick(&cli.skip_compile, &env.skip_compile).unwrap_or(false),
        command_help: pick(&cli.command_help, &env.command_help),
    };
    log::trace!("Resolved behavior settings: {:?}", settings);
    settings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let settings = resolve(&SettingsLayer::new(), &SettingsLayer::new());
        assert_eq!(settings, BehaviorSettings::default());
        assert!(!settings.help_requested());
    }

    #[test]
    fn test_command_line_wins_when_set() {
        // --- Setup ---
        let mut cli = SettingsLayer::<CommandLine>::new();
        cli.kbean = Some("docker".into());
        cli.clean_work = Some(false);

        let mut env = SettingsLayer::<Environment>::new();
        env.kbean = Some("project".into());
        env.clean_work = Some(true);
        env.ignore_compile_failure = Some(true);

        // --- Execute ---
        let settings = resolve(&cli, &env);

        // --- Assert ---
        assert_eq!(settings.kbean(), Some("docker"));
        assert!(!settings.clean_work());
        // Unset on the command line: the environment applies.
        assert!(settings.ignore_compile_failure());
    }

    #[test]
    fn test_skip_compile_and_clean_output_from_two_sources() {
        let mut cli = SettingsLayer::<CommandLine>::new();
        cli.skip_compile = Some(true);
        let mut env = SettingsLayer::<Environment>::new();
        env.clean_output = Some(true);

        let settings = resolve(&cli, &env);
        assert!(settings.skip_compile());
        assert!(settings.clean_output());
        assert!(!settings.clean_work());
    }

    #[test]
    fn test_resolve_is_repeatable() {
        let mut cli = SettingsLayer::<CommandLine>::new();
        cli.command_help = Some("project".into());
        let mut env = SettingsLayer::<Environment>::new();
        env.skip_compile = Some(true);

        let first = resolve(&cli, &env);
        let second = resolve(&cli, &env);
        assert_eq!(first, second);
        assert_eq!(resolve(&cli, &env).command_help(), Some("project"));
    }

    #[test]
    fn test_layers_know_their_origin() {
        assert_eq!(SettingsLayer::<CommandLine>::new().origin_name(), "command line");
        assert_eq!(SettingsLayer::<Environment>::new().origin_name(), "environment");
        let mut layer = SettingsLayer::<Environment>::new();
        assert!(layer.is_empty());
        layer.clean_work = Some(true);
        assert!(!layer.is_empty());
    }
}
