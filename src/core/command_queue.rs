//! # Command Queue
//!
//! Runs an immutable, ordered [`EngineCommands`] sequence against a
//! [`CommandExecutor`].
//!
//! - Requested cleanups of the work and output areas ([`clean_areas`]) happen
//!   before the first command, even when the queue is empty. The bootstrap runs
//!   them itself, ahead of compilation, and then calls
//!   [`CommandQueue::run_commands`].
//! - Each command is prepared (unless compilation is skipped) and then executed,
//!   strictly in order.
//! - The first failure that is not ignorable stops the queue. Only compilation
//!   failures are ignorable, and only when the settings say so.

use crate::core::settings_resolver::BehaviorSettings;
use crate::models::{EngineCommand, EngineCommands, WorkArea, WorkAreas};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Category of a command failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Preparing or compiling what the command needs failed.
    Compilation,
    /// The action itself failed.
    Action,
    /// The target or action could not be found by the executor.
    UnknownTarget,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Compilation => "compilation failure",
            Self::Action => "action failure",
            Self::UnknownTarget => "unknown target",
        };
        f.write_str(label)
    }
}

/// A typed failure returned by a [`CommandExecutor`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct CommandFailure {
    /// Decides whether the failure can be ignored.
    pub kind: FailureKind,
    /// What went wrong, for the user.
    pub message: String,
}

impl CommandFailure {
    /// A failure of any kind.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// A [`FailureKind::Compilation`] failure.
    pub fn compilation(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Compilation, message)
    }

    /// A [`FailureKind::Action`] failure.
    pub fn action(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Action, message)
    }

    /// Whether `settings` allow the queue to continue past this failure.
    pub fn is_ignorable(&self, settings: &BehaviorSettings) -> bool {
        self.kind == FailureKind::Compilation && settings.ignore_compile_failure()
    }
}

/// Why the queue stopped.
#[derive(Error, Debug)]
pub enum QueueError {
    /// An area could not be emptied.
    #[error("Failed to clean {area:?} area '{}'", .path.display())]
    Cleanup {
        /// The area being cleaned.
        area: WorkArea,
        /// Its directory.
        path: PathBuf,
        /// The I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// A command failed and the failure was not ignorable.
    #[error("Command #{} '{command}' failed", .index + 1)]
    CommandFailed {
        /// Zero-based position in the queue.
        index: usize,
        /// The command as displayed, `target:action`.
        command: String,
        /// What the executor reported.
        #[source]
        source: CommandFailure,
    },
}

/// Performs the actual build actions.
pub trait CommandExecutor {
    /// Preparatory step of a command (compilation of what it needs). Bypassed
    /// when compilation is skipped.
    fn prepare(
        &mut self,
        command: &EngineCommand,
        settings: &BehaviorSettings,
    ) -> Result<(), CommandFailure>;

    /// Runs the action of a command.
    fn execute(
        &mut self,
        command: &EngineCommand,
        settings: &BehaviorSettings,
    ) -> Result<(), CommandFailure>;
}

/// Side-effecting cleanup of persisted areas.
pub trait WorkspaceCleaner {
    /// Empties `path`, the directory of `area`.
    fn clean(&mut self, area: WorkArea, path: &Path) -> std::io::Result<()>;
}

/// What happened during a successful queue run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueOutcome {
    /// Areas cleaned before the first command, in order.
    pub cleaned: Vec<WorkArea>,
    /// Commands that ran to the end, possibly after an ignored failure.
    pub executed: usize,
    /// Zero-based index and failure of every ignored failure.
    pub ignored: Vec<(usize, CommandFailure)>,
}

/// An immutable, ordered list of commands to run.
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    commands: EngineCommands,
}

impl CommandQueue {
    /// A queue running `commands` in order.
    pub fn new(commands: EngineCommands) -> Self {
        Self { commands }
    }

    /// The queued commands.
    pub fn commands(&self) -> &EngineCommands {
        &self.commands
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Runs the cleanups requested by `settings`, work area first.
    pub fn clean(
        &self,
        settings: &BehaviorSettings,
        areas: &WorkAreas,
        cleaner: &mut dyn WorkspaceCleaner,
    ) -> Result<Vec<WorkArea>, QueueError> {
        clean_areas(settings, areas, cleaner)
    }

    /// Cleans, then runs every command in order.
    pub fn execute(
        &self,
        settings: &BehaviorSettings,
        areas: &WorkAreas,
        executor: &mut dyn CommandExecutor,
        cleaner: &mut dyn WorkspaceCleaner,
    ) -> Result<QueueOutcome, QueueError> {
        let cleaned = self.clean(settings, areas, cleaner)?;
        let mut outcome = self.run_commands(settings, executor)?;
        outcome.cleaned = cleaned;
        Ok(outcome)
    }

    /// Runs every command in order, without any cleanup.
    pub fn run_commands(
        &self,
        settings: &BehaviorSettings,
        executor: &mut dyn CommandExecutor,
    ) -> Result<QueueOutcome, QueueError> {
        let mut outcome = QueueOutcome::default();
        for (index, command) in self.commands.iter().enumerate() {
            log::debug!("Running command #{} '{}'.", index + 1, command);
            match run_one(command, settings, executor) {
                Ok(()) => outcome.executed += 1,
                Err(failure) if failure.is_ignorable(settings) => {
                    log::warn!(
                        "Command #{} '{}': {} (ignored).",
                        index + 1,
                        command,
                        failure
                    );
                    outcome.executed += 1;
                    outcome.ignored.push((index, failure));
                }
                Err(failure) => {
                    return Err(QueueError::CommandFailed {
                        index,
                        command: command.to_string(),
                        source: failure,
                    });
                }
            }
        }
        Ok(outcome)
    }
}

/// Runs the cleanups requested by `settings`, work area first. The bootstrap
/// calls this before compiling the build definition.
pub fn clean_areas(
    settings: &BehaviorSettings,
    areas: &WorkAreas,
    cleaner: &mut dyn WorkspaceCleaner,
) -> Result<Vec<WorkArea>, QueueError> {
    let requested = [
        (WorkArea::Work, settings.clean_work()),
        (WorkArea::Output, settings.clean_output()),
    ];
    let mut cleaned = Vec::new();
    for (area, wanted) in requested {
        if !wanted {
            continue;
        }
        let path = areas.path(area);
        log::debug!("Cleaning {:?} area '{}'.", area, path.display());
        cleaner
            .clean(area, path)
            .map_err(|source| QueueError::Cleanup {
                area,
                path: path.to_path_buf(),
                source,
            })?;
        cleaned.push(area);
    }
    Ok(cleaned)
}

fn run_one(
    command: &EngineCommand,
    settings: &BehaviorSettings,
    executor: &mut dyn CommandExecutor,
) -> Result<(), CommandFailure> {
    if settings.skip_compile() {
        log::trace!("Preparation of '{}' skipped.", command);
    } else if let Err(failure) = executor.prepare(command, settings) {
        if !failure.is_ignorable(settings) {
            return Err(failure);
        }
        // Keep going with whatever is already loaded.
        log::warn!("Preparing '{}': {} (ignored).", command, failure);
    }
    executor.execute(command, settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::settings_resolver::{self, CommandLine, Environment, SettingsLayer};
    use std::cell::RefCell;
    use std::rc::Rc;

    type Journal = Rc<RefCell<Vec<String>>>;

    struct Recorder {
        journal: Journal,
        fail_prepare: Option<&'static str>,
        fail_execute: Option<(&'static str, FailureKind)>,
    }

    impl CommandExecutor for Recorder {
        fn prepare(
            &mut self,
            command: &EngineCommand,
            _settings: &BehaviorSettings,
        ) -> Result<(), CommandFailure> {
            self.journal.borrow_mut().push(format!("prepare {}", command.action));
            if self.fail_prepare == Some(command.action.as_str()) {
                return Err(CommandFailure::compilation("does not compile"));
            }
            Ok(())
        }

        fn execute(
            &mut self,
            command: &EngineCommand,
            _settings: &BehaviorSettings,
        ) -> Result<(), CommandFailure> {
            self.journal.borrow_mut().push(format!("execute {}", command.action));
            match self.fail_execute {
                Some((action, kind)) if action == command.action => {
                    Err(CommandFailure::new(kind, "boom"))
                }
                _ => Ok(()),
            }
        }
    }

    struct Cleaner(Journal);

    impl WorkspaceCleaner for Cleaner {
        fn clean(&mut self, area: WorkArea, _path: &Path) -> std::io::Result<()> {
            self.0.borrow_mut().push(format!("clean {:?}", area));
            Ok(())
        }
    }

    fn queue(actions: &[&str]) -> CommandQueue {
        CommandQueue::new(
            actions
                .iter()
                .map(|a| EngineCommand::new(None, *a))
                .collect(),
        )
    }

    fn settings(configure: impl FnOnce(&mut SettingsLayer<CommandLine>)) -> BehaviorSettings {
        let mut cli = SettingsLayer::new();
        configure(&mut cli);
        settings_resolver::resolve(&cli, &SettingsLayer::<Environment>::new())
    }

    fn areas() -> WorkAreas {
        WorkAreas::under(Path::new("/project"))
    }

    fn recorder(journal: &Journal) -> Recorder {
        Recorder {
            journal: Rc::clone(journal),
            fail_prepare: None,
            fail_execute: None,
        }
    }

    #[test]
    fn test_failure_stops_the_queue() {
        // --- Setup ---
        let journal = Journal::default();
        let mut executor = recorder(&journal);
        executor.fail_execute = Some(("compile", FailureKind::Action));
        let mut cleaner = Cleaner(Rc::clone(&journal));
        let settings = settings(|cli| cli.skip_compile = Some(true));

        // --- Execute ---
        let err = queue(&["clean", "compile", "test"])
            .execute(&settings, &areas(), &mut executor, &mut cleaner)
            .unwrap_err();

        // --- Assert ---
        match &err {
            QueueError::CommandFailed { index, command, .. } => {
                assert_eq!(*index, 1);
                assert_eq!(command, "compile");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("#2"));
        assert_eq!(*journal.borrow(), vec!["execute clean", "execute compile"]);
    }

    #[test]
    fn test_compile_failure_is_fatal_unless_ignored() {
        let journal = Journal::default();
        let mut executor = recorder(&journal);
        executor.fail_prepare = Some("pack");
        let mut cleaner = Cleaner(Rc::clone(&journal));

        let strict = settings(|_| {});
        let err = queue(&["pack", "deploy"])
            .execute(&strict, &areas(), &mut executor, &mut cleaner)
            .unwrap_err();
        assert!(matches!(err, QueueError::CommandFailed { index: 0, .. }));

        journal.borrow_mut().clear();
        let forced = settings(|cli| cli.ignore_compile_failure = Some(true));
        let outcome = queue(&["pack", "deploy"])
            .execute(&forced, &areas(), &mut executor, &mut cleaner)
            .unwrap();
        assert_eq!(outcome.executed, 2);
        assert_eq!(
            *journal.borrow(),
            vec!["prepare pack", "execute pack", "prepare deploy", "execute deploy"]
        );
    }

    #[test]
    fn test_action_failure_is_never_ignorable() {
        let journal = Journal::default();
        let mut executor = recorder(&journal);
        executor.fail_execute = Some(("a", FailureKind::Action));
        let mut cleaner = Cleaner(Rc::clone(&journal));
        let forced = settings(|cli| cli.ignore_compile_failure = Some(true));

        assert!(
            queue(&["a", "b"])
                .execute(&forced, &areas(), &mut executor, &mut cleaner)
                .is_err()
        );
    }

    #[test]
    fn test_ignored_compilation_failure_from_execute_is_recorded() {
        let journal = Journal::default();
        let mut executor = recorder(&journal);
        executor.fail_execute = Some(("a", FailureKind::Compilation));
        let mut cleaner = Cleaner(Rc::clone(&journal));
        let forced = settings(|cli| {
            cli.ignore_compile_failure = Some(true);
            cli.skip_compile = Some(true);
        });

        let outcome = queue(&["a", "b"])
            .execute(&forced, &areas(), &mut executor, &mut cleaner)
            .unwrap();
        assert_eq!(outcome.ignored.len(), 1);
        assert_eq!(outcome.ignored[0].0, 0);
        assert_eq!(outcome.executed, 2);
    }

    #[test]
    fn test_cleanup_runs_before_first_command() {
        let journal = Journal::default();
        let mut executor = recorder(&journal);
        let mut cleaner = Cleaner(Rc::clone(&journal));
        let settings = settings(|cli| {
            cli.clean_output = Some(true);
            cli.clean_work = Some(true);
            cli.skip_compile = Some(true);
        });

        let outcome = queue(&["build"])
            .execute(&settings, &areas(), &mut executor, &mut cleaner)
            .unwrap();
        assert_eq!(outcome.cleaned, vec![WorkArea::Work, WorkArea::Output]);
        assert_eq!(
            *journal.borrow(),
            vec!["clean Work", "clean Output", "execute build"]
        );
    }

    #[test]
    fn test_cleanup_runs_on_empty_queue() {
        let journal = Journal::default();
        let mut executor = recorder(&journal);
        let mut cleaner = Cleaner(Rc::clone(&journal));
        let settings = settings(|cli| cli.clean_output = Some(true));

        let outcome = CommandQueue::default()
            .execute(&settings, &areas(), &mut executor, &mut cleaner)
            .unwrap();
        assert_eq!(outcome.executed, 0);
        assert_eq!(*journal.borrow(), vec!["clean Output"]);
    }

    #[test]
    fn test_run_commands_never_cleans() {
        let journal = Journal::default();
        let mut executor = recorder(&journal);
        let settings = settings(|cli| {
            cli.clean_work = Some(true);
            cli.skip_compile = Some(true);
        });

        let outcome = queue(&["build"])
            .run_commands(&settings, &mut executor)
            .unwrap();
        assert!(outcome.cleaned.is_empty());
        assert_eq!(*journal.borrow(), vec!["execute build"]);

        let mut cleaner = Cleaner(Rc::clone(&journal));
        assert_eq!(
            clean_areas(&settings, &areas(), &mut cleaner).unwrap(),
            vec![WorkArea::Work]
        );
    }
}
