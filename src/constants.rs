// src/constants.rs

/// The build-definition file at the root of a project.
pub const DEFINITION_FILENAME: &str = "keel.toml";

/// Default root of the build-definition sources, relative to the project root.
pub const DEFAULT_SOURCE_DIR: &str = "keel-src";

/// Work area, cleaned by `--clean-work`.
pub const WORK_DIR: &str = ".keel-work";

/// Output area, cleaned by `--clean`.
pub const OUTPUT_DIR: &str = "keel-output";

/// Default output directory of the build-definition compiler (inside the work area).
pub const DEFINITION_CLASSES_DIR: &str = "def-classes";

/// Compile stamp used to skip unchanged build-definition compilations (inside the work area).
pub const COMPILE_STAMP_FILENAME: &str = "compile.stamp.bin";

/// Default local repository, relative to the user's home directory.
pub const DEFAULT_REPOSITORY_DIR: &str = ".keel/repository";

/// Suffix that may be omitted when naming a plugin on the command line.
pub const KBEAN_SUFFIX: &str = "KBean";

// --- Environment-origin settings ---

/// Default plugin for commands without a target.
pub const ENV_KBEAN: &str = "KEEL_KBEAN";
/// Boolean: empty the work area.
pub const ENV_CLEAN_WORK: &str = "KEEL_CLEAN_WORK";
/// Boolean: empty the output area.
pub const ENV_CLEAN_OUTPUT: &str = "KEEL_CLEAN_OUTPUT";
/// Boolean: keep going after a compilation failure.
pub const ENV_IGNORE_COMPILE_FAILURE: &str = "KEEL_IGNORE_COMPILE_FAILURE";
/// Boolean: do not compile the build definition.
pub const ENV_SKIP_COMPILE: &str = "KEEL_SKIP_COMPILE";
/// Help topic; empty for general help.
pub const ENV_DOC: &str = "KEEL_DOC";

// --- Environment handed to external commands ---

/// Search path, joined with the platform separator.
pub const ENV_CLASSPATH: &str = "KEEL_CLASSPATH";
/// Directory the compiler writes to.
pub const ENV_OUTPUT_DIR: &str = "KEEL_OUTPUT_DIR";
/// Prefix of the variables carrying command properties.
pub const ENV_PROP_PREFIX: &str = "KEEL_PROP_";
/// Positional arguments of a scripted action, shell-quoted.
pub const ENV_ARGS: &str = "KEEL_ARGS";
