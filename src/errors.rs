// src/errors.rs

use thiserror::Error;

/// A user-caused problem: something in the build definition, the environment or
/// the command line is wrong. Reported with a concise message naming the
/// offending identifier and never with an internal trace.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A marker value does not follow its grammar.
    #[error("Malformed marker value '{value}' on '{type_name}.{member}': {reason}")]
    MalformedMarker {
        type_name: String,
        member: String,
        value: String,
        reason: String,
    },
    /// The build-definition type is not in the registry.
    #[error("Build-definition type '{name}' is not registered.")]
    UnknownType { name: String },
    /// A `requires` marker names a type that is not registered.
    #[error("Type '{type_name}' requires plugin '{required}', which is not registered.")]
    UnknownPlugin { type_name: String, required: String },
    /// A type extends itself, directly or not.
    #[error("Type hierarchy of '{type_name}' loops back through: {}", .chain.join(" -> "))]
    InheritanceCycle { type_name: String, chain: Vec<String> },
    /// Plugins require each other in a loop.
    #[error("Plugin dependency cycle: {}", format_cycle(.members))]
    DependencyCycle { members: Vec<String> },
    /// The resolver could not turn a coordinate into a location.
    #[error("Could not resolve '{coordinate}': {reason}")]
    UnresolvedCoordinate { coordinate: String, reason: String },
    /// A classpath file pattern matched no file.
    #[error("Classpath pattern '{pattern}' matches nothing under '{root}'.")]
    UnmatchedFilePattern { pattern: String, root: String },
    /// A command names a target that matches no registered type.
    #[error("Unknown command target '{name}'. Available: {}", .available.join(", "))]
    UnknownTarget { name: String, available: Vec<String> },
    /// The target exists but has no such action.
    #[error("Unknown action '{action}' on '{target}'.")]
    UnknownAction { target: String, action: String },
    /// `key=value` tokens with no action after them.
    #[error("Properties {} for '{target}' are not followed by any action.", .properties.join(", "))]
    DanglingProperties {
        target: String,
        properties: Vec<String>,
    },
    /// A command-line token fits no part of the command grammar.
    #[error("Invalid command token '{token}': {reason}")]
    InvalidCommandToken { token: String, reason: String },
    /// A boolean setting variable holds something other than true or false.
    #[error("Environment variable '{var}' has invalid value '{value}': expected true or false.")]
    InvalidSetting { var: String, value: String },
    /// `keel.toml` cannot be read or parsed.
    #[error("Build definition '{path}' is invalid: {reason}")]
    InvalidDefinitionFile { path: String, reason: String },
    /// The build definition does not compile.
    #[error("Build definition sources in '{source_root}' do not compile:\n{diagnostics}")]
    CompilationFailed {
        source_root: String,
        diagnostics: String,
    },
    /// A new location would change what an already-loaded symbol resolves to.
    #[error(
        "'{location}' would shadow '{symbol}', already loaded from '{resolved_from}'. Remove it from the classpath or reorder the entries."
    )]
    ShadowedSymbol {
        location: String,
        symbol: String,
        resolved_from: String,
    },
}

fn format_cycle(members: &[String]) -> String {
    match members.first() {
        Some(first) => format!("{} -> {}", members.join(" -> "), first),
        None => String::new(),
    }
}

/// Returns `true` when the error chain carries a user configuration error.
pub fn is_configuration_error(error: &anyhow::Error) -> bool {
    error.downcast_ref::<ConfigError>().is_some()
        || error.chain().any(|cause| cause.downcast_ref::<ConfigError>().is_some())
        || error
            .downcast_ref::<crate::core::bootstrap::BootstrapError>()
            .is_some_and(|e| e.is_configuration())
}
