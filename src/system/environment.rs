// src/system/environment.rs
//
// Reads the environment-origin settings layer.

use crate::constants::{
    ENV_CLEAN_OUTPUT, ENV_CLEAN_WORK, ENV_DOC, ENV_IGNORE_COMPILE_FAILURE, ENV_KBEAN,
    ENV_SKIP_COMPILE,
};
use crate::core::injection::EnvSnapshot;
use crate::core::settings_resolver::{Environment, SettingsLayer};
use crate::errors::ConfigError;

/// Parses a boolean setting. Accepts `true/false`, `1/0`, `yes/no`, `on/off`.
pub fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidSetting {
            var: var.to_string(),
            value: value.to_string(),
        }),
    }
}

fn flag(env: &EnvSnapshot, var: &str) -> Result<Option<bool>, ConfigError> {
    env.get(var).map(|value| parse_bool(var, value)).transpose()
}

fn text(env: &EnvSnapshot, var: &str) -> Option<String> {
    env.get(var).map(|value| value.trim().to_string())
}

/// Builds the environment layer from a captured environment. Empty `KEEL_KBEAN`
/// counts as unset; empty `KEEL_DOC` requests general help.
pub fn read_settings(env: &EnvSnapshot) -> Result<SettingsLayer<Environment>, ConfigError> {
    let mut layer = SettingsLayer::new();
    layer.kbean = text(env, ENV_KBEAN).filter(|k| !k.is_empty());
    layer.clean_work = flag(env, ENV_CLEAN_WORK)?;
    layer.clean_output = flag(env, ENV_CLEAN_OUTPUT)?;
    layer.ignore_compile_failure = flag(env, ENV_IGNORE_COMPILE_FAILURE)?;
    layer.skip_compile = flag(env, ENV_SKIP_COMPILE)?;
    layer.command_help = text(env, ENV_DOC);
    if !layer.is_empty() {
        log::debug!("Settings from {}: {:?}", layer.origin_name(), layer);
    }
    Ok(layer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> EnvSnapshot {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_read_settings() {
        let layer = read_settings(&env(&[
            ("KEEL_KBEAN", "docker"),
            ("KEEL_CLEAN_OUTPUT", "Yes"),
            ("KEEL_SKIP_COMPILE", "0"),
            ("UNRELATED", "x"),
        ]))
        .unwrap();

        assert_eq!(layer.kbean.as_deref(), Some("docker"));
        assert_eq!(layer.clean_output, Some(true));
        assert_eq!(layer.skip_compile, Some(false));
        assert_eq!(layer.clean_work, None);
        assert_eq!(layer.command_help, None);
    }

    #[test]
    fn test_invalid_boolean_names_the_variable() {
        let err = read_settings(&env(&[("KEEL_CLEAN_WORK", "maybe")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidSetting {
                var: "KEEL_CLEAN_WORK".into(),
                value: "maybe".into()
            }
        );
    }

    #[test]
    fn test_empty_values() {
        let layer = read_settings(&env(&[("KEEL_KBEAN", ""), ("KEEL_DOC", "")])).unwrap();
        assert_eq!(layer.kbean, None);
        assert_eq!(layer.command_help.as_deref(), Some(""));
    }
}
