// src/core/injection.rs

use crate::models::{EngineCommand, PropertyInjection};
use std::collections::{BTreeMap, BTreeSet};

/// Environment variables captured once per run.
pub type EnvSnapshot = BTreeMap<String, String>;

/// Captures the process environment. Variables that are not valid unicode are
/// skipped.
pub fn capture_env() -> EnvSnapshot {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

/// Field -> value for every injection whose variable is present in `env`.
pub fn resolve_injections(
    injections: &BTreeSet<PropertyInjection>,
    env: &EnvSnapshot,
) -> BTreeMap<String, String> {
    injections
        .iter()
        .filter_map(|injection| match env.get(&injection.env_var) {
            Some(value) => Some((injection.target.clone(), value.clone())),
            None => {
                log::trace!(
                    "Injection '{}' <- ${} skipped: variable not set.",
                    injection.target,
                    injection.env_var
                );
                None
            }
        })
        .collect()
}

/// Fills the named arguments of `command` from resolved injections. Arguments
/// given explicitly on the command line are left alone.
pub fn apply_injections(command: &mut EngineCommand, values: &BTreeMap<String, String>) -> usize {
    let mut applied = 0;
    for (field, value) in values {
        if command.named.contains_key(field) {
            log::debug!(
                "Field '{}' of '{}' set explicitly; injected value ignored.",
                field,
                command
            );
            continue;
        }
        command.named.insert(field.clone(), value.clone());
        applied += 1;
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;

    fn injection(target: &str, var: &str) -> PropertyInjection {
        PropertyInjection {
            target: target.into(),
            env_var: var.into(),
            declared_on: "Build".into(),
        }
    }

    #[test]
    fn test_injection_skips_explicit_and_missing_values() {
        // --- Setup ---
        let injections: BTreeSet<_> = [
            injection("token", "SONAR_TOKEN"),
            injection("host", "SONAR_HOST"),
            injection("user", "SONAR_USER"),
        ]
        .into_iter()
        .collect();
        let env: EnvSnapshot = [
            ("SONAR_TOKEN".to_string(), "secret".to_string()),
            ("SONAR_HOST".to_string(), "env-host".to_string()),
        ]
        .into_iter()
        .collect();

        let mut command = EngineCommand::new(Some("Build"), "scan");
        command.named.insert("host".into(), "cli-host".into());

        // --- Execute ---
        let values = resolve_injections(&injections, &env);
        let applied = apply_injections(&mut command, &values);

        // --- Assert ---
        assert_eq!(applied, 1);
        assert_eq!(command.named["token"], "secret");
        assert_eq!(command.named["host"], "cli-host");
        assert!(!command.named.contains_key("user"));
    }
}
