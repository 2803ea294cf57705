// src/cli/command_parser.rs
//
// Command grammar: `[target:] [key=value ...] [action[#arg...] ...]`, repeated.
//
//   keel pack                     -> <default>:pack
//   keel docker: tag=1.2 build push#--dry
//                                 -> docker:build {tag=1.2}, docker:push {tag=1.2} [--dry]
//   keel project:pack sonar:scan  -> project:pack, sonar:scan

use crate::errors::ConfigError;
use crate::models::{EngineCommand, EngineCommands};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;

lazy_static! {
    static ref NAME_RE: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").unwrap();
}

const DEFAULT_TARGET_LABEL: &str = "<default>";

fn invalid(token: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidCommandToken {
        token: token.to_string(),
        reason: reason.to_string(),
    }
}

fn check_name<'t>(name: &'t str, token: &str, what: &str) -> Result<&'t str, ConfigError> {
    if NAME_RE.is_match(name) {
        Ok(name)
    } else {
        Err(invalid(token, &format!("'{}' is not a valid {} name", name, what)))
    }
}

/// Accumulates commands segment by segment.
#[derive(Debug, Default)]
struct Parser {
    target: Option<String>,
    properties: BTreeMap<String, String>,
    /// Keys set since the last action of the current segment.
    unconsumed: Vec<String>,
    commands: Vec<EngineCommand>,
}

impl Parser {
    fn close_segment(&mut self) -> Result<(), ConfigError> {
        if !self.unconsumed.is_empty() {
            return Err(ConfigError::DanglingProperties {
                target: self
                    .target
                    .clone()
                    .unwrap_or_else(|| DEFAULT_TARGET_LABEL.to_string()),
                properties: std::mem::take(&mut self.unconsumed),
            });
        }
        self.properties.clear();
        Ok(())
    }

    fn switch_target(&mut self, name: &str, token: &str) -> Result<(), ConfigError> {
        let name = check_name(name, token, "target")?;
        self.close_segment()?;
        self.target = Some(name.to_string());
        Ok(())
    }

    fn property(&mut self, key: &str, value: &str, token: &str) -> Result<(), ConfigError> {
        let key = check_name(key, token, "property")?;
        self.properties.insert(key.to_string(), value.to_string());
        if !self.unconsumed.iter().any(|k| k == key) {
            self.unconsumed.push(key.to_string());
        }
        Ok(())
    }

    fn action(&mut self, text: &str, token: &str) -> Result<(), ConfigError> {
        let mut parts = text.split('#');
        let name = parts.next().unwrap_or_default();
        let name = check_name(name, token, "action")?;

        let mut command = EngineCommand::new(self.target.as_deref(), name);
        command.positional = parts.map(str::to_string).collect();
        command.named = self.properties.clone();
        self.commands.push(command);
        self.unconsumed.clear();
        Ok(())
    }

    fn token(&mut self, token: &str) -> Result<(), ConfigError> {
        if token.starts_with('-') {
            return Err(invalid(token, "options must come before commands"));
        }
        if token.is_empty() {
            return Err(invalid(token, "empty token"));
        }

        let colon = token.find(':');
        let equals = token.find('=');
        let rest = match (colon, equals) {
            (Some(c), eq) if eq.is_none_or(|e| c < e) => {
                let (target, rest) = token.split_at(c);
                self.switch_target(target, token)?;
                rest.get(1..).unwrap_or_default()
            }
            _ => token,
        };
        if rest.is_empty() {
            return Ok(());
        }

        match rest.split_once('=') {
            Some((key, value)) => self.property(key, value, token),
            None => self.action(rest, token),
        }
    }
}

/// Parses the command arguments into an ordered command sequence.
pub fn parse_commands<S: AsRef<str>>(tokens: &[S]) -> Result<EngineCommands, ConfigError> {
    let mut parser = Parser::default();
    for token in tokens {
        parser.token(token.as_ref())?;
    }
    parser.close_segment()?;
    log::debug!("Parsed {} command(s).", parser.commands.len());
    Ok(EngineCommands::new(parser.commands))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn display(commands: &EngineCommands) -> Vec<String> {
        commands.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_default_target_actions() {
        let commands = parse_commands(&["clean", "pack"]).unwrap();
        assert_eq!(display(&commands), vec!["clean", "pack"]);
        assert!(commands.iter().all(|c| c.target.is_none()));
    }

    #[test]
    fn test_segments_with_properties_and_positionals() {
        // --- Execute ---
        let commands =
            parse_commands(&["docker:", "tag=1.2", "build", "push#--dry#eu", "project:pack"])
                .unwrap();

        // --- Assert ---
        assert_eq!(
            display(&commands),
            vec!["docker:build", "docker:push", "project:pack"]
        );
        let push = commands.get(1).unwrap();
        assert_eq!(push.named["tag"], "1.2");
        assert_eq!(push.positional, vec!["--dry", "eu"]);
        // Properties do not leak into the next segment.
        assert!(commands.get(2).unwrap().named.is_empty());
    }

    #[test]
    fn test_target_prefixed_property() {
        let commands = parse_commands(&["sonar:host=http://x:9000", "scan"]).unwrap();
        let scan = commands.get(0).unwrap();
        assert_eq!(scan.target.as_deref(), Some("sonar"));
        assert_eq!(scan.named["host"], "http://x:9000");
    }

    #[test]
    fn test_dangling_properties_are_rejected() {
        let err = parse_commands(&["pack", "version=2"]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::DanglingProperties {
                target: "<default>".into(),
                properties: vec!["version".into()]
            }
        );
        assert!(matches!(
            parse_commands(&["docker:", "tag=1", "project:", "pack"]),
            Err(ConfigError::DanglingProperties { ref target, .. }) if target == "docker"
        ));
    }

    #[test]
    fn test_invalid_tokens() {
        assert!(matches!(
            parse_commands(&["--clean"]),
            Err(ConfigError::InvalidCommandToken { .. })
        ));
        assert!(parse_commands(&[":pack"]).is_err());
        assert!(parse_commands(&["#arg"]).is_err());
        assert!(parse_commands(&["=value", "pack"]).is_err());
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_commands::<&str>(&[]).unwrap().is_empty());
    }
}
