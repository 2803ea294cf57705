// src/core/markers.rs
//
// Validation of raw marker values into typed metadata.

use crate::models::{ClasspathEntry, ModuleCoordinate, RepositoryRef};
use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;

lazy_static! {
    // group:artifact[:version]
    static ref COORDINATE_RE: Regex =
        Regex::new(r"^([A-Za-z0-9_.\-]+):([A-Za-z0-9_.\-]+)(?::([A-Za-z0-9_.\-+?\[\](),]+))?$")
            .unwrap();
    static ref ENV_VAR_RE: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// Why a marker value was refused. The scanner adds the type and member.
pub type Rejection = String;

/// Returns `true` if the value should be read as a module coordinate rather
/// than a file pattern.
fn looks_like_coordinate(value: &str) -> bool {
    value.contains(':') && !value.contains('/') && !value.contains('\\')
}

/// Parses a classpath marker value.
pub fn parse_classpath_entry(raw: &str) -> Result<ClasspathEntry, Rejection> {
    let value = raw.trim();
    if value.is_empty() {
        return Err("empty classpath entry".to_string());
    }

    if looks_like_coordinate(value) {
        let caps = COORDINATE_RE
            .captures(value)
            .ok_or_else(|| "expected 'group:artifact[:version]'".to_string())?;
        let part = |i: usize| caps.get(i).map(|m| m.as_str().to_string());
        return match (part(1), part(2)) {
            (Some(group), Some(artifact)) => {
                Ok(ClasspathEntry::ModuleCoordinate(ModuleCoordinate {
                    group,
                    artifact,
                    version: part(3),
                }))
            }
            _ => Err("expected 'group:artifact[:version]'".to_string()),
        };
    }

    if Path::new(value).is_absolute() || value.starts_with('/') {
        return Err("file patterns must be relative to the project root".to_string());
    }
    Ok(ClasspathEntry::FilePattern(value.replace('\\', "/")))
}

/// Parses a repository marker value.
pub fn parse_repository(raw: &str) -> Result<RepositoryRef, Rejection> {
    let value = raw.trim();
    if value.is_empty() {
        return Err("empty repository reference".to_string());
    }
    if value.chars().any(char::is_whitespace) {
        return Err("repository references cannot contain whitespace".to_string());
    }
    Ok(RepositoryRef(value.to_string()))
}

/// Splits a compile-option marker into tokens with shell-word rules.
pub fn parse_compile_option(raw: &str) -> Result<Vec<String>, Rejection> {
    let tokens = shlex::split(raw).ok_or_else(|| "unbalanced quotes".to_string())?;
    if tokens.is_empty() {
        return Err("compile option produces no token".to_string());
    }
    Ok(tokens)
}

/// Checks the environment variable named by a property-injection marker.
pub fn parse_env_var_name(raw: &str) -> Result<String, Rejection> {
    let value = raw.trim();
    if ENV_VAR_RE.is_match(value) {
        Ok(value.to_string())
    } else {
        Err("not a valid environment variable name".to_string())
    }
}

/// Checks a plugin name listed by a requirement marker.
pub fn parse_required_plugin(raw: &str) -> Result<String, Rejection> {
    let value = raw.trim();
    if value.is_empty() || value.chars().any(char::is_whitespace) {
        return Err("not a valid plugin type name".to_string());
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(g: &str, a: &str, v: Option<&str>) -> ClasspathEntry {
        ClasspathEntry::ModuleCoordinate(ModuleCoordinate {
            group: g.into(),
            artifact: a.into(),
            version: v.map(String::from),
        })
    }

    #[test]
    fn test_parse_coordinates() {
        assert_eq!(
            parse_classpath_entry("dev.keel:plugin-sonar:1.2.0").unwrap(),
            coord("dev.keel", "plugin-sonar", Some("1.2.0"))
        );
        assert_eq!(
            parse_classpath_entry(" org.example:tool ").unwrap(),
            coord("org.example", "tool", None)
        );
        assert_eq!(
            parse_classpath_entry("org.example:tool:[1.0,2.0)").unwrap(),
            coord("org.example", "tool", Some("[1.0,2.0)"))
        );
    }

    #[test]
    fn test_parse_malformed_coordinates() {
        assert!(parse_classpath_entry("org.example:").is_err());
        assert!(parse_classpath_entry("a:b:c:d").is_err());
        assert!(parse_classpath_entry("a b:c").is_err());
        assert!(parse_classpath_entry("   ").is_err());
    }

    #[test]
    fn test_parse_file_patterns() {
        assert_eq!(
            parse_classpath_entry("libs/*.jar").unwrap(),
            ClasspathEntry::FilePattern("libs/*.jar".into())
        );
        assert_eq!(
            parse_classpath_entry("libs\\extra\\**").unwrap(),
            ClasspathEntry::FilePattern("libs/extra/**".into())
        );
        assert!(parse_classpath_entry("/opt/libs/a.jar").is_err());
    }

    #[test]
    fn test_parse_compile_options() {
        assert_eq!(
            parse_compile_option("-Xlint:all -d 'out dir'").unwrap(),
            vec!["-Xlint:all", "-d", "out dir"]
        );
        assert!(parse_compile_option("-a \"unterminated").is_err());
        assert!(parse_compile_option("   ").is_err());
    }

    #[test]
    fn test_parse_repositories_and_env_names() {
        assert_eq!(
            parse_repository("https://repo.example.org/maven").unwrap(),
            RepositoryRef("https://repo.example.org/maven".into())
        );
        assert!(parse_repository("my repo").is_err());
        assert_eq!(parse_env_var_name("SONAR_TOKEN").unwrap(), "SONAR_TOKEN");
        assert!(parse_env_var_name("9LIVES").is_err());
        assert!(parse_env_var_name("A-B").is_err());
    }
}
