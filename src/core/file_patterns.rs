// src/core/file_patterns.rs
//
// Expansion of classpath file patterns relative to the project root.
// `*` and `?` stay within one path segment, `**` crosses segments.

use crate::errors::ConfigError;
use crate::models::Location;
use regex::Regex;
use std::path::Path;
use walkdir::WalkDir;

/// Translates a glob into an anchored regex over `/`-separated relative paths.
fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut re = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    re.push_str("(?:.*/)?");
                } else {
                    re.push_str(".*");
                }
            }
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re)
}

fn has_wildcard(pattern: &str) -> bool {
    pattern.contains(['*', '?'])
}

/// Expands `pattern` under `root` into matching files and directories, sorted.
///
/// A pattern without wildcards names one path and matches if it exists.
pub fn expand(root: &Path, pattern: &str) -> Result<Vec<Location>, ConfigError> {
    let unmatched = || ConfigError::UnmatchedFilePattern {
        pattern: pattern.to_string(),
        root: root.display().to_string(),
    };

    if !has_wildcard(pattern) {
        let path = root.join(pattern);
        return if path.exists() {
            Ok(vec![Location::new(dunce::simplified(&path))])
        } else {
            Err(unmatched())
        };
    }

    let matcher = glob_to_regex(pattern).map_err(|e| ConfigError::MalformedMarker {
        type_name: "project".to_string(),
        member: "classpath".to_string(),
        value: pattern.to_string(),
        reason: e.to_string(),
    })?;

    let mut matches: Vec<Location> = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let relative = entry.path().strip_prefix(root).ok()?;
            let normalized = relative.to_string_lossy().replace('\\', "/");
            matcher
                .is_match(&normalized)
                .then(|| Location::new(entry.path()))
        })
        .collect();

    if matches.is_empty() {
        return Err(unmatched());
    }
    matches.sort();
    log::debug!("Pattern '{}' matched {} location(s).", pattern, matches.len());
    Ok(matches)
}
