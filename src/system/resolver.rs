// src/system/resolver.rs
//
// Resolves module coordinates against local repositories laid out as
// `<repo>/<group path>/<artifact>/<version>/<artifact>-<version>.jar`.

use crate::core::bootstrap::{DependencyResolver, ResolutionError};
use crate::core::paths;
use crate::models::{Location, ModuleCoordinate, RepositoryRef};
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

/// Resolves coordinates to archives in local repository directories.
#[derive(Debug, Clone, Default)]
pub struct LayoutResolver {
    /// Searched after the declared repositories.
    fallback: Option<PathBuf>,
}

impl LayoutResolver {
    pub fn new(fallback: Option<PathBuf>) -> Self {
        Self { fallback }
    }

    /// Falls back on `~/.keel/repository` when the home directory is known.
    pub fn with_default_repository() -> Self {
        Self::new(paths::default_repository_dir().ok())
    }

    fn repository_dirs(&self, repositories: &[RepositoryRef]) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = Vec::new();
        for repo in repositories {
            let raw = repo.as_str();
            if raw.starts_with("http://") || raw.starts_with("https://") {
                log::debug!("Remote repository '{}' skipped by the layout resolver.", raw);
                continue;
            }
            let raw = raw.strip_prefix("file://").unwrap_or(raw);
            match paths::expand_path(raw) {
                Ok(dir) if !dirs.contains(&dir) => dirs.push(dir),
                Ok(_) => {}
                Err(e) => log::warn!("Repository '{}' ignored: {}", raw, e),
            }
        }
        if let Some(fallback) = &self.fallback
            && !dirs.contains(fallback)
        {
            dirs.push(fallback.clone());
        }
        dirs
    }

    fn locate(&self, coordinate: &ModuleCoordinate, dirs: &[PathBuf]) -> Result<PathBuf, String> {
        if let Some(version) = &coordinate.version
            && version.contains(['[', ']', '(', ')', ',', '+'])
        {
            return Err("version ranges are not supported by local repositories".to_string());
        }

        for dir in dirs {
            let base = dir
                .join(coordinate.group.replace('.', "/"))
                .join(&coordinate.artifact);
            let version = match &coordinate.version {
                Some(v) => Some(v.clone()),
                None => latest_version(&base),
            };
            let Some(version) = version else { continue };
            let jar = base
                .join(&version)
                .join(format!("{}-{}.jar", coordinate.artifact, version));
            if jar.is_file() {
                return Ok(jar);
            }
        }

        if dirs.is_empty() {
            Err("no local repository to search".to_string())
        } else {
            let searched: Vec<String> = dirs.iter().map(|d| d.display().to_string()).collect();
            Err(format!("not found in {}", searched.join(", ")))
        }
    }
}

impl DependencyResolver for LayoutResolver {
    fn resolve(
        &mut self,
        repositories: &[RepositoryRef],
        coordinates: &[ModuleCoordinate],
    ) -> Result<Vec<Location>, ResolutionError> {
        let dirs = self.repository_dirs(repositories);
        coordinates
            .iter()
            .map(|coordinate| {
                self.locate(coordinate, &dirs)
                    .map(|jar| {
                        log::debug!("'{}' -> '{}'", coordinate, jar.display());
                        Location::new(jar)
                    })
                    .map_err(|reason| ResolutionError {
                        coordinate: coordinate.to_string(),
                        reason,
                    })
            })
            .collect()
    }
}

/// The highest version directory under `artifact_dir`.
fn latest_version(artifact_dir: &Path) -> Option<String> {
    fs::read_dir(artifact_dir)
        .ok()?
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .max_by(|a, b| compare_versions(a, b))
}

/// Compares dotted versions segment by segment, numerically where both
/// segments are numbers.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let split = |v: &str| -> Vec<String> {
        v.split(['.', '-']).map(str::to_string).collect()
    };
    let (left, right) = (split(a), split(b));
    for (x, y) in left.iter().zip(right.iter()) {
        let ordering = match (x.parse::<u64>(), y.parse::<u64>()) {
            (Ok(nx), Ok(ny)) => nx.cmp(&ny),
            _ => x.cmp(y),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    left.len().cmp(&right.len())
}
