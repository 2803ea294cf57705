// src/core/paths.rs

use crate::constants::{
    COMPILE_STAMP_FILENAME, DEFAULT_REPOSITORY_DIR, DEFINITION_CLASSES_DIR, DEFINITION_FILENAME,
};
use crate::models::WorkAreas;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failures of path lookup and expansion.
#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not find the user's home directory.")]
    HomeDirNotFound,
    #[error("Failed to expand path '{path}': {reason}")]
    Expansion { path: String, reason: String },
    #[error("No '{}' found in '{}' or any parent directory.", DEFINITION_FILENAME, .start.display())]
    ProjectRootNotFound { start: PathBuf },
}

/// The local repository used when a build declares none (`~/.keel/repository`).
pub fn default_repository_dir() -> Result<PathBuf, PathError> {
    dirs::home_dir()
        .map(|home| home.join(DEFAULT_REPOSITORY_DIR))
        .ok_or(PathError::HomeDirNotFound)
}

/// Expands `~` and environment variables (`$VAR`, `${VAR}`) in a path.
pub fn expand_path(raw: &str) -> Result<PathBuf, PathError> {
    let expanded = shellexpand::full(raw).map_err(|e| PathError::Expansion {
        path: raw.to_string(),
        reason: e.to_string(),
    })?;
    Ok(PathBuf::from(expanded.into_owned()))
}

/// Walks up from `start` to the first directory holding a `keel.toml`.
pub fn find_project_root(start: &Path) -> Result<PathBuf, PathError> {
    start
        .ancestors()
        .find(|dir| dir.join(DEFINITION_FILENAME).is_file())
        .map(|dir| dunce::simplified(dir).to_path_buf())
        .ok_or_else(|| PathError::ProjectRootNotFound {
            start: start.to_path_buf(),
        })
}

/// Default compiler output directory inside the work area.
pub fn definition_classes_dir(areas: &WorkAreas) -> PathBuf {
    areas.work.join(DEFINITION_CLASSES_DIR)
}

pub fn compile_stamp_path(areas: &WorkAreas) -> PathBuf {
    areas.work.join(COMPILE_STAMP_FILENAME)
}
