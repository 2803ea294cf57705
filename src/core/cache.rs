// src/core/cache.rs
//
// Up-to-date tracking of build-definition compilation.

use crate::models::Location;
use anyhow::{Context, Result, anyhow};
use log::debug;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use walkdir::WalkDir;

const HASH_TRUNCATE_LENGTH: usize = 16; // 16 bytes = 32 hex characters

/// What a successful compilation produced, keyed by the fingerprint of its inputs.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CompileStamp {
    pub fingerprint: String,
    pub outputs: Vec<Location>,
}

/// Hashes every input of a compilation: the source files (relative path and
/// content, in path order), the options and the classpath.
///
/// # Errors
/// Returns an I/O error if a source file cannot be read.
pub fn fingerprint(source_root: &Path, options: &[String], classpath: &[Location]) -> Result<String> {
    let mut hasher = blake3::Hasher::new();

    let mut files: Vec<_> = WalkDir::new(source_root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();
    files.sort();

    for file in &files {
        let relative = file.strip_prefix(source_root).unwrap_or(file);
        hasher.update(relative.to_string_lossy().as_bytes());
        hasher.update(&[0]);
        let content = fs::read(file)
            .with_context(|| format!("Failed to read source file '{}'", file.display()))?;
        hasher.update(&content);
        hasher.update(&[0]);
    }
    for option in options {
        hasher.update(option.as_bytes());
        hasher.update(&[0]);
    }
    for location in classpath {
        hasher.update(location.to_string().as_bytes());
        hasher.update(&[0]);
    }

    let hash = hasher.finalize();
    let fingerprint = hex::encode(hash.as_bytes().get(..HASH_TRUNCATE_LENGTH).unwrap_or_default());
    debug!(
        "Fingerprint of '{}' ({} file(s)): {}",
        source_root.display(),
        files.len(),
        fingerprint
    );
    Ok(fingerprint)
}

/// Reads a stamp. A missing file is `Ok(None)`.
pub fn read_stamp(path: &Path) -> Result<Option<CompileStamp>> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path)
        .with_context(|| format!("Failed to read compile stamp at '{}'", path.display()))?;
    if bytes.is_empty() {
        return Err(anyhow!("Compile stamp '{}' is empty.", path.display()));
    }
    let (stamp, _): (CompileStamp, usize) =
        bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
            .context("Failed to decode compile stamp. It is likely from an incompatible version of `keel`.")?;
    Ok(Some(stamp))
}

/// Writes a stamp, creating its directory if needed.
pub fn write_stamp(path: &Path, stamp: &CompileStamp) -> Result<()> {
    if let Some(parent_dir) = path.parent() {
        fs::create_dir_all(parent_dir).with_context(|| {
            format!("Failed to create stamp directory '{}'", parent_dir.display())
        })?;
    }
    let bytes = bincode::serde::encode_to_vec(stamp, bincode::config::standard())
        .context("Failed to encode compile stamp.")?;
    fs::write(path, &bytes)
        .with_context(|| format!("Failed to write compile stamp to '{}'", path.display()))?;
    Ok(())
}

/// The recorded outputs if `fingerprint` matches the stamp at `path` and every
/// recorded output still exists. An unreadable stamp counts as stale.
pub fn up_to_date_outputs(path: &Path, fingerprint: &str) -> Option<Vec<Location>> {
    match read_stamp(path) {
        Ok(Some(stamp)) if stamp.fingerprint == fingerprint => {
            if let Some(missing) = stamp.outputs.iter().find(|o| !o.path().exists()) {
                debug!("Compile output '{}' is gone; stamp is stale.", missing);
                return None;
            }
            Some(stamp.outputs)
        }
        Ok(_) => None,
        Err(e) => {
            debug!("Ignoring unreadable compile stamp: {:#}", e);
            None
        }
    }
}
