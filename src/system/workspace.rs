// src/system/workspace.rs

use crate::core::command_queue::WorkspaceCleaner;
use crate::models::WorkArea;
use std::fs;
use std::io;
use std::path::Path;

/// Empties work and output areas on disk. The directories themselves are kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsCleaner;

impl WorkspaceCleaner for FsCleaner {
    fn clean(&mut self, area: WorkArea, path: &Path) -> io::Result<()> {
        if !path.exists() {
            log::debug!("{:?} area '{}' does not exist; nothing to clean.", area, path.display());
            return Ok(());
        }
        let mut removed = 0usize;
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let entry_path = entry.path();
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(&entry_path)?;
            } else {
                fs::remove_file(&entry_path)?;
            }
            removed += 1;
        }
        log::debug!("Removed {} entries from '{}'.", removed, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_clean_empties_but_keeps_the_area() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let area = dir.path().join("keel-output");
        fs::create_dir_all(area.join("classes/nested")).unwrap();
        fs::write(area.join("report.txt"), "x").unwrap();

        // --- Execute ---
        FsCleaner.clean(WorkArea::Output, &area).unwrap();

        // --- Assert ---
        assert!(area.is_dir());
        assert_eq!(fs::read_dir(&area).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_area_is_fine() {
        let dir = tempdir().unwrap();
        assert!(FsCleaner.clean(WorkArea::Work, &dir.path().join("none")).is_ok());
    }
}
