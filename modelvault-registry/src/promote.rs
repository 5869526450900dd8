//! Best-model replacement.
//!
//! The new best folder is assembled in a staging directory next to the best
//! root and swapped in with renames:
//!
//! 1. copy the version folder to `.<best>.staging/<run_id>/`
//! 2. rename the current best root to `.<best>.previous`
//! 3. rename staging to the best root
//! 4. remove `.<best>.previous`
//!
//! `recover` finishes or rolls back a swap interrupted between those steps,
//! so the best root is never observed half-copied.

use std::path::{Path, PathBuf};

use modelvault_core::persistence::{copy_dir_all, remove_dir_if_exists};
use tracing::{debug, info, warn};

use crate::error::{RegistryError, Result};
use crate::run::RunId;

/// Sibling paths used while swapping the best root.
#[derive(Debug, Clone)]
pub(crate) struct SwapPaths {
    pub best_root: PathBuf,
    pub staging: PathBuf,
    pub previous: PathBuf,
}

impl SwapPaths {
    /// Paths for the best root `parent/name`.
    pub fn new(parent: &Path, name: &str) -> Self {
        Self {
            best_root: parent.join(name),
            staging: parent.join(format!(".{name}.staging")),
            previous: parent.join(format!(".{name}.previous")),
        }
    }

    /// Whether `path` equals, contains, or lies inside one of the swap paths.
    pub fn overlaps(&self, path: &Path) -> bool {
        [&self.best_root, &self.staging, &self.previous]
            .into_iter()
            .any(|swap| path.starts_with(swap) || swap.starts_with(path))
    }
}

/// Replace the best root with a copy of `version_dir` stored under `run_id`.
pub(crate) fn promote(paths: &SwapPaths, version_dir: &Path, run_id: &RunId) -> Result<()> {
    const OP: &str = "promote";

    remove_dir_if_exists(&paths.staging).map_err(RegistryError::io(OP, &paths.staging))?;
    let target = paths.staging.join(run_id);
    let copied = copy_dir_all(version_dir, &target).map_err(RegistryError::io(OP, &target))?;
    debug!(files = copied, staging = %target.display(), "Staged best model");

    if paths.best_root.exists() {
        remove_dir_if_exists(&paths.previous).map_err(RegistryError::io(OP, &paths.previous))?;
        std::fs::rename(&paths.best_root, &paths.previous)
            .map_err(RegistryError::io(OP, &paths.best_root))?;
    }
    std::fs::rename(&paths.staging, &paths.best_root)
        .map_err(RegistryError::io(OP, &paths.staging))?;
    remove_dir_if_exists(&paths.previous).map_err(RegistryError::io(OP, &paths.previous))?;

    info!(run_id = %run_id, best_root = %paths.best_root.display(), "Best model updated");
    Ok(())
}

/// Repair the leftovers of an interrupted `promote`.
///
/// Returns `true` when the best root had to be reinstated.
pub(crate) fn recover(paths: &SwapPaths) -> Result<bool> {
    const OP: &str = "recover";

    let mut reinstated = false;
    if !paths.best_root.exists() && paths.previous.exists() {
        // Interrupted between steps 2 and 3: staging is complete, finish the swap.
        if paths.staging.exists() {
            std::fs::rename(&paths.staging, &paths.best_root)
                .map_err(RegistryError::io(OP, &paths.staging))?;
            warn!(best_root = %paths.best_root.display(), "Completed interrupted best model promotion");
        } else {
            std::fs::rename(&paths.previous, &paths.best_root)
                .map_err(RegistryError::io(OP, &paths.previous))?;
            warn!(best_root = %paths.best_root.display(), "Restored previous best model");
        }
        reinstated = true;
    }

    remove_dir_if_exists(&paths.previous).map_err(RegistryError::io(OP, &paths.previous))?;
    remove_dir_if_exists(&paths.staging).map_err(RegistryError::io(OP, &paths.staging))?;
    Ok(reinstated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn version_dir(root: &Path, name: &str, content: &str) -> PathBuf {
        let dir = root.join("models").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("model.model"), content).unwrap();
        dir
    }

    #[test]
    fn test_swap_paths_are_hidden_siblings() {
        let paths = SwapPaths::new(Path::new("/srv/app"), "predictive_model");
        assert_eq!(paths.best_root, PathBuf::from("/srv/app/predictive_model"));
        assert_eq!(paths.staging, PathBuf::from("/srv/app/.predictive_model.staging"));
        assert_eq!(paths.previous, PathBuf::from("/srv/app/.predictive_model.previous"));
    }

    #[test]
    fn test_overlaps_detects_nesting_both_ways() {
        let paths = SwapPaths::new(Path::new("/srv/app"), "predictive_model");
        assert!(paths.overlaps(Path::new("/srv/app/predictive_model/history")));
        assert!(paths.overlaps(Path::new("/srv/app")));
        assert!(paths.overlaps(Path::new("/srv/app/.predictive_model.previous/models")));
        assert!(!paths.overlaps(Path::new("/srv/app/models")));
        assert!(!paths.overlaps(Path::new("/srv/app/predictive_model_v2")));
    }

    #[test]
    fn test_promote_replaces_wholesale() {
        let dir = TempDir::new().unwrap();
        let paths = SwapPaths::new(dir.path(), "predictive_model");

        let first = version_dir(dir.path(), "run_a", "a");
        promote(&paths, &first, &RunId::parse("run_a").unwrap()).unwrap();
        let second = version_dir(dir.path(), "run_b", "b");
        promote(&paths, &second, &RunId::parse("run_b").unwrap()).unwrap();

        let entries: Vec<_> = std::fs::read_dir(&paths.best_root)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(entries, vec!["run_b"]);
        assert_eq!(
            std::fs::read_to_string(paths.best_root.join("run_b").join("model.model")).unwrap(),
            "b"
        );
        assert!(!paths.staging.exists());
        assert!(!paths.previous.exists());
    }

    #[test]
    fn test_recover_completes_staged_swap() {
        let dir = TempDir::new().unwrap();
        let paths = SwapPaths::new(dir.path(), "predictive_model");
        std::fs::create_dir_all(paths.previous.join("old_run")).unwrap();
        std::fs::create_dir_all(paths.staging.join("new_run")).unwrap();

        assert!(recover(&paths).unwrap());
        assert!(paths.best_root.join("new_run").is_dir());
        assert!(!paths.previous.exists());
        assert!(!paths.staging.exists());
    }

    #[test]
    fn test_recover_restores_previous_without_staging() {
        let dir = TempDir::new().unwrap();
        let paths = SwapPaths::new(dir.path(), "predictive_model");
        std::fs::create_dir_all(paths.previous.join("old_run")).unwrap();

        assert!(recover(&paths).unwrap());
        assert!(paths.best_root.join("old_run").is_dir());
    }

    #[test]
    fn test_recover_discards_partial_staging() {
        let dir = TempDir::new().unwrap();
        let paths = SwapPaths::new(dir.path(), "predictive_model");
        std::fs::create_dir_all(paths.best_root.join("current")).unwrap();
        std::fs::create_dir_all(paths.staging.join("half_copied")).unwrap();

        assert!(!recover(&paths).unwrap());
        assert!(paths.best_root.join("current").is_dir());
        assert!(!paths.staging.exists());
    }
}
