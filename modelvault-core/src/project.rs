//! Project root detection.
//!
//! Registry folders are resolved relative to the project root, which is the
//! nearest ancestor carrying one of the known markers.

use std::path::{Path, PathBuf};

use crate::config::CONFIG_DIR;

/// Markers checked in order at each ancestor.
const ROOT_MARKERS: &[&str] = &[CONFIG_DIR, ".git", "Cargo.toml", "pyproject.toml", "setup.py"];

/// Walk up from `start` and return the first directory containing a root marker.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| ROOT_MARKERS.iter().any(|marker| dir.join(marker).exists()))
        .map(Path::to_path_buf)
}

/// Resolve the project root, falling back to `start` itself.
pub fn resolve_project_root(start: &Path) -> PathBuf {
    let start = start
        .canonicalize()
        .unwrap_or_else(|_| start.to_path_buf());
    find_project_root(&start).unwrap_or(start)
}
