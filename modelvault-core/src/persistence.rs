//! Filesystem helpers: atomic file writes and folder copy/removal.
//!
//! Every file the registry writes goes through `atomic_write` (write a
//! sibling `.tmp` file, then rename), so a reader never observes a
//! half-written model blob or metrics file.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

/// Atomically write raw bytes to a file.
///
/// Writes to `<file name>.tmp` next to the target, then renames over it.
/// Creates parent directories if they don't exist.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = tmp_sibling(path);
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Recursively copy the contents of `src` into `dst`.
///
/// `dst` is created if missing; existing files with the same name are
/// overwritten. Symlinks are copied as the files they point to.
pub fn copy_dir_all(src: &Path, dst: &Path) -> io::Result<u64> {
    std::fs::create_dir_all(dst)?;
    let mut copied = 0;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.path().is_dir() {
            copied += copy_dir_all(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Remove a directory tree, treating an already-missing directory as success.
pub fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("data"));
    name.push(".tmp");
    path.with_file_name(name)
}
