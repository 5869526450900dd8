//! Key-value blob storage.
//!
//! The registry never talks to remote storage itself. Pipelines that want to
//! publish artifacts go through a `BlobStore`:
//! - `LocalBlobStore`: directory-backed store, keys map to relative paths.
//! - `InMemoryBlobStore`: in-memory store for testing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::BlobError;

/// Trait for blob storage backends.
pub trait BlobStore: Send + Sync {
    /// Store `data` under `key`, replacing any previous value.
    fn put(&self, key: &str, data: &[u8]) -> Result<(), BlobError>;

    /// Fetch the value stored under `key`.
    fn get(&self, key: &str) -> Result<Vec<u8>, BlobError>;

    /// Check whether `key` exists.
    fn exists(&self, key: &str) -> bool;

    /// Delete `key`. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), BlobError>;
}

/// Keys are `/`-separated relative paths without `.` or `..` segments.
fn validate_key(key: &str) -> Result<(), BlobError> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if invalid {
        return Err(BlobError::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(())
}

/// Directory-backed blob store.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, BlobError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

impl BlobStore for LocalBlobStore {
    fn put(&self, key: &str, data: &[u8]) -> Result<(), BlobError> {
        let path = self.path_for(key)?;
        crate::persistence::atomic_write(&path, data).map_err(|source| BlobError::Io {
            key: key.to_string(),
            source,
        })
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        let path = self.path_for(key)?;
        std::fs::read(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                BlobError::NotFound {
                    key: key.to_string(),
                }
            } else {
                BlobError::Io {
                    key: key.to_string(),
                    source,
                }
            }
        })
    }

    fn exists(&self, key: &str) -> bool {
        self.path_for(key).map(|p| p.is_file()).unwrap_or(false)
    }

    fn delete(&self, key: &str) -> Result<(), BlobError> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(BlobError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

/// In-memory blob store for testing.
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl BlobStore for InMemoryBlobStore {
    fn put(&self, key: &str, data: &[u8]) -> Result<(), BlobError> {
        validate_key(key)?;
        self.blobs
            .lock()
            .unwrap()
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        validate_key(key)?;
        self.blobs
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| BlobError::NotFound {
                key: key.to_string(),
            })
    }

    fn exists(&self, key: &str) -> bool {
        self.blobs.lock().unwrap().contains_key(key)
    }

    fn delete(&self, key: &str) -> Result<(), BlobError> {
        validate_key(key)?;
        self.blobs.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Upload every file under `dir` to `store` as `<prefix>/<relative path>`.
///
/// Returns the uploaded keys in sorted order.
pub fn upload_dir(store: &dyn BlobStore, dir: &Path, prefix: &str) -> Result<Vec<String>, BlobError> {
    let mut keys = Vec::new();
    upload_dir_inner(store, dir, prefix.trim_matches('/'), &mut keys)?;
    keys.sort();
    tracing::info!(dir = %dir.display(), uploaded = keys.len(), "Uploaded folder to blob store");
    Ok(keys)
}

fn upload_dir_inner(
    store: &dyn BlobStore,
    dir: &Path,
    prefix: &str,
    keys: &mut Vec<String>,
) -> Result<(), BlobError> {
    let io_err = |source: std::io::Error| BlobError::Io {
        key: prefix.to_string(),
        source,
    };
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let name = entry.file_name().to_string_lossy().to_string();
        let key = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };
        let path = entry.path();
        if path.is_dir() {
            upload_dir_inner(store, &path, &key, keys)?;
        } else {
            let data = std::fs::read(&path).map_err(|source| BlobError::Io {
                key: key.clone(),
                source,
            })?;
            store.put(&key, &data)?;
            keys.push(key);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_invalid_keys_rejected() {
        let store = InMemoryBlobStore::new();
        for key in ["", "/abs", "a/../b", "a//b", "./a", "a\\b"] {
            assert!(
                matches!(store.put(key, b"x"), Err(BlobError::InvalidKey { .. })),
                "key {key:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_in_memory_roundtrip_and_delete() {
        let store = InMemoryBlobStore::new();
        store.put("best/model.model", b"weights").unwrap();
        assert!(store.exists("best/model.model"));
        assert_eq!(store.get("best/model.model").unwrap(), b"weights");

        store.delete("best/model.model").unwrap();
        assert!(!store.exists("best/model.model"));
        assert!(matches!(
            store.get("best/model.model"),
            Err(BlobError::NotFound { .. })
        ));
    }

    #[test]
    fn test_local_store_writes_under_root() {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(dir.path());
        store.put("runs/2025/metrics.json", b"{}").unwrap();

        assert!(dir.path().join("runs/2025/metrics.json").is_file());
        assert_eq!(store.get("runs/2025/metrics.json").unwrap(), b"{}");
        assert!(matches!(
            store.get("runs/missing"),
            Err(BlobError::NotFound { .. })
        ));
        store.delete("runs/missing").unwrap();
    }

    #[test]
    fn test_upload_dir_prefixes_keys() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("version");
        std::fs::create_dir_all(src.join("extra")).unwrap();
        std::fs::write(src.join("model.model"), "m").unwrap();
        std::fs::write(src.join("extra").join("notes.txt"), "n").unwrap();

        let store = InMemoryBlobStore::new();
        let keys = upload_dir(&store, &src, "/best/").unwrap();

        assert_eq!(keys, vec!["best/extra/notes.txt", "best/model.model"]);
        assert_eq!(store.keys(), keys);
    }
}
