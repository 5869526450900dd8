//! Error types for the model registry.
//!
//! Filesystem and serialization failures carry the registry operation that
//! hit them and the path involved, plus the original cause as `source`.
//! Absence (no best model, no metrics file, no blob) is never an error.

use std::path::PathBuf;

use modelvault_core::ConfigError;

/// Top-level error type for registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("{op} failed on {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{op} could not serialize {path}: {source}")]
    Serialization {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Best model root {root} holds {} folders, expected at most one: {}", .entries.len(), .entries.join(", "))]
    AmbiguousBest { root: PathBuf, entries: Vec<String> },

    #[error("Folder {folder} holds {count} '.{extension}' files, expected at most one")]
    AmbiguousArtifact {
        folder: PathBuf,
        extension: &'static str,
        count: usize,
    },

    #[error("Versions root {versions_root} overlaps best model root {best_root}")]
    OverlappingRoots {
        versions_root: PathBuf,
        best_root: PathBuf,
    },

    #[error("Metric '{key}' is not a finite number: {value}")]
    NonFiniteMetric { key: String, value: f64 },

    #[error("Invalid run id: '{value}'")]
    InvalidRunId { value: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl RegistryError {
    /// Build a `map_err` adapter for IO failures of `op` on `path`.
    pub(crate) fn io(
        op: &'static str,
        path: impl Into<PathBuf>,
    ) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { op, path, source }
    }

    /// Build a `map_err` adapter for (de)serialization failures of `op` on `path`.
    pub(crate) fn serde(
        op: &'static str,
        path: impl Into<PathBuf>,
    ) -> impl FnOnce(serde_json::Error) -> Self {
        let path = path.into();
        move |source| Self::Serialization { op, path, source }
    }
}

/// A type alias for results using `RegistryError`.
pub type Result<T> = std::result::Result<T, RegistryError>;
