//! Error types shared across modelvault crates.
//!
//! Configuration problems are fatal and surface at construction time.
//! Blob store errors cover the key-value storage seam.

use std::path::PathBuf;

/// Errors from the configuration system and credential loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Failed to parse environment file {path}: {message}")]
    EnvFileParse { path: PathBuf, message: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration load error: {0}")]
    Load(#[from] Box<figment::Error>),
}

/// Errors from blob store operations.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("Invalid blob key: {key}")]
    InvalidKey { key: String },

    #[error("Blob not found: {key}")]
    NotFound { key: String },

    #[error("Blob IO error for '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}
