//! # modelvault-core
//!
//! Shared foundation for modelvault: layered configuration, project-root
//! detection, atomic persistence helpers, object-storage credentials, and
//! the blob store seam used to publish artifacts.

pub mod blob;
pub mod config;
pub mod credentials;
pub mod error;
pub mod persistence;
pub mod project;

pub use blob::{BlobStore, InMemoryBlobStore, LocalBlobStore};
pub use config::{load_config, RegistryConfig, StorageConfig, VaultConfig};
pub use credentials::StorageCredentials;
pub use error::{BlobError, ConfigError};
pub use project::resolve_project_root;
