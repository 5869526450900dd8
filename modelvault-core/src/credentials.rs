//! Object-storage credentials loaded from a dotenv-style file.
//!
//! The file is parsed with `dotenvy` without touching the process
//! environment. Each variable resolves from the file first, then from the
//! process environment. Loading fails fast when the file is absent or any
//! variable is missing or empty.

use std::collections::HashMap;
use std::path::Path;

use crate::error::ConfigError;

pub const ACCESS_KEY_VAR: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_KEY_VAR: &str = "AWS_SECRET_ACCESS_KEY";
pub const ENDPOINT_URL_VAR: &str = "AWS_ENDPOINT_URL";
pub const REGION_VAR: &str = "AWS_DEFAULT_REGION";

/// Credentials for an S3-compatible object store.
#[derive(Clone, PartialEq, Eq)]
pub struct StorageCredentials {
    pub access_key_id: String,
    secret_access_key: String,
    pub endpoint_url: String,
    pub region: String,
}

impl StorageCredentials {
    /// Load credentials from an env file, falling back to the process environment.
    pub fn from_env_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let parse_err = |e: dotenvy::Error| ConfigError::EnvFileParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        };
        let mut vars = HashMap::new();
        for item in dotenvy::from_path_iter(path).map_err(parse_err)? {
            let (key, value) = item.map_err(parse_err)?;
            vars.insert(key, value);
        }
        tracing::debug!(path = %path.display(), entries = vars.len(), "Parsed storage env file");

        Self::from_lookup(|var| vars.get(var).cloned().or_else(|| std::env::var(var).ok()))
    }

    /// Resolve credentials through an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let fetch = |var: &str| lookup(var).filter(|value| !value.trim().is_empty());

        let access_key_id = fetch(ACCESS_KEY_VAR);
        let secret_access_key = fetch(SECRET_KEY_VAR);
        let endpoint_url = fetch(ENDPOINT_URL_VAR);
        let region = fetch(REGION_VAR);

        match (access_key_id, secret_access_key, endpoint_url, region) {
            (Some(access_key_id), Some(secret_access_key), Some(endpoint_url), Some(region)) => {
                Ok(Self {
                    access_key_id,
                    secret_access_key,
                    endpoint_url,
                    region,
                })
            }
            (a, s, e, r) => {
                let missing: Vec<&str> = [
                    (a.is_none(), ACCESS_KEY_VAR),
                    (s.is_none(), SECRET_KEY_VAR),
                    (e.is_none(), ENDPOINT_URL_VAR),
                    (r.is_none(), REGION_VAR),
                ]
                .into_iter()
                .filter_map(|(absent, var)| absent.then_some(var))
                .collect();
                Err(ConfigError::EnvVarMissing {
                    var: missing.join(", "),
                })
            }
        }
    }

    /// The secret access key. Kept private so it never lands in `Debug` output.
    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }
}

impl std::fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("endpoint_url", &self.endpoint_url)
            .field("region", &self.region)
            .finish()
    }
}
