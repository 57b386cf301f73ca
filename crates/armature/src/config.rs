//! Resolver configuration.
//!
//! Configuration is read from a TOML file with camelCase keys, then
//! environment overrides are applied:
//!
//! | variable | field |
//! |----------|-------|
//! | `ARMATURE_REGISTRY_ENABLED` | `registryEnabled` |
//! | `ARMATURE_CACHE_DIR` | `cacheDir` |
//!
//! ```toml
//! registryEnabled = true
//! cacheDir = "/var/cache/armature"
//! insecureRegistries = ["localhost:5000"]
//!
//! [credentials."registry.example.com"]
//! username = "robot"
//! password = "..."
//! ```

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use armature_registry_oci::{RegistryCredentials, default_cache_dir};

use crate::error::{Error, Result};

/// Environment variable toggling remote registries.
pub const REGISTRY_ENABLED_ENV: &str = "ARMATURE_REGISTRY_ENABLED";

/// Environment variable overriding the module cache directory.
pub const CACHE_DIR_ENV: &str = "ARMATURE_CACHE_DIR";

/// Module resolver configuration.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Whether `oci:` and `ts:` references are recognized.
    pub registry_enabled: bool,
    /// Root of the restored module cache.
    pub cache_dir: PathBuf,
    /// Registries contacted over plain HTTP.
    pub insecure_registries: Vec<String>,
    /// Credentials keyed by registry host.
    pub credentials: HashMap<String, Credentials>,
}

/// Credentials for one registry.
#[derive(Debug, Deserialize)]
pub struct Credentials {
    /// Registry username.
    pub username: String,
    /// Registry password or token.
    #[serde(deserialize_with = "deserialize_secret")]
    pub password: SecretString,
}

fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry_enabled: true,
            cache_dir: default_cache_dir(),
            insecure_registries: Vec::new(),
            credentials: HashMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from an optional file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Read configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| Error::io(e, path, "reading config file"))?;
        let config = toml::from_str(&content).map_err(|e| Error::Toml {
            source: e,
            path: Some(path.to_path_buf()),
        })?;
        debug!(?path, "Loaded configuration");
        Ok(config)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Toml {
            source: e,
            path: None,
        })
    }

    /// Apply `ARMATURE_*` environment overrides.
    ///
    /// Empty values are ignored.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(value) = env_value(REGISTRY_ENABLED_ENV) {
            self.registry_enabled = parse_bool(&value).ok_or_else(|| {
                Error::configuration(format!(
                    "{REGISTRY_ENABLED_ENV} must be true or false, got '{value}'"
                ))
            })?;
        }
        if let Some(value) = env_value(CACHE_DIR_ENV) {
            self.cache_dir = PathBuf::from(value);
        }
        Ok(())
    }

    /// Credentials in the form the OCI client factory takes.
    #[must_use]
    pub fn registry_credentials(&self) -> HashMap<String, RegistryCredentials> {
        self.credentials
            .iter()
            .map(|(registry, creds)| {
                (
                    registry.clone(),
                    RegistryCredentials {
                        username: creds.username.clone(),
                        password: SecretString::from(creds.password.expose_secret().to_owned()),
                    },
                )
            })
            .collect()
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
