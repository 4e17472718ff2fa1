//! Configuration for building a [`SaveEngine`](crate::SaveEngine)
//!
//! The configuration selects where slots are stored, the default cipher and password,
//! and how many worker threads a dedicated pool gets. It can be built in code, read
//! from a JSON file or taken from `KEEPSAKE_*` environment variables.

use crate::cipher::CipherAlgorithm;
use crate::{KeepsakeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the slot directory
pub const ENV_DIR: &str = "KEEPSAKE_DIR";
/// Environment variable naming the cipher algorithm
pub const ENV_CIPHER: &str = "KEEPSAKE_CIPHER";
/// Environment variable holding the default password
pub const ENV_PASSWORD: &str = "KEEPSAKE_PASSWORD";
/// Environment variable with the worker thread count
pub const ENV_WORKERS: &str = "KEEPSAKE_WORKERS";

/// Default cipher and password applied to every request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    pub algorithm: CipherAlgorithm,
    pub password: Option<String>,
}

impl EncryptionConfig {
    /// No cipher
    pub fn none() -> Self {
        Self::default()
    }

    /// XOR obfuscation with a default password
    pub fn xor(password: impl Into<String>) -> Self {
        Self {
            algorithm: CipherAlgorithm::Xor,
            password: Some(password.into()),
        }
    }

    /// Password to use for one request: the request's own, else the default
    pub fn resolve_password<'a>(&'a self, request: Option<&'a str>) -> Option<&'a str> {
        request.or(self.password.as_deref())
    }
}

/// Where and how slots are stored on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the slot files
    pub base_path: PathBuf,
    /// Attempts per file operation before an I/O error is reported
    pub retry_attempts: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("./saves"),
            retry_attempts: 3,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub storage: StorageConfig,
    pub encryption: EncryptionConfig,
    /// Worker threads for a dedicated pool; `None` uses one per CPU
    pub worker_threads: Option<usize>,
    /// Write indented JSON records
    pub pretty_records: bool,
}

impl EngineConfig {
    /// Local storage rooted at `base_path`, no cipher
    pub fn local<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            storage: StorageConfig {
                base_path: base_path.as_ref().to_path_buf(),
                ..StorageConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn with_encryption(mut self, encryption: EncryptionConfig) -> Self {
        self.encryption = encryption;
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    /// Read a JSON configuration file and validate it
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from `KEEPSAKE_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(dir) = lookup(ENV_DIR) {
            config.storage.base_path = PathBuf::from(dir);
        }
        if let Some(cipher) = lookup(ENV_CIPHER) {
            config.encryption.algorithm = cipher.parse()?;
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            config.encryption.password = Some(password);
        }
        if let Some(workers) = lookup(ENV_WORKERS) {
            let threads = workers.trim().parse::<usize>().map_err(|e| {
                KeepsakeError::validation(format!("{ENV_WORKERS}='{workers}' is not a number: {e}"))
            })?;
            config.worker_threads = Some(threads);
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.storage.base_path.as_os_str().is_empty() {
            return Err(KeepsakeError::validation("storage base path must not be empty"));
        }
        if self.storage.retry_attempts == 0 {
            return Err(KeepsakeError::validation("retry_attempts must be at least 1"));
        }
        if self.worker_threads == Some(0) {
            return Err(KeepsakeError::validation("worker_threads must be at least 1"));
        }
        Ok(())
    }
}
