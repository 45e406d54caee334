//! Secret configuration file storage.
//!
//! Provides read-only loading of secret configuration from
//! `~/.config/docchat/secret.json`.

use docchat_core::config::SecretConfig;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during secret storage operations.
#[derive(Debug, Error)]
pub enum SecretStorageError {
    /// Configuration file not found.
    #[error("Configuration file not found at: {0}")]
    NotFound(PathBuf),
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// Config directory not found.
    #[error("Could not determine home directory")]
    ConfigDirNotFound,
}

/// Read-only storage for the secret configuration file (secret.json).
///
/// Does not write, validate credentials, or handle encryption; the file is
/// plaintext JSON and should carry restrictive permissions.
pub struct SecretStorage {
    path: PathBuf,
}

impl SecretStorage {
    /// Creates a storage pointing at the default path
    /// (`~/.config/docchat/secret.json`).
    pub fn new() -> Result<Self, SecretStorageError> {
        let config_dir = dirs::config_dir().ok_or(SecretStorageError::ConfigDirNotFound)?;
        Ok(Self {
            path: config_dir.join("docchat").join("secret.json"),
        })
    }

    /// Creates a storage with a custom path (for testing).
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Loads and parses the secret configuration.
    pub fn load(&self) -> Result<SecretConfig, SecretStorageError> {
        if !self.path.exists() {
            return Err(SecretStorageError::NotFound(self.path.clone()));
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}
