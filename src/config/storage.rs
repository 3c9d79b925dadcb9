//! History store configuration

use serde::Deserialize;
use std::path::PathBuf;

use super::error::ValidationError;

/// Where and how project stores are kept
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one store file per project
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Refuse to open stores whose schema version marker differs
    #[serde(default)]
    pub strict_version_check: bool,

    /// Store file extension, without the dot
    #[serde(default = "default_file_extension")]
    pub file_extension: String,
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.root.as_os_str().is_empty() {
            return Err(ValidationError::EmptyStorageRoot);
        }
        let ext = &self.file_extension;
        if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ValidationError::InvalidFileExtension(ext.clone()));
        }
        Ok(())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            strict_version_check: false,
            file_extension: default_file_extension(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("./vault/projects")
}

fn default_file_extension() -> String {
    "projectdb".to_string()
}
