//! Install layout, properties rewriting and operator defaults for certctl.

use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod layout;
pub mod properties;
pub mod ssl;

pub use layout::{InstallLayout, LayoutError};
pub use properties::{Encoding, Properties};

/// Alias used for the keystore entry when the operator does not supply one
pub const DEFAULT_ALIAS: &str = "contentanalyst";
/// File name of the keystore inside the install's configuration directory
pub const DEFAULT_KEYSTORE_NAME: &str = "keystore";
/// Directory written in front of the keystore name in ssl.ini
pub const DEFAULT_STORE_PATH_PREFIX: &str = "/etc";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Operator defaults, optionally loaded from a YAML file
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct InstallerConfig {
    /// Alias used when `--alias` is absent or empty
    pub default_alias: String,
    /// Keystore file name used when `--keystore-name` is absent
    pub keystore_name: String,
    /// Directory written into ssl.ini in front of the keystore name
    pub store_path_prefix: String,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            default_alias: DEFAULT_ALIAS.to_string(),
            keystore_name: DEFAULT_KEYSTORE_NAME.to_string(),
            store_path_prefix: DEFAULT_STORE_PATH_PREFIX.to_string(),
        }
    }
}

impl InstallerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config: Self = serde_yaml::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_alias.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "default_alias must not be empty".to_string(),
            ));
        }
        if !is_bare_file_name(&self.keystore_name) {
            return Err(ConfigError::Invalid(format!(
                "keystore_name must be a plain file name, got {:?}",
                self.keystore_name
            )));
        }
        if !self.store_path_prefix.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "store_path_prefix must be absolute, got {:?}",
                self.store_path_prefix
            )));
        }
        Ok(())
    }
}

/// True when `name` is usable as a single path component
pub fn is_bare_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains('\0')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = InstallerConfig::default();
        assert_eq!(config.default_alias, "contentanalyst");
        assert_eq!(config.keystore_name, "keystore");
        assert_eq!(config.store_path_prefix, "/etc");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_config() {
        let yaml = "keystore_name: caat-keystore\n";
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", yaml).unwrap();

        let config = InstallerConfig::load(file.path()).unwrap();
        assert_eq!(config.keystore_name, "caat-keystore");
        assert_eq!(config.default_alias, DEFAULT_ALIAS);
        assert_eq!(config.store_path_prefix, DEFAULT_STORE_PATH_PREFIX);
    }

    #[test]
    fn test_load_rejects_unknown_fields() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "keystore_password: hunter2\n").unwrap();

        let result = InstallerConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_load_rejects_nested_keystore_name() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "keystore_name: ../keystore\n").unwrap();

        let result = InstallerConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_rejects_relative_prefix() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "store_path_prefix: etc\n").unwrap();

        let result = InstallerConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = InstallerConfig::load("/nonexistent/path/certctl.yaml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_bare_file_name() {
        assert!(is_bare_file_name("keystore"));
        assert!(is_bare_file_name("keystore.p12"));
        assert!(!is_bare_file_name(""));
        assert!(!is_bare_file_name(".."));
        assert!(!is_bare_file_name("etc/keystore"));
        assert!(!is_bare_file_name("etc\\keystore"));
    }
}
