//! Validated install parameters

use crate::workflow::InstallError;
use certctl_config::{is_bare_file_name, InstallerConfig};
use certctl_crypto::{CertificateFormat, RECOGNIZED_EXTENSIONS};
use secrecy::{ExposeSecret, SecretString};
use std::fs;
use std::path::{Path, PathBuf};

/// Everything one install run needs, checked before any mutation
#[derive(Debug)]
pub struct InstallParameters {
    cert_path: PathBuf,
    install_root: PathBuf,
    password: SecretString,
    alias: String,
    keystore_name: String,
}

impl InstallParameters {
    /// Validate raw operator input
    ///
    /// An absent or blank `alias` falls back to `defaults.default_alias`, an
    /// absent `keystore_name` to `defaults.keystore_name`. Only the
    /// certificate file is inspected; the install root is checked when the
    /// layout is resolved.
    pub fn new(
        cert_path: impl Into<PathBuf>,
        install_root: impl Into<PathBuf>,
        password: SecretString,
        alias: Option<&str>,
        keystore_name: Option<&str>,
        defaults: &InstallerConfig,
    ) -> Result<Self, InstallError> {
        let cert_path = cert_path.into();
        let install_root = install_root.into();

        if cert_path.as_os_str().is_empty() {
            return Err(invalid("certificate path is required"));
        }
        if install_root.as_os_str().is_empty() {
            return Err(invalid("install directory is required"));
        }
        if password.expose_secret().is_empty() {
            return Err(invalid("keystore password must not be empty"));
        }

        let alias = match alias.map(str::trim) {
            Some(alias) if !alias.is_empty() => alias.to_string(),
            _ => defaults.default_alias.clone(),
        };

        let keystore_name = keystore_name
            .map(str::to_string)
            .unwrap_or_else(|| defaults.keystore_name.clone());
        if !is_bare_file_name(&keystore_name) {
            return Err(invalid(format!(
                "keystore name must be a plain file name, got {keystore_name:?}"
            )));
        }

        check_certificate(&cert_path)?;

        Ok(Self {
            cert_path,
            install_root,
            password,
            alias,
            keystore_name,
        })
    }

    pub fn cert_path(&self) -> &Path {
        &self.cert_path
    }

    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    pub fn password(&self) -> &SecretString {
        &self.password
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn keystore_name(&self) -> &str {
        &self.keystore_name
    }
}

fn check_certificate(path: &Path) -> Result<(), InstallError> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => {
            return Err(invalid(format!(
                "certificate {} is not a regular file",
                path.display()
            )))
        }
        Err(e) => {
            return Err(invalid(format!(
                "certificate {} cannot be read: {e}",
                path.display()
            )))
        }
    }

    if CertificateFormat::from_path(path).is_none() {
        return Err(invalid(format!(
            "certificate {} has an unrecognized extension (expected one of: {})",
            path.display(),
            RECOGNIZED_EXTENSIONS.join(", ")
        )));
    }
    Ok(())
}

fn invalid(reason: impl Into<String>) -> InstallError {
    InstallError::InvalidInput(reason.into())
}
