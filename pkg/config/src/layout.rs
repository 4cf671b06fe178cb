//! Install layout resolution
//!
//! Every path the installer touches is derived from the install root by a
//! fixed relative suffix. Resolution only inspects the filesystem.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// SSL configuration file, relative to the install root
pub const SSL_CONFIG_SUFFIX: &str = "start.d/ssl.ini";
/// Directory holding installed certificates, relative to the install root
pub const SSL_CERT_DIR_SUFFIX: &str = "etc/ssl";
/// Generic configuration directory, relative to the install root
pub const CONFIG_DIR_SUFFIX: &str = "etc";

#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("install root {} does not exist", .0.display())]
    MissingRoot(PathBuf),
    #[error("install root {} is not a directory", .0.display())]
    RootNotDirectory(PathBuf),
    #[error("required directory {} does not exist", .0.display())]
    MissingDirectory(PathBuf),
    #[error("{} exists but is not a directory", .0.display())]
    NotDirectory(PathBuf),
    #[error("required file {} does not exist", .0.display())]
    MissingFile(PathBuf),
    #[error("{} exists but is not a regular file", .0.display())]
    NotFile(PathBuf),
    #[error("cannot inspect {}: {source}", .path.display())]
    Inspect { path: PathBuf, source: io::Error },
}

/// Resolved paths of a validated install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    root: PathBuf,
    ssl_config: PathBuf,
    ssl_cert_dir: PathBuf,
    config_dir: PathBuf,
}

impl InstallLayout {
    /// Compute the layout for `root` without touching the filesystem
    pub fn for_root<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            ssl_config: root.join(SSL_CONFIG_SUFFIX),
            ssl_cert_dir: root.join(SSL_CERT_DIR_SUFFIX),
            config_dir: root.join(CONFIG_DIR_SUFFIX),
            root,
        }
    }

    /// Resolve and validate the layout beneath `root`
    ///
    /// # Errors
    ///
    /// Returns a [`LayoutError`] naming the first path that is missing or of
    /// the wrong kind.
    pub fn resolve<P: AsRef<Path>>(root: P) -> Result<Self, LayoutError> {
        let layout = Self::for_root(root);

        match fs::metadata(&layout.root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(LayoutError::RootNotDirectory(layout.root)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(LayoutError::MissingRoot(layout.root))
            }
            Err(source) => {
                return Err(LayoutError::Inspect {
                    path: layout.root,
                    source,
                })
            }
        }

        require_dir(&layout.ssl_cert_dir)?;
        require_dir(&layout.config_dir)?;
        require_file(&layout.ssl_config)?;

        debug!(root = %layout.root.display(), "Install layout resolved");
        Ok(layout)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ssl_config(&self) -> &Path {
        &self.ssl_config
    }

    pub fn ssl_cert_dir(&self) -> &Path {
        &self.ssl_cert_dir
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}

fn require_dir(path: &Path) -> Result<(), LayoutError> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(LayoutError::NotDirectory(path.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(LayoutError::MissingDirectory(path.to_path_buf()))
        }
        Err(source) => Err(LayoutError::Inspect {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn require_file(path: &Path) -> Result<(), LayoutError> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(LayoutError::NotFile(path.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(LayoutError::MissingFile(path.to_path_buf()))
        }
        Err(source) => Err(LayoutError::Inspect {
            path: path.to_path_buf(),
            source,
        }),
    }
}
