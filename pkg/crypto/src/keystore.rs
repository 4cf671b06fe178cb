//! PKCS#12 keystore provisioning
//!
//! The keystore is created once. An existing file at the destination is never
//! replaced: re-running against an install that already has a keystore leaves
//! it untouched, even when the certificate or password differ.

use crate::cert_expiry;
use crate::{load_certificate, CertificateBundle, CryptoError};
use openssl::error::ErrorStack;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKeyRef, Private};
use openssl::x509::X509Ref;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum KeystoreError {
    #[error("cannot load certificate from {}: {source}", .path.display())]
    Load { path: PathBuf, source: CryptoError },
    #[error("cannot build PKCS#12 keystore: {0}")]
    Build(#[from] ErrorStack),
    #[error("cannot write keystore {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("keystore path {} exists but is not a regular file", .0.display())]
    NotAFile(PathBuf),
}

/// What provisioning did to the destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeystoreOutcome {
    Created(PathBuf),
    /// A keystore was already there and was left as-is
    AlreadyPresent(PathBuf),
}

impl KeystoreOutcome {
    pub fn path(&self) -> &Path {
        match self {
            Self::Created(path) | Self::AlreadyPresent(path) => path,
        }
    }

    pub fn created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Package the certificate at `source` into a keystore at `destination`
///
/// The same `password` unlocks the source material and protects the new
/// keystore. The entry is stored under `alias`.
///
/// # Errors
///
/// [`KeystoreError::Load`] for unreadable or malformed source material,
/// [`KeystoreError::Build`] if OpenSSL cannot assemble the archive,
/// [`KeystoreError::Write`] if the keystore cannot be persisted,
/// [`KeystoreError::NotAFile`] if something other than a file is in the way.
pub fn provision(
    source: &Path,
    destination: &Path,
    alias: &str,
    password: &str,
) -> Result<KeystoreOutcome, KeystoreError> {
    match fs::metadata(destination) {
        Ok(meta) if meta.is_file() => {
            warn!(
                path = %destination.display(),
                "Keystore already exists, leaving it untouched; its contents may not match the new certificate"
            );
            return Ok(KeystoreOutcome::AlreadyPresent(destination.to_path_buf()));
        }
        Ok(_) => return Err(KeystoreError::NotAFile(destination.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(KeystoreError::Write {
                path: destination.to_path_buf(),
                source,
            })
        }
    }

    let bundle = load_certificate(source, password).map_err(|source_err| KeystoreError::Load {
        path: source.to_path_buf(),
        source: source_err,
    })?;
    log_bundle(source, &bundle);

    let der = build_pkcs12(alias, bundle.certificate(), bundle.private_key().map(|k| &**k), password)?;
    persist_new(destination, &der)
}

/// Open a keystore written by [`provision`]
///
/// # Errors
///
/// Fails if the file cannot be read or the password does not unlock it.
pub fn open_keystore<P: AsRef<Path>>(
    path: P,
    password: &str,
) -> Result<CertificateBundle, CryptoError> {
    let der = fs::read(path)?;
    crate::parse_pkcs12(&der, password)
}

/// Build a DER-encoded PKCS#12 archive holding one entry named `alias`
pub(crate) fn build_pkcs12(
    alias: &str,
    cert: &X509Ref,
    key: Option<&PKeyRef<Private>>,
    password: &str,
) -> Result<Vec<u8>, ErrorStack> {
    let mut builder = Pkcs12::builder();
    builder.name(alias).cert(cert);
    if let Some(key) = key {
        builder.pkey(key);
    }
    builder.build2(password)?.to_der()
}

fn log_bundle(source: &Path, bundle: &CertificateBundle) {
    let subject = cert_expiry::subject_common_name(bundle.certificate());
    info!(
        source = %source.display(),
        format = %bundle.format(),
        subject = subject.as_deref().unwrap_or("unknown"),
        has_private_key = bundle.private_key().is_some(),
        "Loaded certificate material"
    );

    if bundle.dropped_chain() > 0 {
        warn!(
            dropped = bundle.dropped_chain(),
            "Chain certificates are not carried into the keystore"
        );
    }

    match cert_expiry::expiry_status(bundle.certificate()) {
        Ok(status) if status.needs_attention() => {
            warn!(status = %status, "Certificate needs attention");
        }
        Ok(status) => debug!(status = %status, "Certificate validity"),
        Err(e) => warn!(error = %e, "Could not check certificate expiry"),
    }
}

/// Write `contents` to `destination` unless something is already there
fn persist_new(destination: &Path, contents: &[u8]) -> Result<KeystoreOutcome, KeystoreError> {
    let write_err = |source: io::Error| KeystoreError::Write {
        path: destination.to_path_buf(),
        source,
    };

    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut tmp = NamedTempFile::new_in(&dir).map_err(write_err)?;
    tmp.write_all(contents).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;

    match tmp.persist_noclobber(destination) {
        Ok(_) => {
            info!(path = %destination.display(), "Keystore created");
            Ok(KeystoreOutcome::Created(destination.to_path_buf()))
        }
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
            warn!(path = %destination.display(), "Keystore appeared while provisioning, leaving it untouched");
            Ok(KeystoreOutcome::AlreadyPresent(destination.to_path_buf()))
        }
        Err(e) => Err(write_err(e.error)),
    }
}
