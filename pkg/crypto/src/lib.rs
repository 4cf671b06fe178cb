use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::x509::{X509, X509Ref};
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod cert_expiry;
pub mod keystore;

pub use keystore::{open_keystore, provision, KeystoreError, KeystoreOutcome};

/// File extensions accepted as certificate containers (lowercase)
pub const RECOGNIZED_EXTENSIONS: [&str; 6] = ["p12", "pfx", "pem", "crt", "cer", "der"];

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Certificate error: {0}")]
    Cert(String),
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),
    #[error("{} is not a recognized certificate container (expected one of: {})", .0.display(), RECOGNIZED_EXTENSIONS.join(", "))]
    UnsupportedFormat(PathBuf),
}

/// Container format of a certificate source file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateFormat {
    /// PKCS#12 archive, unlocked with the keystore password
    Pkcs12,
    /// PEM certificates, optionally followed by a private key
    Pem,
    /// A single DER-encoded certificate
    Der,
}

impl CertificateFormat {
    /// Detect the format from the file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "p12" | "pfx" => Some(Self::Pkcs12),
            "pem" | "crt" | "cer" => Some(Self::Pem),
            "der" => Some(Self::Der),
            _ => None,
        }
    }
}

impl std::fmt::Display for CertificateFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pkcs12 => write!(f, "PKCS#12"),
            Self::Pem => write!(f, "PEM"),
            Self::Der => write!(f, "DER"),
        }
    }
}

/// Leaf certificate and optional private key read from a source file
pub struct CertificateBundle {
    format: CertificateFormat,
    certificate: X509,
    private_key: Option<PKey<Private>>,
    dropped_chain: usize,
}

impl CertificateBundle {
    pub fn format(&self) -> CertificateFormat {
        self.format
    }

    pub fn certificate(&self) -> &X509Ref {
        &self.certificate
    }

    pub fn private_key(&self) -> Option<&PKey<Private>> {
        self.private_key.as_ref()
    }

    /// Chain certificates present in the source but not carried over
    pub fn dropped_chain(&self) -> usize {
        self.dropped_chain
    }

    /// Friendly name attached to the certificate, if any
    pub fn alias(&self) -> Option<String> {
        self.certificate
            .alias()
            .map(|a| String::from_utf8_lossy(a).into_owned())
    }
}

/// Load certificate material from `path`
///
/// `password` unlocks PKCS#12 archives and encrypted PEM private keys; it is
/// ignored for unencrypted material.
///
/// # Errors
///
/// [`CryptoError::UnsupportedFormat`] for unknown extensions, [`CryptoError::Io`]
/// if the file cannot be read, [`CryptoError::Cert`] or
/// [`CryptoError::OpenSsl`] for malformed input or a wrong password.
pub fn load_certificate<P: AsRef<Path>>(
    path: P,
    password: &str,
) -> Result<CertificateBundle, CryptoError> {
    let path = path.as_ref();
    let format = CertificateFormat::from_path(path)
        .ok_or_else(|| CryptoError::UnsupportedFormat(path.to_path_buf()))?;
    let bytes = fs::read(path)?;

    match format {
        CertificateFormat::Pkcs12 => parse_pkcs12(&bytes, password),
        // .crt and .cer are as often DER as PEM
        CertificateFormat::Pem if !contains(&bytes, b"-----BEGIN") => parse_der(&bytes),
        CertificateFormat::Pem => parse_pem(&bytes, password),
        CertificateFormat::Der => parse_der(&bytes),
    }
}

fn parse_der(der: &[u8]) -> Result<CertificateBundle, CryptoError> {
    Ok(CertificateBundle {
        format: CertificateFormat::Der,
        certificate: X509::from_der(der)?,
        private_key: None,
        dropped_chain: 0,
    })
}

fn parse_pkcs12(der: &[u8], password: &str) -> Result<CertificateBundle, CryptoError> {
    let parsed = Pkcs12::from_der(der)?
        .parse2(password)
        .map_err(|e| CryptoError::Cert(format!("cannot open PKCS#12 archive (wrong password?): {e}")))?;

    let mut others: Vec<X509> = parsed
        .ca
        .map(|ca| ca.into_iter().collect())
        .unwrap_or_default();

    // Without a private key OpenSSL files every certificate under the chain
    let certificate = match parsed.cert {
        Some(cert) => cert,
        None if !others.is_empty() => others.remove(0),
        None => return Err(CryptoError::Cert("PKCS#12 archive holds no certificate".into())),
    };

    Ok(CertificateBundle {
        format: CertificateFormat::Pkcs12,
        certificate,
        private_key: parsed.pkey,
        dropped_chain: others.len(),
    })
}

fn parse_pem(pem: &[u8], password: &str) -> Result<CertificateBundle, CryptoError> {
    let mut reader = BufReader::new(pem);
    let ders = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| CryptoError::Cert("Failed to parse certificates".into()))?;

    let (leaf, chain) = ders
        .split_first()
        .ok_or_else(|| CryptoError::Cert("No certificate found".into()))?;
    let certificate = X509::from_der(leaf.as_ref())?;

    let private_key = if contains(pem, b"PRIVATE KEY-----") {
        let key = PKey::private_key_from_pem_passphrase(pem, password.as_bytes())
            .map_err(|e| CryptoError::Cert(format!("cannot read private key (wrong password?): {e}")))?;
        Some(key)
    } else {
        None
    };

    Ok(CertificateBundle {
        format: CertificateFormat::Pem,
        certificate,
        private_key,
        dropped_chain: chain.len(),
    })
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Generate a self-signed certificate and key in PEM form, for demos and tests
pub fn generate_self_signed(common_name: &str) -> Result<(String, String), CryptoError> {
    let mut params = rcgen::CertificateParams::new(vec![common_name.to_string()]);
    let mut dn = rcgen::DistinguishedName::new();
    dn.push(rcgen::DnType::CommonName, common_name);
    params.distinguished_name = dn;

    let cert =
        rcgen::Certificate::from_params(params).map_err(|e| CryptoError::Cert(e.to_string()))?;
    let cert_pem = cert
        .serialize_pem()
        .map_err(|e| CryptoError::Cert(e.to_string()))?;

    Ok((cert_pem, cert.serialize_private_key_pem()))
}

/// Generate a self-signed certificate packaged as a PKCS#12 archive
pub fn self_signed_pkcs12(common_name: &str, password: &str) -> Result<Vec<u8>, CryptoError> {
    let (cert_pem, key_pem) = generate_self_signed(common_name)?;
    let cert = X509::from_pem(cert_pem.as_bytes())?;
    let key = PKey::private_key_from_pem(key_pem.as_bytes())?;
    Ok(keystore::build_pkcs12(common_name, &cert, Some(&*key), password)?)
}
