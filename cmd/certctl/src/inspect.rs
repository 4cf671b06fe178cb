use anyhow::{anyhow, Result};
use certctl_crypto::cert_expiry::{self, ExpiryStatus};
use certctl_crypto::{load_certificate, CertificateFormat};
use std::fmt;
use std::path::{Path, PathBuf};

/// Summary of a certificate container, read without touching any install
#[derive(Debug)]
pub struct CertificateReport {
    pub path: PathBuf,
    pub format: CertificateFormat,
    pub subject: Option<String>,
    pub has_private_key: bool,
    pub dropped_chain: usize,
    pub expiry: ExpiryStatus,
}

pub fn inspect(path: &Path, password: &str) -> Result<CertificateReport> {
    let bundle = load_certificate(path, password)
        .map_err(|e| anyhow!("Failed to load certificate {}: {e}", path.display()))?;
    let expiry = cert_expiry::expiry_status(bundle.certificate())
        .map_err(|e| anyhow!("Failed to read certificate validity: {e}"))?;

    Ok(CertificateReport {
        path: path.to_path_buf(),
        format: bundle.format(),
        subject: cert_expiry::subject_common_name(bundle.certificate()),
        has_private_key: bundle.private_key().is_some(),
        dropped_chain: bundle.dropped_chain(),
        expiry,
    })
}

impl fmt::Display for CertificateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "📜 Certificate Information\n")?;
        writeln!(f, "Path: {}", self.path.display())?;
        writeln!(f, "Format: {}", self.format)?;
        match &self.subject {
            Some(cn) => writeln!(f, "Subject: CN={cn}")?,
            None => writeln!(f, "Subject: (no common name)")?,
        }
        writeln!(
            f,
            "Private key: {}",
            if self.has_private_key { "present" } else { "absent" }
        )?;
        if self.dropped_chain > 0 {
            writeln!(
                f,
                "Chain: {} additional certificate(s), not installed",
                self.dropped_chain
            )?;
        }

        let marker = match self.expiry {
            ExpiryStatus::Expired { .. } => "❌",
            ExpiryStatus::ExpiringSoon { .. } => "⚠️ ",
            ExpiryStatus::Valid { .. } => "✅",
        };
        write!(f, "\n{marker} Status: {}", self.expiry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certctl_crypto::{generate_self_signed, self_signed_pkcs12};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_inspect_pkcs12() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("caat.p12");
        fs::write(&path, self_signed_pkcs12("caat.example.com", "changeit").unwrap()).unwrap();

        let report = inspect(&path, "changeit").unwrap();
        assert_eq!(report.format, CertificateFormat::Pkcs12);
        assert_eq!(report.subject.as_deref(), Some("caat.example.com"));
        assert!(report.has_private_key);
        assert!(matches!(report.expiry, ExpiryStatus::Valid { .. }));

        let text = report.to_string();
        assert!(text.contains("Subject: CN=caat.example.com"));
        assert!(text.contains("Private key: present"));
        assert!(text.contains("✅ Status: valid"));
    }

    #[test]
    fn test_inspect_pem_chain() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("chain.pem");
        let (leaf, _) = generate_self_signed("leaf.example.com").unwrap();
        let (other, _) = generate_self_signed("ca.example.com").unwrap();
        fs::write(&path, format!("{leaf}{other}")).unwrap();

        let report = inspect(&path, "").unwrap();
        assert!(!report.has_private_key);
        assert_eq!(report.dropped_chain, 1);
        assert!(report.to_string().contains("Chain: 1 additional certificate(s)"));
    }

    #[test]
    fn test_inspect_wrong_password() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("caat.p12");
        fs::write(&path, self_signed_pkcs12("caat.example.com", "changeit").unwrap()).unwrap();

        let err = inspect(&path, "wrong").unwrap_err();
        assert!(err.to_string().contains("Failed to load certificate"));
    }
}
