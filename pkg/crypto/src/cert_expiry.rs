//! Certificate expiry checking utilities
//!
//! Used to warn operators before they install a certificate that is about to
//! lapse, and by `certctl inspect`.

use openssl::asn1::Asn1Time;
use openssl::error::ErrorStack;
use openssl::nid::Nid;
use openssl::x509::X509Ref;

/// Certificates expiring within this many days are reported as expiring soon
pub const EXPIRY_WARNING_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryStatus {
    Expired { days_ago: i64 },
    ExpiringSoon { days: i64 },
    Valid { days: i64 },
}

impl ExpiryStatus {
    pub fn from_days_remaining(days: i64) -> Self {
        if days < 0 {
            Self::Expired { days_ago: -days }
        } else if days < EXPIRY_WARNING_DAYS {
            Self::ExpiringSoon { days }
        } else {
            Self::Valid { days }
        }
    }

    pub fn needs_attention(&self) -> bool {
        !matches!(self, Self::Valid { .. })
    }
}

impl std::fmt::Display for ExpiryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Expired { days_ago } => write!(f, "EXPIRED ({days_ago} days ago)"),
            Self::ExpiringSoon { days } => write!(f, "expires in {days} days"),
            Self::Valid { days } => write!(f, "valid ({days} days remaining)"),
        }
    }
}

/// Whole days until the certificate's notAfter, rounded down
///
/// Negative once expired: a certificate that lapsed an hour ago is at -1.
pub fn days_until_expiry(cert: &X509Ref) -> Result<i64, ErrorStack> {
    let now = Asn1Time::days_from_now(0)?;
    let diff = now.diff(cert.not_after())?;
    // days and secs share a sign; a negative remainder is part of a day past
    let days = i64::from(diff.days);
    Ok(if diff.secs < 0 { days - 1 } else { days })
}

pub fn expiry_status(cert: &X509Ref) -> Result<ExpiryStatus, ErrorStack> {
    days_until_expiry(cert).map(ExpiryStatus::from_days_remaining)
}

/// Subject common name, if the certificate carries one
pub fn subject_common_name(cert: &X509Ref) -> Option<String> {
    cert.subject_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|entry| entry.data().as_utf8().ok())
        .map(|cn| cn.to_string())
}
