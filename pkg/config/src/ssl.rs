//! Jetty SSL settings written into `start.d/ssl.ini`
//!
//! Only one certificate is managed, so the truststore points at the same
//! file as the keystore and every password-bearing key gets the same value.

use crate::properties;
use crate::ConfigError;
use std::path::Path;
use tracing::info;

pub const KEYSTORE_PATH_KEY: &str = "jetty.keystore";
pub const TRUSTSTORE_PATH_KEY: &str = "jetty.truststore";
pub const KEYSTORE_PASSWORD_KEY: &str = "jetty.keystore.password";
pub const TRUSTSTORE_PASSWORD_KEY: &str = "jetty.truststore.password";
pub const KEYMANAGER_PASSWORD_KEY: &str = "jetty.keymanager.password";

/// Every key the installer owns in ssl.ini
pub const MANAGED_KEYS: [&str; 5] = [
    KEYSTORE_PATH_KEY,
    TRUSTSTORE_PATH_KEY,
    KEYSTORE_PASSWORD_KEY,
    TRUSTSTORE_PASSWORD_KEY,
    KEYMANAGER_PASSWORD_KEY,
];

/// Store location as the server sees it, e.g. `/etc/keystore`
pub fn store_path(prefix: &str, keystore_name: &str) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), keystore_name)
}

/// The fixed update set for ssl.ini
pub fn ssl_updates(store_path: &str, password: &str) -> [(&'static str, String); 5] {
    [
        (KEYSTORE_PATH_KEY, store_path.to_string()),
        (TRUSTSTORE_PATH_KEY, store_path.to_string()),
        (KEYSTORE_PASSWORD_KEY, password.to_string()),
        (TRUSTSTORE_PASSWORD_KEY, password.to_string()),
        (KEYMANAGER_PASSWORD_KEY, password.to_string()),
    ]
}

/// Point the SSL configuration at `store_path`, unlocked by `password`
///
/// Returns the number of keys whose value changed.
///
/// # Errors
///
/// Propagates [`ConfigError::Read`] and [`ConfigError::Write`] from the
/// properties rewrite.
pub fn rewrite_ssl_config<P: AsRef<Path>>(
    ssl_config: P,
    store_path: &str,
    password: &str,
) -> Result<usize, ConfigError> {
    let ssl_config = ssl_config.as_ref();
    let changed = properties::rewrite(ssl_config, ssl_updates(store_path, password))?;
    info!(
        path = %ssl_config.display(),
        store = %store_path,
        changed,
        "SSL configuration updated"
    );
    Ok(changed)
}
