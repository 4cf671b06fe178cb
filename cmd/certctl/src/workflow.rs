//! Install workflow
//!
//! Runs the install steps in order against one install root:
//! - resolve and validate the layout
//! - stage the certificate into `etc/ssl`
//! - provision the keystore in `etc` (skipped if one exists)
//! - point `start.d/ssl.ini` at the keystore
//!
//! A failing step stops the run. Nothing is rolled back; running again
//! converges because every step is safe to repeat.

use crate::params::InstallParameters;
use crate::stage::stage;
use crate::telemetry::{PhaseMetrics, PhaseTracker};
use certctl_config::ssl::{self, MANAGED_KEYS};
use certctl_config::{ConfigError, InstallLayout, InstallerConfig, LayoutError};
use certctl_crypto::{KeystoreError, KeystoreOutcome};
use secrecy::ExposeSecret;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid install: {0}")]
    InvalidInstall(#[from] LayoutError),
    #[error("staging certificate {} failed: {source}", .path.display())]
    IoFailure { path: PathBuf, source: io::Error },
    #[error("keystore provisioning failed: {0}")]
    KeystoreFailure(#[from] KeystoreError),
    #[error("SSL configuration update failed: {0}")]
    ConfigFailure(#[from] ConfigError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    Start,
    LayoutResolved,
    CertStaged,
    KeystoreProvisioned,
    ConfigRewritten,
    /// Terminal; `phase` is where the run stopped, the error returned by
    /// `run` carries the reason
    Failed { phase: &'static str },
}

/// What a successful run did
#[derive(Debug)]
pub struct InstallReport {
    pub layout: InstallLayout,
    pub staged_certificate: PathBuf,
    pub keystore: KeystoreOutcome,
    pub ssl_config: PathBuf,
    pub updated_keys: Vec<&'static str>,
    /// How many of `updated_keys` actually changed value
    pub changed_keys: usize,
    pub metrics: PhaseMetrics,
}

pub struct InstallWorkflow<'a> {
    params: &'a InstallParameters,
    defaults: &'a InstallerConfig,
    state: InstallState,
    tracker: PhaseTracker,
}

impl<'a> InstallWorkflow<'a> {
    pub fn new(params: &'a InstallParameters, defaults: &'a InstallerConfig) -> Self {
        Self {
            params,
            defaults,
            state: InstallState::Start,
            tracker: PhaseTracker::new(),
        }
    }

    pub fn state(&self) -> InstallState {
        self.state
    }

    /// Run every step, stopping at the first failure
    ///
    /// # Errors
    ///
    /// The [`InstallError`] variant names the step that failed.
    pub fn run(&mut self) -> Result<InstallReport, InstallError> {
        info!(
            cert = %self.params.cert_path().display(),
            install_root = %self.params.install_root().display(),
            alias = self.params.alias(),
            keystore_name = self.params.keystore_name(),
            "Starting certificate install"
        );

        match self.execute() {
            Ok(report) => {
                info!(
                    total_ms = report.metrics.total.as_millis(),
                    keystore_created = report.keystore.created(),
                    changed_keys = report.changed_keys,
                    "Certificate install complete"
                );
                Ok(report)
            }
            Err(e) => {
                let phase = self.tracker.current_phase().unwrap_or("unknown");
                self.tracker.end_current_phase();
                error!(phase, state = ?self.state, error = %e, "Certificate install failed");
                self.state = InstallState::Failed { phase };
                Err(e)
            }
        }
    }

    fn execute(&mut self) -> Result<InstallReport, InstallError> {
        let params = self.params;

        self.tracker.start_phase("layout");
        let layout = InstallLayout::resolve(params.install_root())?;
        self.advance(InstallState::LayoutResolved);

        self.tracker.start_phase("stage");
        let staged_certificate =
            stage(&layout, params.cert_path()).map_err(|source| InstallError::IoFailure {
                path: params.cert_path().to_path_buf(),
                source,
            })?;
        self.advance(InstallState::CertStaged);

        self.tracker.start_phase("keystore");
        let password = params.password().expose_secret();
        let keystore = certctl_crypto::provision(
            params.cert_path(),
            &layout.config_dir().join(params.keystore_name()),
            params.alias(),
            password,
        )?;
        self.advance(InstallState::KeystoreProvisioned);

        self.tracker.start_phase("ssl_config");
        let store_path = ssl::store_path(&self.defaults.store_path_prefix, params.keystore_name());
        let changed_keys = ssl::rewrite_ssl_config(layout.ssl_config(), &store_path, password)?;
        self.advance(InstallState::ConfigRewritten);
        self.tracker.end_current_phase();

        Ok(InstallReport {
            ssl_config: layout.ssl_config().to_path_buf(),
            layout,
            staged_certificate,
            keystore,
            updated_keys: MANAGED_KEYS.to_vec(),
            changed_keys,
            metrics: self.tracker.metrics(),
        })
    }

    fn advance(&mut self, next: InstallState) {
        info!(from = ?self.state, to = ?next, "Install state changed");
        self.state = next;
    }
}
