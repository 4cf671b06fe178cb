//! certctl: install an SSL certificate into a Jetty-based server
//!
//! `certctl install` stages the certificate under `etc/ssl`, packages it as a
//! PKCS#12 keystore in `etc` and points `start.d/ssl.ini` at that keystore.
//! `certctl inspect` reports on a certificate file without touching anything.

use anyhow::{anyhow, Result};
use certctl_config::InstallerConfig;
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;

mod inspect;
mod params;
mod stage;
mod telemetry;
mod workflow;

use params::InstallParameters;
use telemetry::LogFormat;
use workflow::{InstallReport, InstallWorkflow};

#[derive(Parser)]
#[command(name = "certctl")]
#[command(version, about = "SSL certificate installer for Jetty-based servers", long_about = None)]
struct Cli {
    /// Operator defaults file (YAML)
    #[arg(long, global = true, env = "CERTCTL_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a certificate into a server installation
    Install {
        /// Certificate file (.p12, .pfx, .pem, .crt, .cer or .der)
        #[arg(long, alias = "certlocation")]
        cert: PathBuf,
        /// Root directory of the server installation
        #[arg(long, alias = "caatlocation")]
        install_dir: PathBuf,
        /// Keystore password, also used to unlock the certificate file
        #[arg(
            long,
            alias = "keystorepwd",
            env = "CERTCTL_KEYSTORE_PASSWORD",
            hide_env_values = true
        )]
        password: String,
        /// Keystore entry alias [default: contentanalyst]
        #[arg(long, alias = "keystorealias")]
        alias: Option<String>,
        /// Keystore file name under etc/ [default: keystore]
        #[arg(long, alias = "keystorename")]
        keystore_name: Option<String>,
    },
    /// Show what a certificate file contains
    Inspect {
        #[arg(long, alias = "certlocation")]
        cert: PathBuf,
        /// Password for PKCS#12 archives or encrypted keys
        #[arg(
            long,
            env = "CERTCTL_KEYSTORE_PASSWORD",
            hide_env_values = true,
            default_value = ""
        )]
        password: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    telemetry::init_logging(cli.log_format);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Install {
            cert,
            install_dir,
            password,
            alias,
            keystore_name,
        } => {
            let defaults = load_defaults(cli.config.as_deref())?;
            let params = InstallParameters::new(
                cert,
                install_dir,
                SecretString::from(password),
                alias.as_deref(),
                keystore_name.as_deref(),
                &defaults,
            )?;
            let mut workflow = InstallWorkflow::new(&params, &defaults);
            let result = workflow.run();
            debug!(state = ?workflow.state(), "Install workflow finished");
            print_summary(&result?);
        }
        Commands::Inspect { cert, password } => {
            let report = inspect::inspect(&cert, &password)?;
            println!("{report}");
        }
    }
    Ok(())
}

fn load_defaults(path: Option<&Path>) -> Result<InstallerConfig> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), "Loading operator defaults");
            InstallerConfig::load(path)
                .map_err(|e| anyhow!("Failed to load config {}: {e}", path.display()))
        }
        None => Ok(InstallerConfig::default()),
    }
}

fn print_summary(report: &InstallReport) {
    println!(
        "✅ Certificate installed into {}",
        report.layout.root().display()
    );
    println!(
        "   Certificate: {}",
        report.staged_certificate.display()
    );
    if report.keystore.created() {
        println!("   Keystore:    {} (created)", report.keystore.path().display());
    } else {
        println!(
            "   Keystore:    {} (already present, left untouched)",
            report.keystore.path().display()
        );
    }
    println!(
        "   SSL config:  {} ({} of {} keys changed)",
        report.ssl_config.display(),
        report.changed_keys,
        report.updated_keys.len()
    );

    let phases: Vec<String> = report
        .metrics
        .phases
        .iter()
        .map(|p| format!("{} {}ms", p.name, p.duration.as_millis()))
        .collect();
    println!(
        "   Completed in {}ms ({})",
        report.metrics.total.as_millis(),
        phases.join(", ")
    );
}
