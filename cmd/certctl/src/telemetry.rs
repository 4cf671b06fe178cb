//! Logging setup and install phase timing

use clap::ValueEnum;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Initialize structured logging on stderr
///
/// `RUST_LOG` overrides the default `info` filter. Stdout stays free for the
/// command's own output.
pub fn init_logging(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    // Ignore errors if a subscriber is already installed
    let _ = match format {
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseTiming {
    pub name: &'static str,
    pub duration: Duration,
}

/// Phase durations collected over one install run
#[derive(Debug, Clone)]
pub struct PhaseMetrics {
    pub total: Duration,
    /// In the order the phases ran
    pub phases: Vec<PhaseTiming>,
}

/// Install phase tracker
pub struct PhaseTracker {
    start_time: Instant,
    phases: Vec<PhaseTiming>,
    current_phase: Option<(&'static str, Instant)>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            phases: Vec::new(),
            current_phase: None,
        }
    }

    /// Start tracking a new phase, closing the current one
    pub fn start_phase(&mut self, name: &'static str) {
        self.end_current_phase();
        info!(phase = name, "Starting install phase");
        self.current_phase = Some((name, Instant::now()));
    }

    pub fn end_current_phase(&mut self) {
        if let Some((name, start)) = self.current_phase.take() {
            let duration = start.elapsed();
            info!(
                phase = name,
                duration_ms = duration.as_millis(),
                "Install phase completed"
            );
            self.phases.push(PhaseTiming { name, duration });
        }
    }

    /// Name of the phase in progress, if any
    pub fn current_phase(&self) -> Option<&'static str> {
        self.current_phase.map(|(name, _)| name)
    }

    pub fn metrics(&self) -> PhaseMetrics {
        PhaseMetrics {
            total: self.start_time.elapsed(),
            phases: self.phases.clone(),
        }
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}
