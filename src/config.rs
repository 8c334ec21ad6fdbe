//! Tracing configuration.
//!
//! Configuration is the only process-wide shared state besides the reporter
//! sink. It is read-mostly: the provider keeps it behind an `RwLock` so
//! reconfiguration never blocks in-flight event creation beyond a brief
//! exclusive write.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable selecting the tracing mode (`always`, `never`,
/// `through`).
pub const ENV_TRACING_MODE: &str = "XTRACE_TRACING_MODE";
/// Environment variable setting the sampling ratio for locally-started
/// traces (a float in `0.0..=1.0`).
pub const ENV_SAMPLE_RATIO: &str = "XTRACE_SAMPLE_RATIO";
/// Environment variable bounding reporter sends, in milliseconds.
pub const ENV_SEND_TIMEOUT_MS: &str = "XTRACE_SEND_TIMEOUT_MS";

/// When traces are recorded.
#[derive(Clone, Debug, Default, PartialEq, Eq, Copy)]
pub enum TracingMode {
    /// Record locally-started traces and continue upstream ones.
    #[default]
    Always,
    /// Record nothing.
    Never,
    /// Only continue traces an upstream caller already sampled.
    Through,
}

impl FromStr for TracingMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "always" => Ok(TracingMode::Always),
            "never" => Ok(TracingMode::Never),
            "through" => Ok(TracingMode::Through),
            _ => Err(()),
        }
    }
}

/// Tracer configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// When traces are recorded.
    pub tracing_mode: TracingMode,

    /// Fraction of locally-started traces to sample, `0.0..=1.0`.
    pub sample_ratio: f64,

    /// Upper bound on the time one reporter send may take.
    pub send_timeout: Duration,
}

impl Default for Config {
    /// The built-in defaults (always / 1.0 / 1s) overlaid with environment
    /// variables. Unparseable values warn and keep the default.
    fn default() -> Self {
        let mut config = Config {
            tracing_mode: TracingMode::Always,
            sample_ratio: 1.0,
            send_timeout: Duration::from_secs(1),
        };

        if let Ok(mode) = env::var(ENV_TRACING_MODE) {
            match mode.parse() {
                Ok(parsed) => config.tracing_mode = parsed,
                Err(()) => tracing::warn!(
                    value = %mode,
                    "unrecognized {ENV_TRACING_MODE}; valid values are always, never, through"
                ),
            }
        }

        if let Ok(ratio) = env::var(ENV_SAMPLE_RATIO) {
            match ratio.parse::<f64>() {
                Ok(parsed) if (0.0..=1.0).contains(&parsed) => config.sample_ratio = parsed,
                _ => tracing::warn!(
                    value = %ratio,
                    "invalid {ENV_SAMPLE_RATIO}; expected a float in 0.0..=1.0"
                ),
            }
        }

        if let Ok(timeout) = env::var(ENV_SEND_TIMEOUT_MS) {
            match timeout.parse::<u64>() {
                Ok(ms) => config.send_timeout = Duration::from_millis(ms),
                Err(_) => tracing::warn!(
                    value = %timeout,
                    "invalid {ENV_SEND_TIMEOUT_MS}; expected milliseconds"
                ),
            }
        }

        config
    }
}
