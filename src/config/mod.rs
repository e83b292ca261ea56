//! Runtime configuration read from the environment, mirroring how
//! `telemetry::TelemetryConfig` is built — a plain struct with a
//! conservative `Default` and a `from_env` that layers environment
//! variables over it.

use std::time::Duration;

use tracing::Level;

#[derive(Debug, Clone)]
pub struct Config {
    /// Per-HTTP-call timeout passed to the dispatcher.
    pub default_timeout_ms: u64,
    pub otlp_endpoint: Option<String>,
    pub log_level: Level,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30_000,
            otlp_endpoint: None,
            log_level: Level::INFO,
        }
    }
}

impl Config {
    /// Reads `RUNNER_DEFAULT_TIMEOUT_MS`, `OTEL_EXPORTER_OTLP_ENDPOINT`, and
    /// `RUNNER_LOG_LEVEL` over the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(ms) = std::env::var("RUNNER_DEFAULT_TIMEOUT_MS") {
            if let Ok(parsed) = ms.parse::<u64>() {
                config.default_timeout_ms = parsed;
            }
        }
        if let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
            config.otlp_endpoint = Some(endpoint);
        }
        if let Ok(level) = std::env::var("RUNNER_LOG_LEVEL") {
            if let Ok(parsed) = level.parse::<Level>() {
                config.log_level = parsed;
            }
        }

        config
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}
