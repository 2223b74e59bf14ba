//! Structured logging setup and redaction helpers.

use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    prelude::*,
};

use crate::error::{TwitterError, TwitterResult};

const REDACTED: &str = "[REDACTED]";

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to the startup event.
    pub service_name: String,

    /// Log level filter (e.g., "info", "debug", "trace"). `RUST_LOG` wins when set.
    pub log_level: String,

    /// Enable JSON log output.
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "lazybridge".to_string(),
            log_level: "info".to_string(),
            json_logs: true,
        }
    }
}

impl TelemetryConfig {
    /// Set the log level.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Enable or disable JSON logs.
    #[must_use]
    pub const fn with_json_logs(mut self, enabled: bool) -> Self {
        self.json_logs = enabled;
        self
    }
}

/// Install the global tracing subscriber.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: &TelemetryConfig) -> TwitterResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if config.json_logs {
        let json_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE);

        subscriber
            .with(json_layer)
            .try_init()
            .map_err(|e| TwitterError::Config(format!("logging init failed: {e}")))?;
    } else {
        let pretty_layer = fmt::layer()
            .with_ansi(true)
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE);

        subscriber
            .with(pretty_layer)
            .try_init()
            .map_err(|e| TwitterError::Config(format!("logging init failed: {e}")))?;
    }

    tracing::info!(service = %config.service_name, "logging initialized");
    Ok(())
}

/// Render an access token for logs: the user ID prefix survives, the rest
/// does not.
#[must_use]
pub fn redact_token(token: &str) -> String {
    match token.split_once('-') {
        Some((id, _)) => format!("{id}-{REDACTED}"),
        None => REDACTED.to_string(),
    }
}
