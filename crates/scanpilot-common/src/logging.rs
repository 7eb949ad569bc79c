//! Tracing subscriber setup for the CLI and embedding services

use std::str::FromStr;

use scanpilot_core::{Error, Phase, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;

/// Output style of the log stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, for terminals
    #[default]
    Pretty,
    /// One JSON object per event, for CI log collection
    Json,
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Resolved logging settings: `[logging]` section plus command-line overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

impl LogConfig {
    /// Unknown formats in the config file fall back to pretty
    pub fn from_settings(settings: &LoggingConfig) -> Self {
        Self {
            level: settings.level.clone(),
            format: settings.format.parse().unwrap_or_default(),
        }
    }

    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// File and line numbers are only worth the noise when debugging
    fn source_locations(&self) -> bool {
        matches!(self.level.trim().to_lowercase().as_str(), "debug" | "trace")
    }

    fn layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let located = self.source_locations();
        let base = fmt::layer()
            .with_writer(std::io::stderr)
            .with_file(located)
            .with_line_number(located);

        match self.format {
            LogFormat::Json => base.json().boxed(),
            LogFormat::Compact => base.compact().boxed(),
            LogFormat::Pretty => base.pretty().boxed(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::from_settings(&LoggingConfig::default())
    }
}

/// Install the global subscriber. Logs go to stderr so reports on stdout
/// stay machine-readable; `RUST_LOG` overrides the configured level.
pub fn init_logging_with_config(config: LogConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    tracing_subscriber::registry()
        .with(config.layer())
        .with(env_filter)
        .try_init()
        .map_err(|e| {
            Error::configuration(Phase::Setup, format!("Failed to initialise logging: {}", e))
        })
}
