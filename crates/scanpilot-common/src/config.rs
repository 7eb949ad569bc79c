//! Configuration management for ScanPilot

use std::path::Path;
use std::time::Duration;

use scanpilot_core::{Engine, Error, FilterConfiguration, Phase, Result};
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Scanning service connection settings
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Scan lifecycle settings
    #[serde(default)]
    pub scan: ScanConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Result filtering policy
    #[serde(default)]
    pub filters: FilterConfiguration,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration(
                Phase::Setup,
                format!("Failed to read config file {:?}: {}", path, e),
            )
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            Error::configuration(Phase::Setup, format!("Failed to parse config: {}", e))
        })
    }

    /// Create a configuration builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Merge with environment variables (SCANPILOT_ prefix)
    pub fn merge_env(mut self) -> Self {
        // Gateway settings
        if let Ok(val) = std::env::var("SCANPILOT_GATEWAY_URL") {
            self.gateway.url = val;
        }
        if let Ok(val) = std::env::var("SCANPILOT_PORTAL_URL") {
            self.gateway.portal_url = Some(val);
        }
        if let Ok(val) = std::env::var("SCANPILOT_API_TOKEN") {
            self.gateway.api_token = Some(val);
        }

        // Scan settings
        if let Ok(val) = std::env::var("SCANPILOT_POLL_INTERVAL_SECONDS") {
            if let Ok(n) = val.parse() {
                self.scan.poll_interval_seconds = n;
            }
        }
        if let Ok(val) = std::env::var("SCANPILOT_TIMEOUT_MINUTES") {
            if let Ok(n) = val.parse() {
                self.scan.timeout_minutes = n;
            }
        }
        if let Ok(val) = std::env::var("SCANPILOT_PRESET") {
            self.scan.preset = Some(val);
        }

        // Filters
        if let Ok(val) = std::env::var("SCANPILOT_SAST_FILTER_SCRIPT") {
            self.filters.sast.scripted = Some(val);
        }
        if let Ok(val) = std::env::var("SCANPILOT_SCA_FILTER_SCRIPT") {
            self.filters.sca.scripted = Some(val);
        }

        // Logging
        if let Ok(val) = std::env::var("SCANPILOT_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("SCANPILOT_LOG_FORMAT") {
            self.logging.format = val;
        }

        self
    }

    /// Check the settings the orchestrator cannot run without
    pub fn validate(&self) -> Result<()> {
        if self.gateway.url.trim().is_empty() {
            return Err(Error::configuration(Phase::Setup, "gateway.url is required"));
        }
        if self.scan.poll_interval_seconds == 0 {
            return Err(Error::configuration(
                Phase::Setup,
                "scan.poll_interval_seconds must be greater than zero",
            ));
        }
        if self.scan.page_size == 0 {
            return Err(Error::configuration(
                Phase::Setup,
                "scan.page_size must be greater than zero",
            ));
        }
        self.scan.engines()?;
        self.filters.validate()
    }
}

/// Scanning service connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// API base URL
    pub url: String,

    /// Web portal base URL for deep links (defaults to the API URL)
    pub portal_url: Option<String>,

    /// Bearer token for API calls
    pub api_token: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u32,
}

fn default_request_timeout() -> u32 {
    60
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: String::from("https://localhost"),
            portal_url: None,
            api_token: None,
            request_timeout_seconds: 60,
        }
    }
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.request_timeout_seconds))
    }

    /// Base URL used for deep links
    pub fn portal_base(&self) -> &str {
        self.portal_url.as_deref().unwrap_or(&self.url)
    }
}

/// Scan lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Engines to run (sast, sca)
    #[serde(default = "default_engine_types")]
    pub engine_types: Vec<String>,

    /// Preset name passed when triggering
    pub preset: Option<String>,

    /// Seconds between status checks
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u32,

    /// Polling budget in minutes
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: u32,

    /// Items requested per listing page
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_engine_types() -> Vec<String> {
    vec![String::from("sast")]
}

fn default_poll_interval() -> u32 {
    20
}

fn default_timeout_minutes() -> u32 {
    120
}

fn default_page_size() -> u32 {
    50
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            engine_types: default_engine_types(),
            preset: None,
            poll_interval_seconds: 20,
            timeout_minutes: 120,
            page_size: 50,
        }
    }
}

impl ScanConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.poll_interval_seconds))
    }

    /// Parse the configured engine names
    pub fn engines(&self) -> Result<Vec<Engine>> {
        self.engine_types
            .iter()
            .map(|name| {
                name.parse::<Engine>().map_err(|e| {
                    Error::configuration(Phase::Setup, format!("scan.engine_types: {}", e))
                })
            })
            .collect()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    String::from("info")
}

fn default_log_format() -> String {
    String::from("pretty")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Builder for constructing Config
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn gateway_url(mut self, url: impl Into<String>) -> Self {
        self.config.gateway.url = url.into();
        self
    }

    pub fn portal_url(mut self, url: impl Into<String>) -> Self {
        self.config.gateway.portal_url = Some(url.into());
        self
    }

    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.config.gateway.api_token = Some(token.into());
        self
    }

    pub fn poll_interval_seconds(mut self, seconds: u32) -> Self {
        self.config.scan.poll_interval_seconds = seconds;
        self
    }

    pub fn timeout_minutes(mut self, minutes: u32) -> Self {
        self.config.scan.timeout_minutes = minutes;
        self
    }

    pub fn engine_types(mut self, engines: Vec<String>) -> Self {
        self.config.scan.engine_types = engines;
        self
    }

    pub fn filters(mut self, filters: FilterConfiguration) -> Self {
        self.config.filters = filters;
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanpilot_core::FilterAttribute;
    use std::io::Write;

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
            [gateway]
            url = "https://ast.example.com"
            api_token = "secret-token"

            [scan]
            engine_types = ["sast", "sca"]
            timeout_minutes = 30

            [logging]
            level = "debug"
            format = "json"

            [[filters.sast.simple]]
            attribute = "state"
            value = "Urgent"

            [filters.sca]
            scripted = "finding.severity == 'HIGH'"
        "#;

        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.gateway.url, "https://ast.example.com");
        assert_eq!(config.gateway.api_token, Some(String::from("secret-token")));
        assert_eq!(config.scan.timeout_minutes, 30);
        assert_eq!(config.scan.page_size, 50);
        assert_eq!(config.scan.engines().unwrap(), vec![Engine::Sast, Engine::Sca]);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.filters.sast.simple[0].attribute, FilterAttribute::State);
        assert_eq!(
            config.filters.sca.scripted.as_deref(),
            Some("finding.severity == 'HIGH'")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = Config::builder()
            .gateway_url("https://test.com")
            .api_token("token123")
            .poll_interval_seconds(5)
            .log_level("warn")
            .build();

        assert_eq!(config.gateway.url, "https://test.com");
        assert_eq!(config.gateway.portal_base(), "https://test.com");
        assert_eq!(config.scan.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_validate_rejects_dual_filters() {
        let config = Config::from_toml(
            r#"
            [filters.sca]
            scripted = "finding.severity == 'HIGH'"

            [[filters.sca.simple]]
            attribute = "status"
            value = "new"
        "#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.to_string().contains("SCA filters"));
    }

    #[test]
    fn test_validate_rejects_unknown_engine() {
        let config = Config::builder()
            .engine_types(vec![String::from("dast")])
            .build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[gateway]\nurl = \"https://file.example.com\"").unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.gateway.url, "https://file.example.com");
        assert_eq!(config.gateway.request_timeout(), Duration::from_secs(60));
    }
}
