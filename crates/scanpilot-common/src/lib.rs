//! ScanPilot Common - Shared utilities: configuration and logging
//!
//! This crate provides common functionality used by the ScanPilot binary and
//! by anything embedding the orchestrator.

pub mod config;
pub mod logging;

pub use config::{Config, ConfigBuilder};
pub use logging::{init_logging_with_config, LogConfig, LogFormat};
