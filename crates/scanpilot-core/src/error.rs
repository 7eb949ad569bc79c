//! Error types for ScanPilot
//!
//! Every variant carries the scan id (when one is known) and the lifecycle
//! phase that produced it, so callers can tell a rejected request from an
//! exhausted polling budget from a broken filter.

use std::time::Duration;

use thiserror::Error;

use crate::scan::ScanStatus;

/// Result type alias using ScanPilot Error
pub type Result<T> = std::result::Result<T, Error>;

/// Lifecycle phase an error was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Loading configuration or building clients
    Setup,
    ProjectResolution,
    TeamResolution,
    ScanCreation,
    SourceUpload,
    Triggering,
    Polling,
    ResultRetrieval,
    Aggregation,
    Filtering,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Setup => "setup",
            Phase::ProjectResolution => "project resolution",
            Phase::TeamResolution => "team resolution",
            Phase::ScanCreation => "scan creation",
            Phase::SourceUpload => "source upload",
            Phase::Triggering => "triggering",
            Phase::Polling => "polling",
            Phase::ResultRetrieval => "result retrieval",
            Phase::Aggregation => "aggregation",
            Phase::Filtering => "filtering",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// ScanPilot error types
#[derive(Error, Debug)]
pub enum Error {
    // === Transport Errors ===
    #[error("Transport error during {phase}{}: {message}", scan_suffix(.scan_id))]
    Transport {
        scan_id: Option<String>,
        phase: Phase,
        /// HTTP status when the gateway answered with one
        status: Option<u16>,
        message: String,
    },

    // === Upstream State Errors ===
    #[error("Scan was cancelled or failed{}: upstream state {state}", scan_suffix(.scan_id))]
    UpstreamState {
        scan_id: Option<String>,
        phase: Phase,
        state: ScanStatus,
    },

    // === Timeout Errors ===
    #[error(
        "Timed out waiting for scan{} after {}s (budget {}s)",
        scan_suffix(.scan_id),
        secs(.elapsed),
        secs(.budget)
    )]
    Timeout {
        scan_id: Option<String>,
        phase: Phase,
        elapsed: Duration,
        budget: Duration,
    },

    // === Configuration Errors ===
    #[error("Configuration error during {phase}{}: {message}", scan_suffix(.scan_id))]
    Configuration {
        scan_id: Option<String>,
        phase: Phase,
        message: String,
    },

    // === Data Integrity Errors ===
    #[error(
        "Malformed finding{}{}: {message}",
        finding_suffix(.finding_id),
        scan_suffix(.scan_id)
    )]
    DataIntegrity {
        scan_id: Option<String>,
        phase: Phase,
        finding_id: Option<String>,
        message: String,
    },

    // === Request Errors ===
    #[error("Invalid scan request: {message}")]
    InvalidRequest {
        scan_id: Option<String>,
        phase: Phase,
        message: String,
    },
}

fn scan_suffix(scan_id: &Option<String>) -> String {
    match scan_id {
        Some(id) => format!(" (scan {})", id),
        None => String::new(),
    }
}

fn finding_suffix(finding_id: &Option<String>) -> String {
    match finding_id {
        Some(id) => format!(" {}", id),
        None => String::new(),
    }
}

fn secs(duration: &Duration) -> u64 {
    duration.as_secs()
}

impl Error {
    pub fn transport(phase: Phase, status: Option<u16>, message: impl Into<String>) -> Self {
        Error::Transport {
            scan_id: None,
            phase,
            status,
            message: message.into(),
        }
    }

    pub fn configuration(phase: Phase, message: impl Into<String>) -> Self {
        Error::Configuration {
            scan_id: None,
            phase,
            message: message.into(),
        }
    }

    pub fn data_integrity(finding_id: Option<String>, message: impl Into<String>) -> Self {
        Error::DataIntegrity {
            scan_id: None,
            phase: Phase::Aggregation,
            finding_id,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Error::InvalidRequest {
            scan_id: None,
            phase: Phase::ScanCreation,
            message: message.into(),
        }
    }

    /// Attach a scan id, keeping an id that is already present
    pub fn with_scan_id(mut self, id: &str) -> Self {
        let slot = match &mut self {
            Error::Transport { scan_id, .. }
            | Error::UpstreamState { scan_id, .. }
            | Error::Timeout { scan_id, .. }
            | Error::Configuration { scan_id, .. }
            | Error::DataIntegrity { scan_id, .. }
            | Error::InvalidRequest { scan_id, .. } => scan_id,
        };
        if slot.is_none() {
            *slot = Some(id.to_string());
        }
        self
    }

    /// Scan the error belongs to, if one had been created
    pub fn scan_id(&self) -> Option<&str> {
        match self {
            Error::Transport { scan_id, .. }
            | Error::UpstreamState { scan_id, .. }
            | Error::Timeout { scan_id, .. }
            | Error::Configuration { scan_id, .. }
            | Error::DataIntegrity { scan_id, .. }
            | Error::InvalidRequest { scan_id, .. } => scan_id.as_deref(),
        }
    }

    /// Phase the error was raised in
    pub fn phase(&self) -> Phase {
        match self {
            Error::Transport { phase, .. }
            | Error::UpstreamState { phase, .. }
            | Error::Timeout { phase, .. }
            | Error::Configuration { phase, .. }
            | Error::DataIntegrity { phase, .. }
            | Error::InvalidRequest { phase, .. } => *phase,
        }
    }

    /// Check if the caller may re-attempt the operation
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport { status, .. } => match status {
                None => true,
                Some(code) => *code == 429 || *code >= 500,
            },
            _ => false,
        }
    }

    /// Get an error code for logging/metrics
    pub fn code(&self) -> &'static str {
        match self {
            Error::Transport { .. } => "TRANSPORT_ERROR",
            Error::UpstreamState { .. } => "SCAN_FAILED",
            Error::Timeout { .. } => "SCAN_TIMEOUT",
            Error::Configuration { .. } => "CONFIG_ERROR",
            Error::DataIntegrity { .. } => "DATA_INTEGRITY",
            Error::InvalidRequest { .. } => "INVALID_REQUEST",
        }
    }
}
