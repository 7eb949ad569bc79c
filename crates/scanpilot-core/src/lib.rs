//! ScanPilot Core - Foundation types and error handling
//!
//! This crate provides the core abstractions shared by the ScanPilot crates:
//! - `ScanRequest`, `ScanHandle`, `ScanStatus`: the scan lifecycle vocabulary
//! - `RawFinding`, `CanonicalIssue`, `Detail`: raw engine output and merged issues
//! - `FilterConfiguration`, `EngineFilters`, `FilterableView`: per-engine filter policy and its input
//! - `Severity`, `SeverityHistogram`
//! - `Error`, `Phase`: the error taxonomy every crate reports through

pub mod error;
pub mod filter;
pub mod finding;
pub mod scan;
pub mod severity;

// Re-export commonly used types at crate root
pub use error::{Error, Phase, Result};
pub use filter::{EngineFilters, Filter, FilterAttribute, FilterConfiguration, FilterableView};
pub use finding::{
    sast_state_name, CanonicalIssue, Detail, FindingIdentity, LocationKey, RawFinding,
    SastFinding, SastNode, ScaFinding,
};
pub use scan::{Engine, ScanHandle, ScanRequest, ScanStatus, SourceOrigin};
pub use severity::{Severity, SeverityHistogram};
