//! ScanPilot Orchestrator - one scan from request to filtered report
//!
//! This crate provides:
//! - `ScanOrchestrator`: project resolution, scan creation, source upload,
//!   triggering, polling and result retrieval over a `ScanGateway`
//! - `SourcePackager`: the seam that turns a source origin into an archive
//! - `ScanReport`: the caller-facing result of a finished scan

pub mod orchestrator;
pub mod report;
pub mod source;

pub use orchestrator::{OrchestratorConfig, ScanOrchestrator};
pub use report::{deep_link, ScanReport};
pub use source::{ArchivePackager, PackagedSource, SourcePackager};
