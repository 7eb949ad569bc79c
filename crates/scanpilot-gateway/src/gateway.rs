//! The scanning service seen from the client side
//!
//! `ScanGateway` is the only way the orchestrator talks to the service, which
//! keeps the lifecycle logic testable against an in-memory gateway.

use std::path::Path;

use async_trait::async_trait;
use scanpilot_core::{Engine, Error, Phase, RawFinding, ScanStatus};
use serde::{Deserialize, Serialize};

use crate::navigation::TreeNode;
use crate::paging::Page;

// ── Gateway Errors ───────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not configured: {0}")]
    NotConfigured(String),
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    /// HTTP status the service answered with, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Api { status, .. } => Some(*status),
            GatewayError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Lift into the crate-wide taxonomy, tagged with the phase it happened in
    pub fn into_error(self, phase: Phase) -> Error {
        match self {
            GatewayError::NotConfigured(message) => Error::configuration(phase, message),
            other => Error::transport(phase, other.status(), other.to_string()),
        }
    }
}

// ── Gateway Types ────────────────────────────────────────────────────────────

/// A project as listed by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
}

/// Pre-signed destination for the source archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTarget {
    pub url: String,
    /// Signed form fields, sent in this order ahead of the file
    pub fields: Vec<(String, String)>,
}

/// Gateway acknowledgment of a created scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedScan {
    pub scan_id: String,
    pub upload: UploadTarget,
}

/// Point-in-time scan status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanState {
    pub status: ScanStatus,
    /// Percent complete, when reported
    pub progress: Option<u8>,
}

/// Per-engine severity counts as summarised by the service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSummary {
    pub engine: String,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

/// Ownership chain and summary of one scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanDetails {
    pub scan_id: String,
    pub project_id: String,
    pub application_id: String,
    pub business_unit_id: String,
    pub status: ScanStatus,
    #[serde(default)]
    pub engines: Vec<EngineSummary>,
}

/// Entry in a project's scan history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub id: String,
    pub status: ScanStatus,
}

// ── Gateway Trait ────────────────────────────────────────────────────────────

/// Operations the remote scanning service offers
#[async_trait]
pub trait ScanGateway: Send + Sync {
    /// One page of the projects owned by a team
    async fn list_projects(
        &self,
        owner_team_id: &str,
        page: u32,
        page_size: u32,
    ) -> GatewayResult<Page<Project>>;

    /// Create a project and return its id
    async fn create_project(
        &self,
        owner_team_id: &str,
        name: &str,
        preset: Option<&str>,
    ) -> GatewayResult<String>;

    /// Register a scan and obtain its upload target
    async fn create_scan(&self, project_id: &str, engines: &[Engine]) -> GatewayResult<CreatedScan>;

    /// Multipart upload of the archive to a pre-signed target
    async fn upload_source(&self, target: &UploadTarget, archive: &Path) -> GatewayResult<()>;

    /// Start analysis of uploaded source
    async fn trigger_scan(
        &self,
        scan_id: &str,
        engines: &[Engine],
        preset: Option<&str>,
    ) -> GatewayResult<()>;

    async fn scan_status(&self, scan_id: &str) -> GatewayResult<ScanState>;

    async fn scan_details(&self, scan_id: &str) -> GatewayResult<ScanDetails>;

    /// One page of one engine's results
    async fn list_results(
        &self,
        project_id: &str,
        scan_id: &str,
        engine: Engine,
        page: u32,
        page_size: u32,
    ) -> GatewayResult<Page<RawFinding>>;

    /// Full content of one scanned source file
    async fn source_file(&self, project_id: &str, scan_id: &str, path: &str)
        -> GatewayResult<String>;

    /// Business-unit / application hierarchy
    async fn navigation_tree(&self) -> GatewayResult<Vec<TreeNode>>;

    /// Create an application (team) under a business unit
    async fn create_application(
        &self,
        parent_id: &str,
        name: &str,
        description: &str,
    ) -> GatewayResult<String>;

    /// One page of a project's scan history, newest first
    async fn list_scans(
        &self,
        project_id: &str,
        page: u32,
        page_size: u32,
    ) -> GatewayResult<Page<ScanSummary>>;
}
