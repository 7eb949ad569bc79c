//! Scan requests, handles and upstream lifecycle states

use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Analysis engine offered by the scanning service
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// Static analysis of source code
    Sast,
    /// Software composition analysis of dependencies
    Sca,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Sast => "sast",
            Engine::Sca => "sca",
        }
    }
}

impl std::fmt::Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Engine {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sast" => Ok(Engine::Sast),
            "sca" => Ok(Engine::Sca),
            other => Err(format!("unknown engine '{}'", other)),
        }
    }
}

/// Where the code to scan comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceOrigin {
    /// A ready-made archive on local disk
    File(PathBuf),
    /// A repository that has to be cloned and packaged first
    GitRepo { url: String, branch: Option<String> },
}

/// A request to scan one project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    /// Project name, unique within the owning team
    pub project_name: String,
    /// Team that owns (or will own) the project
    pub owner_team_id: String,
    /// Source to upload
    pub source: SourceOrigin,
    /// Engines to run
    pub engines: Vec<Engine>,
    /// Scan preset name, service default when absent
    pub preset: Option<String>,
}

impl ScanRequest {
    /// Create a request that runs the SAST engine
    pub fn new(
        project_name: impl Into<String>,
        owner_team_id: impl Into<String>,
        source: SourceOrigin,
    ) -> Self {
        Self {
            project_name: project_name.into(),
            owner_team_id: owner_team_id.into(),
            source,
            engines: vec![Engine::Sast],
            preset: None,
        }
    }

    pub fn engines(mut self, engines: Vec<Engine>) -> Self {
        self.engines = engines;
        self
    }

    pub fn preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = Some(preset.into());
        self
    }

    /// Reject requests the service would refuse anyway
    pub fn validate(&self) -> Result<()> {
        if self.project_name.trim().is_empty() {
            return Err(Error::invalid_request("project name is required"));
        }
        if self.owner_team_id.trim().is_empty() {
            return Err(Error::invalid_request("owner team id is required"));
        }
        if self.engines.is_empty() {
            return Err(Error::invalid_request("at least one engine must be selected"));
        }
        match &self.source {
            SourceOrigin::File(path) if path.as_os_str().is_empty() => {
                Err(Error::invalid_request("source file path is empty"))
            }
            SourceOrigin::GitRepo { url, .. } if url.trim().is_empty() => {
                Err(Error::invalid_request("repository url is empty"))
            }
            _ => Ok(()),
        }
    }
}

/// Handle to a scan the gateway has acknowledged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanHandle {
    pub scan_id: String,
    pub project_id: String,
    pub created_at: DateTime<Utc>,
}

impl ScanHandle {
    pub fn new(scan_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            scan_id: scan_id.into(),
            project_id: project_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// Upstream scan lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanStatus {
    New,
    Queued,
    Scanning,
    PostScan,
    Finished,
    Canceled,
    Failed,
}

impl ScanStatus {
    /// No further transitions will happen
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanStatus::Finished | ScanStatus::Canceled | ScanStatus::Failed
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ScanStatus::Finished)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::New => "New",
            ScanStatus::Queued => "Queued",
            ScanStatus::Scanning => "Scanning",
            ScanStatus::PostScan => "PostScan",
            ScanStatus::Finished => "Finished",
            ScanStatus::Canceled => "Canceled",
            ScanStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ScanStatus {
    type Err = String;

    /// Accepts the service's spellings, which differ between API versions
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != ' ' && *c != '-')
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "new" | "created" => Ok(ScanStatus::New),
            "queued" => Ok(ScanStatus::Queued),
            "scanning" | "running" => Ok(ScanStatus::Scanning),
            "postscan" => Ok(ScanStatus::PostScan),
            "finished" | "completed" | "done" => Ok(ScanStatus::Finished),
            "canceled" | "cancelled" => Ok(ScanStatus::Canceled),
            "failed" => Ok(ScanStatus::Failed),
            _ => Err(format!("unknown scan status '{}'", s)),
        }
    }
}
