//! Source packaging
//!
//! Turning a checkout into an uploadable archive is left to a
//! `SourcePackager`. The orchestrator only uploads what it is handed and
//! removes archives marked temporary.

use std::path::PathBuf;

use async_trait::async_trait;
use scanpilot_core::{Error, Phase, Result, SourceOrigin};
use tracing::debug;

/// Archive ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedSource {
    pub path: PathBuf,
    /// Delete the archive once uploaded
    pub temporary: bool,
}

impl PackagedSource {
    /// An archive owned by the caller, never deleted
    pub fn existing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            temporary: false,
        }
    }

    /// An archive produced for this upload only
    pub fn temporary(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            temporary: true,
        }
    }
}

/// Produces an archive from a source origin
#[async_trait]
pub trait SourcePackager: Send + Sync {
    async fn package(&self, origin: &SourceOrigin) -> Result<PackagedSource>;
}

/// Uploads pre-built archives as they are.
///
/// Git origins need a packager that can clone and zip; this one rejects
/// them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchivePackager;

#[async_trait]
impl SourcePackager for ArchivePackager {
    async fn package(&self, origin: &SourceOrigin) -> Result<PackagedSource> {
        match origin {
            SourceOrigin::File(path) => {
                let is_file = tokio::fs::metadata(path)
                    .await
                    .map(|meta| meta.is_file())
                    .unwrap_or(false);
                if !is_file {
                    return Err(Error::InvalidRequest {
                        scan_id: None,
                        phase: Phase::SourceUpload,
                        message: format!("source archive {:?} does not exist", path),
                    });
                }
                debug!("Using source archive {:?}", path);
                Ok(PackagedSource::existing(path.clone()))
            }
            SourceOrigin::GitRepo { url, .. } => Err(Error::configuration(
                Phase::SourceUpload,
                format!(
                    "repository {} must be packaged before upload; configure a git packager",
                    url
                ),
            )),
        }
    }
}
