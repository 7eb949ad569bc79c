//! Scan lifecycle orchestration
//!
//! A scan moves through project resolution, scan creation, source upload,
//! triggering and polling. Each step talks to the service through the
//! `ScanGateway`; every failure is reported with the phase it happened in
//! and, once the service has issued one, the scan id.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use scanpilot_common::Config;
use scanpilot_core::{
    Engine, Error, FilterConfiguration, Phase, Result, ScanHandle, ScanRequest, ScanStatus,
    SourceOrigin,
};
use scanpilot_filter::FilterSet;
use scanpilot_gateway::{
    fetch_all, find_team_id, ScanGateway, UploadTarget, DEFAULT_PAGE_SIZE, GENERATED_DESCRIPTION,
};
use scanpilot_results::{ResultAggregator, SourceFetcher};
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::report::{deep_link, ScanReport};
use crate::source::{ArchivePackager, SourcePackager};

// ── Configuration ────────────────────────────────────────────────────────────

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Pause between status checks
    pub poll_interval: Duration,
    /// Items requested per listing page
    pub page_size: u32,
    /// Portal base URL for deep links
    pub portal_url: String,
    /// Preset used when a request names none
    pub preset: Option<String>,
    /// Engines whose results are fetched when the service does not say
    pub engines: Vec<Engine>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(20),
            page_size: DEFAULT_PAGE_SIZE,
            portal_url: String::from("https://localhost"),
            preset: None,
            engines: vec![Engine::Sast],
        }
    }
}

impl OrchestratorConfig {
    /// Derive settings from the loaded configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            poll_interval: config.scan.poll_interval(),
            page_size: config.scan.page_size,
            portal_url: config.gateway.portal_base().to_string(),
            preset: config.scan.preset.clone(),
            engines: config.scan.engines()?,
        })
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    pub fn portal_url(mut self, url: impl Into<String>) -> Self {
        self.portal_url = url.into();
        self
    }
}

// ── Orchestrator ─────────────────────────────────────────────────────────────

/// Drives scans against one scanning service.
///
/// Safe to share across tasks working on distinct scans. Two tasks creating
/// scans for the same new project at once may both create it.
pub struct ScanOrchestrator<G, P = ArchivePackager> {
    gateway: G,
    packager: P,
    config: OrchestratorConfig,
    /// Scan ids handed out by this orchestrator
    issued: Mutex<HashSet<String>>,
}

impl<G: ScanGateway> ScanOrchestrator<G> {
    pub fn new(gateway: G, config: OrchestratorConfig) -> Self {
        Self {
            gateway,
            packager: ArchivePackager,
            config,
            issued: Mutex::new(HashSet::new()),
        }
    }
}

impl<G: ScanGateway, P: SourcePackager> ScanOrchestrator<G, P> {
    /// Replace the source packager
    pub fn with_packager<Q: SourcePackager>(self, packager: Q) -> ScanOrchestrator<G, Q> {
        ScanOrchestrator {
            gateway: self.gateway,
            packager,
            config: self.config,
            issued: self.issued,
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    // ── Scan creation ──

    /// Resolve the project, create the scan, upload its source and start it.
    ///
    /// Nothing is rolled back on failure; a project or scan created before
    /// the failing step stays on the service.
    pub async fn create_scan(&self, request: &ScanRequest) -> Result<ScanHandle> {
        request.validate()?;
        info!(
            "Creating scan for project '{}' ({})",
            request.project_name,
            engine_list(&request.engines)
        );

        let project_id = self.resolve_project(request).await?;

        let created = self
            .gateway
            .create_scan(&project_id, &request.engines)
            .await
            .map_err(|e| e.into_error(Phase::ScanCreation))?;
        let scan_id = created.scan_id;
        self.register_scan_id(&scan_id).await?;
        info!("Scan {} created in project {}", scan_id, project_id);

        self.upload_source(&request.source, &created.upload)
            .await
            .map_err(|e| e.with_scan_id(&scan_id))?;

        let preset = request.preset.as_deref().or(self.config.preset.as_deref());
        self.gateway
            .trigger_scan(&scan_id, &request.engines, preset)
            .await
            .map_err(|e| e.into_error(Phase::Triggering).with_scan_id(&scan_id))?;
        info!("Scan {} triggered", scan_id);

        Ok(ScanHandle::new(scan_id, project_id))
    }

    /// Find the project by owner and name, creating it when absent
    async fn resolve_project(&self, request: &ScanRequest) -> Result<String> {
        let gateway = &self.gateway;
        let owner = request.owner_team_id.as_str();
        let name = request.project_name.trim();

        let projects = fetch_all(self.config.page_size, move |page, size| {
            gateway.list_projects(owner, page, size)
        })
        .await
        .map_err(|e| e.into_error(Phase::ProjectResolution))?;

        if let Some(project) = projects.iter().find(|p| p.name == name) {
            debug!("Found project '{}' with id {}", name, project.id);
            return Ok(project.id.clone());
        }

        let project_id = self
            .gateway
            .create_project(owner, name, request.preset.as_deref())
            .await
            .map_err(|e| e.into_error(Phase::ProjectResolution))?;
        info!("Created project '{}' with id {}", name, project_id);
        Ok(project_id)
    }

    async fn register_scan_id(&self, scan_id: &str) -> Result<()> {
        let mut issued = self.issued.lock().await;
        if !issued.insert(scan_id.to_string()) {
            return Err(Error::DataIntegrity {
                scan_id: Some(scan_id.to_string()),
                phase: Phase::ScanCreation,
                finding_id: None,
                message: String::from("service issued a scan id that was already handed out"),
            });
        }
        Ok(())
    }

    async fn upload_source(&self, origin: &SourceOrigin, target: &UploadTarget) -> Result<()> {
        let packaged = self.packager.package(origin).await?;
        debug!("Uploading {:?} to {}", packaged.path, target.url);

        let uploaded = self
            .gateway
            .upload_source(target, &packaged.path)
            .await
            .map_err(|e| e.into_error(Phase::SourceUpload));

        if packaged.temporary {
            if let Err(e) = tokio::fs::remove_file(&packaged.path).await {
                warn!("Failed to delete archive {:?}: {}", packaged.path, e);
            }
        }

        uploaded
    }

    // ── Polling ──

    /// Poll until the scan reaches a terminal state.
    ///
    /// The budget runs from the first status check. A `Failed` or `Canceled`
    /// scan is an upstream state error; running out of budget is a timeout.
    pub async fn wait_for_completion(&self, handle: &ScanHandle, timeout_minutes: u32) -> Result<()> {
        let scan_id = handle.scan_id.as_str();
        let budget = Duration::from_secs(u64::from(timeout_minutes) * 60);
        let started = Instant::now();
        let mut last_status = None;

        info!(
            "Waiting for scan {} (budget {}m, interval {}s)",
            scan_id,
            timeout_minutes,
            self.config.poll_interval.as_secs()
        );

        loop {
            let state = self
                .gateway
                .scan_status(scan_id)
                .await
                .map_err(|e| e.into_error(Phase::Polling).with_scan_id(scan_id))?;

            if last_status != Some(state.status) {
                info!("Scan {} is {}", scan_id, state.status);
                last_status = Some(state.status);
            } else if let Some(progress) = state.progress {
                debug!("Scan {} at {}%", scan_id, progress);
            }

            match state.status {
                ScanStatus::Finished => return Ok(()),
                ScanStatus::Failed | ScanStatus::Canceled => {
                    return Err(Error::UpstreamState {
                        scan_id: Some(scan_id.to_string()),
                        phase: Phase::Polling,
                        state: state.status,
                    })
                }
                _ => {}
            }

            let elapsed = started.elapsed();
            if elapsed >= budget {
                warn!("Scan {} still {} after {}s", scan_id, state.status, elapsed.as_secs());
                return Err(Error::Timeout {
                    scan_id: Some(scan_id.to_string()),
                    phase: Phase::Polling,
                    elapsed,
                    budget,
                });
            }

            sleep(self.config.poll_interval).await;
        }
    }

    // ── Results ──

    /// Fetch every engine's results, filter and de-duplicate them.
    ///
    /// The filter is compiled before anything is fetched, so a broken
    /// filter fails without touching the service.
    pub async fn get_filtered_results(
        &self,
        handle: &ScanHandle,
        filters: &FilterConfiguration,
    ) -> Result<ScanReport> {
        let scan_id = handle.scan_id.as_str();
        let project_id = handle.project_id.as_str();
        let filter = FilterSet::compile(filters).map_err(|e| e.with_scan_id(scan_id))?;

        let details = self
            .gateway
            .scan_details(scan_id)
            .await
            .map_err(|e| e.into_error(Phase::ResultRetrieval).with_scan_id(scan_id))?;
        let engines = self.result_engines(&details.engines);

        let fetcher = GatewaySource {
            gateway: &self.gateway,
            project_id,
            scan_id,
        };
        let mut aggregator = ResultAggregator::new(scan_id, &filter, fetcher);

        for engine in &engines {
            let gateway = &self.gateway;
            let engine = *engine;
            let findings = fetch_all(self.config.page_size, move |page, size| {
                gateway.list_results(project_id, scan_id, engine, page, size)
            })
            .await
            .map_err(|e| e.into_error(Phase::ResultRetrieval).with_scan_id(scan_id))?;

            info!("Fetched {} {} results for scan {}", findings.len(), engine, scan_id);
            aggregator.add_all(findings).await?;
        }

        let results = aggregator.finish();
        let link = deep_link(&self.config.portal_url, &details, &engines);
        Ok(ScanReport::new(details, results, link))
    }

    /// Engines the service reports for the scan, else the configured ones
    fn result_engines(&self, summaries: &[scanpilot_gateway::EngineSummary]) -> Vec<Engine> {
        let reported: Vec<Engine> = summaries
            .iter()
            .filter_map(|s| match s.engine.parse::<Engine>() {
                Ok(engine) => Some(engine),
                Err(_) => {
                    debug!("Ignoring unknown engine '{}'", s.engine);
                    None
                }
            })
            .collect();

        if reported.is_empty() {
            self.config.engines.clone()
        } else {
            reported
        }
    }

    /// Create, wait for and report on one scan.
    ///
    /// The request and the filters are both checked before the service is
    /// contacted.
    pub async fn scan_and_report(
        &self,
        request: &ScanRequest,
        timeout_minutes: u32,
        filters: &FilterConfiguration,
    ) -> Result<ScanReport> {
        request.validate()?;
        FilterSet::compile(filters)?;
        let handle = self.create_scan(request).await?;
        self.wait_for_completion(&handle, timeout_minutes).await?;
        self.get_filtered_results(&handle, filters).await
    }

    // ── Lookups ──

    /// Handle for a scan created elsewhere
    pub async fn handle_for(&self, scan_id: &str) -> Result<ScanHandle> {
        let details = self
            .gateway
            .scan_details(scan_id)
            .await
            .map_err(|e| e.into_error(Phase::ResultRetrieval).with_scan_id(scan_id))?;
        Ok(ScanHandle::new(details.scan_id, details.project_id))
    }

    /// Team id for a backslash-separated team path
    pub async fn resolve_team_id(&self, team_path: &str) -> Result<Option<String>> {
        let tree = self
            .gateway
            .navigation_tree()
            .await
            .map_err(|e| e.into_error(Phase::TeamResolution))?;

        let team_id = find_team_id(&tree, team_path);
        match &team_id {
            Some(id) => debug!("Team '{}' resolved to {}", team_path, id),
            None => debug!("Team '{}' not found", team_path),
        }
        Ok(team_id)
    }

    /// Create a team under a business unit
    pub async fn create_team(&self, parent_id: &str, name: &str) -> Result<String> {
        let team_id = self
            .gateway
            .create_application(parent_id, name, GENERATED_DESCRIPTION)
            .await
            .map_err(|e| e.into_error(Phase::TeamResolution))?;
        info!("Created team '{}' with id {}", name, team_id);
        Ok(team_id)
    }

    /// Most recent finished scan of a project
    pub async fn last_finished_scan(&self, project_id: &str) -> Result<Option<String>> {
        let gateway = &self.gateway;
        let scans = fetch_all(self.config.page_size, move |page, size| {
            gateway.list_scans(project_id, page, size)
        })
        .await
        .map_err(|e| e.into_error(Phase::ResultRetrieval))?;

        Ok(scans
            .into_iter()
            .find(|scan| scan.status == ScanStatus::Finished)
            .map(|scan| scan.id))
    }
}

fn engine_list(engines: &[Engine]) -> String {
    engines
        .iter()
        .map(Engine::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Source files of one scan, read through the gateway
struct GatewaySource<'a, G> {
    gateway: &'a G,
    project_id: &'a str,
    scan_id: &'a str,
}

#[async_trait]
impl<'a, G: ScanGateway> SourceFetcher for GatewaySource<'a, G> {
    async fn fetch(&self, path: &str) -> Result<String> {
        self.gateway
            .source_file(self.project_id, self.scan_id, path)
            .await
            .map_err(|e| e.into_error(Phase::ResultRetrieval).with_scan_id(self.scan_id))
    }
}
