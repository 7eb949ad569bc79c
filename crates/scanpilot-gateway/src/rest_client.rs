//! REST client for the remote scanning service
//!
//! API endpoints used:
//! - GET    /projects/projects                         - List projects (criteria paged)
//! - PUT    /projects/projects                         - Create project
//! - POST   /v1/scans                                  - Create scan, get upload target
//! - POST   /v1/scans/:id/start                        - Trigger analysis
//! - GET    /v1/scans/:id/status                       - Scan status
//! - GET    /v1/scans/:id                              - Scan details
//! - GET    /results/results                           - Scan results (criteria paged)
//! - GET    /projects/projects/:p/scans/:s/files       - Source file content
//! - GET    /navigation-tree/navigation-tree           - Business unit tree
//! - PUT    /applications/applications                 - Create application
//! - GET    /scans/scans                               - Project scan history
//!

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response};
use scanpilot_core::{Engine, RawFinding};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::gateway::{
    CreatedScan, GatewayError, GatewayResult, Project, ScanDetails, ScanGateway, ScanState,
    ScanSummary, UploadTarget,
};
use crate::navigation::TreeNode;
use crate::paging::Page;
use crate::types::{
    parse_status, CreateApplicationBody, CreateApplicationRequest, CreateProjectBody,
    CreateProjectRequest, CreateScanRequest, CreateScanResponse, CreatedId, Envelope,
    NavigationTree, ProjectList, SastResultList, ScaResultList, ScanList, SourceFile,
    StatusResponse, TriggerScanRequest, WireScan,
};

/// Description given to applications created on behalf of a team
pub const GENERATED_DESCRIPTION: &str = "Generated by ScanPilot";

// ── Configuration ────────────────────────────────────────────────────────────

/// Configuration for the REST gateway
#[derive(Debug, Clone)]
pub struct RestGatewayConfig {
    /// Service API base URL (e.g., "https://ast.example.com/api")
    pub base_url: String,
    /// Bearer token for API calls
    pub api_token: String,
    /// HTTP request timeout
    pub request_timeout: Duration,
    /// Client version reported in the User-Agent
    pub version: String,
}

impl Default for RestGatewayConfig {
    fn default() -> Self {
        Self {
            base_url: String::from("https://localhost"),
            api_token: String::new(),
            request_timeout: Duration::from_secs(60),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// ── REST Gateway ─────────────────────────────────────────────────────────────

/// `ScanGateway` over the service's HTTP/JSON API
pub struct RestGateway {
    config: RestGatewayConfig,
    http: Client,
}

impl RestGateway {
    /// Create a new REST gateway
    pub fn new(config: RestGatewayConfig) -> GatewayResult<Self> {
        if config.base_url.trim().is_empty() {
            return Err(GatewayError::NotConfigured("base_url is required".into()));
        }
        if config.api_token.is_empty() {
            return Err(GatewayError::NotConfigured("api_token is required".into()));
        }

        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(format!("ScanPilot/{}", config.version))
            .build()?;

        Ok(Self { config, http })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.api_url(path))
            .bearer_auth(&self.config.api_token)
            .header("Accept", "application/json")
    }

    /// Turn non-2xx answers into `GatewayError::Api`
    async fn check(res: Response) -> GatewayResult<Response> {
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let text = res.text().await.unwrap_or_default();
            return Err(GatewayError::Api {
                status,
                message: text,
            });
        }
        Ok(res)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> GatewayResult<T> {
        let res = self.request(Method::GET, path).query(query).send().await?;
        let res = Self::check(res).await?;
        Ok(res.json().await?)
    }

    async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> GatewayResult<T> {
        let res = self.request(method, path).json(body).send().await?;
        let res = Self::check(res).await?;
        Ok(res.json().await?)
    }

    /// Encode listing criteria the way the management endpoints expect
    fn criteria(keys: &[(&str, &str)], page: u32, page_size: u32) -> String {
        let criteria: Vec<_> = keys
            .iter()
            .map(|(key, value)| json!({ "key": key, "value": value }))
            .collect();
        json!({
            "criteria": criteria,
            "pagination": { "currentPage": page, "pageSize": page_size },
            "sorting": [],
        })
        .to_string()
    }
}

#[async_trait]
impl ScanGateway for RestGateway {
    async fn list_projects(
        &self,
        owner_team_id: &str,
        page: u32,
        page_size: u32,
    ) -> GatewayResult<Page<Project>> {
        let criteria = Self::criteria(&[("applicationId", owner_team_id)], page, page_size);
        let body: Envelope<ProjectList> = self
            .get_json("/projects/projects", &[("criteria", criteria)])
            .await?;

        debug!(
            "Project page {} for team {}: {} of {}",
            page,
            owner_team_id,
            body.data.projects.len(),
            body.data.total_count
        );

        Ok(Page::new(
            body.data.total_count,
            body.data
                .projects
                .into_iter()
                .map(|p| Project {
                    id: p.id,
                    name: p.name,
                })
                .collect(),
        ))
    }

    async fn create_project(
        &self,
        owner_team_id: &str,
        name: &str,
        preset: Option<&str>,
    ) -> GatewayResult<String> {
        let request = CreateProjectRequest {
            project: CreateProjectBody {
                business_application_id: owner_team_id,
                name,
                description: "",
                type_ids: preset.into_iter().collect(),
                criticality: 5,
            },
        };
        let created: Envelope<CreatedId> = self
            .send_json(Method::PUT, "/projects/projects", &request)
            .await?;

        debug!("Created project '{}' with id {}", name, created.data.id);
        Ok(created.data.id)
    }

    async fn create_scan(&self, project_id: &str, engines: &[Engine]) -> GatewayResult<CreatedScan> {
        let request = CreateScanRequest {
            project_id,
            engine_types: engines.iter().map(Engine::as_str).collect(),
        };
        let created: CreateScanResponse =
            self.send_json(Method::POST, "/v1/scans", &request).await?;

        debug!(
            "Created scan {} for project {}",
            created.scan.id, project_id
        );
        Ok(CreatedScan {
            scan_id: created.scan.id,
            upload: UploadTarget::from(created.storage),
        })
    }

    async fn upload_source(&self, target: &UploadTarget, archive: &Path) -> GatewayResult<()> {
        let bytes = tokio::fs::read(archive).await?;
        let size = bytes.len();
        let file_name = archive
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| String::from("source.zip"));

        // The object store requires the file to be the last form field
        let mut form = Form::new();
        for (name, value) in &target.fields {
            form = form.text(name.clone(), value.clone());
        }
        form = form.part("file", Part::bytes(bytes).file_name(file_name));

        // Pre-signed: no bearer token
        let res = self.http.post(&target.url).multipart(form).send().await?;
        Self::check(res).await?;

        info!("Uploaded {} bytes of source to {}", size, target.url);
        Ok(())
    }

    async fn trigger_scan(
        &self,
        scan_id: &str,
        engines: &[Engine],
        preset: Option<&str>,
    ) -> GatewayResult<()> {
        let request = TriggerScanRequest {
            engine_types: engines.iter().map(Engine::as_str).collect(),
            preset,
        };
        let res = self
            .request(Method::POST, &format!("/v1/scans/{}/start", scan_id))
            .json(&request)
            .send()
            .await?;
        Self::check(res).await?;

        debug!("Scan {} triggered", scan_id);
        Ok(())
    }

    async fn scan_status(&self, scan_id: &str) -> GatewayResult<ScanState> {
        let body: StatusResponse = self
            .get_json(&format!("/v1/scans/{}/status", scan_id), &[])
            .await?;
        Ok(ScanState {
            status: parse_status(&body.status)?,
            progress: body.progress,
        })
    }

    async fn scan_details(&self, scan_id: &str) -> GatewayResult<ScanDetails> {
        let scan: WireScan = self.get_json(&format!("/v1/scans/{}", scan_id), &[]).await?;
        ScanDetails::try_from(scan)
    }

    async fn list_results(
        &self,
        project_id: &str,
        scan_id: &str,
        engine: Engine,
        page: u32,
        page_size: u32,
    ) -> GatewayResult<Page<RawFinding>> {
        let criteria = Self::criteria(
            &[
                ("projectId", project_id),
                ("scanId", scan_id),
                ("engine", engine.as_str()),
            ],
            page,
            page_size,
        );
        let query = [("criteria", criteria)];

        let page = match engine {
            Engine::Sast => {
                let body: Envelope<SastResultList> =
                    self.get_json("/results/results", &query).await?;
                Page::new(
                    body.data.total_count,
                    body.data.results.into_iter().map(RawFinding::Sast).collect(),
                )
            }
            Engine::Sca => {
                let body: Envelope<ScaResultList> =
                    self.get_json("/results/results", &query).await?;
                Page::new(
                    body.data.total_count,
                    body.data.results.into_iter().map(RawFinding::Sca).collect(),
                )
            }
        };

        debug!(
            "{} results for scan {}: {} items, total {}",
            engine,
            scan_id,
            page.items.len(),
            page.total_count
        );
        Ok(page)
    }

    async fn source_file(
        &self,
        project_id: &str,
        scan_id: &str,
        path: &str,
    ) -> GatewayResult<String> {
        let body: Envelope<SourceFile> = self
            .get_json(
                &format!("/projects/projects/{}/scans/{}/files", project_id, scan_id),
                &[("filePath", path.to_string())],
            )
            .await?;
        Ok(body.data.code)
    }

    async fn navigation_tree(&self) -> GatewayResult<Vec<TreeNode>> {
        let body: Envelope<NavigationTree> = self
            .get_json("/navigation-tree/navigation-tree", &[])
            .await?;
        Ok(body.data.tree)
    }

    async fn create_application(
        &self,
        parent_id: &str,
        name: &str,
        description: &str,
    ) -> GatewayResult<String> {
        let request = CreateApplicationRequest {
            business_application: CreateApplicationBody {
                ba_name: name,
                description,
                criticality: 5,
                ba_bu_id: parent_id,
                license_type: "standard",
            },
        };
        let created: Envelope<CreatedId> = self
            .send_json(Method::PUT, "/applications/applications", &request)
            .await?;

        debug!("Created application '{}' with id {}", name, created.data.id);
        Ok(created.data.id)
    }

    async fn list_scans(
        &self,
        project_id: &str,
        page: u32,
        page_size: u32,
    ) -> GatewayResult<Page<ScanSummary>> {
        let criteria = Self::criteria(&[("projectId", project_id)], page, page_size);
        let body: Envelope<ScanList> = self
            .get_json("/scans/scans", &[("criteria", criteria)])
            .await?;

        let scans = body
            .data
            .scans
            .into_iter()
            .map(|s| {
                Ok(ScanSummary {
                    status: parse_status(&s.status)?,
                    id: s.id,
                })
            })
            .collect::<GatewayResult<Vec<_>>>()?;

        Ok(Page::new(body.data.total_count, scans))
    }
}
