//! In-memory scanning service for orchestrator tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use scanpilot_core::{Engine, RawFinding, SastFinding, SastNode, ScaFinding, ScanStatus};
use scanpilot_gateway::{
    CreatedScan, EngineSummary, GatewayError, GatewayResult, Page, Project, ScanDetails,
    ScanGateway, ScanState, ScanSummary, TreeNode, UploadTarget,
};

#[derive(Default)]
struct State {
    projects: Vec<Project>,
    next_project_id: String,
    scan_ids: VecDeque<String>,
    statuses: VecDeque<ScanStatus>,
    last_status: Option<ScanStatus>,
    results: HashMap<Engine, Vec<RawFinding>>,
    sources: HashMap<String, String>,
    engines: Vec<EngineSummary>,
    scans: Vec<ScanSummary>,
    tree: Vec<TreeNode>,
    uploads: Vec<PathBuf>,
    triggered: Vec<(String, Option<String>)>,
    created_projects: Vec<String>,
    fail_upload: bool,
}

/// Mock gateway; clones share state so tests can inspect calls afterwards
#[derive(Clone, Default)]
pub struct MockGateway {
    state: Arc<Mutex<State>>,
    pub status_calls: Arc<AtomicUsize>,
    pub source_calls: Arc<AtomicUsize>,
    pub project_pages: Arc<AtomicUsize>,
}

impl MockGateway {
    pub fn new() -> Self {
        let gateway = Self::default();
        {
            let mut state = gateway.state.lock().unwrap();
            state.next_project_id = String::from("42");
            state.scan_ids.push_back(String::from("123"));
        }
        gateway
    }

    pub fn with_project(self, id: &str, name: &str) -> Self {
        self.state.lock().unwrap().projects.push(Project {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn with_scan_ids(self, ids: &[&str]) -> Self {
        self.state.lock().unwrap().scan_ids = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Statuses reported in turn; the last one repeats
    pub fn with_statuses(self, statuses: &[ScanStatus]) -> Self {
        self.state.lock().unwrap().statuses = statuses.iter().copied().collect();
        self
    }

    pub fn with_results(self, engine: Engine, findings: Vec<RawFinding>) -> Self {
        self.state.lock().unwrap().results.insert(engine, findings);
        self
    }

    pub fn with_source(self, path: &str, content: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .sources
            .insert(path.to_string(), content.to_string());
        self
    }

    pub fn with_engine_summary(self, engine: &str, high: u32, medium: u32, low: u32) -> Self {
        self.state.lock().unwrap().engines.push(EngineSummary {
            engine: engine.to_string(),
            high,
            medium,
            low,
        });
        self
    }

    pub fn with_scan_history(self, history: &[(&str, ScanStatus)]) -> Self {
        self.state.lock().unwrap().scans = history
            .iter()
            .map(|(id, status)| ScanSummary {
                id: id.to_string(),
                status: *status,
            })
            .collect();
        self
    }

    pub fn with_tree(self, tree: Vec<TreeNode>) -> Self {
        self.state.lock().unwrap().tree = tree;
        self
    }

    pub fn failing_upload(self) -> Self {
        self.state.lock().unwrap().fail_upload = true;
        self
    }

    pub fn uploads(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn triggered(&self) -> Vec<(String, Option<String>)> {
        self.state.lock().unwrap().triggered.clone()
    }

    pub fn created_projects(&self) -> Vec<String> {
        self.state.lock().unwrap().created_projects.clone()
    }
}

fn page_of<T: Clone>(items: &[T], page: u32, page_size: u32) -> Page<T> {
    let start = (page * page_size) as usize;
    let end = usize::min(start + page_size as usize, items.len());
    let slice = if start < items.len() {
        items[start..end].to_vec()
    } else {
        Vec::new()
    };
    Page::new(items.len() as u64, slice)
}

#[async_trait]
impl ScanGateway for MockGateway {
    async fn list_projects(
        &self,
        _owner_team_id: &str,
        page: u32,
        page_size: u32,
    ) -> GatewayResult<Page<Project>> {
        self.project_pages.fetch_add(1, Ordering::SeqCst);
        Ok(page_of(&self.state.lock().unwrap().projects, page, page_size))
    }

    async fn create_project(
        &self,
        _owner_team_id: &str,
        name: &str,
        _preset: Option<&str>,
    ) -> GatewayResult<String> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_project_id.clone();
        state.created_projects.push(name.to_string());
        state.projects.push(Project {
            id: id.clone(),
            name: name.to_string(),
        });
        Ok(id)
    }

    async fn create_scan(&self, _project_id: &str, _engines: &[Engine]) -> GatewayResult<CreatedScan> {
        let mut state = self.state.lock().unwrap();
        let scan_id = state.scan_ids.pop_front().unwrap_or_else(|| String::from("123"));
        Ok(CreatedScan {
            scan_id,
            upload: UploadTarget {
                url: String::from("https://uploads.example.com/bucket"),
                fields: vec![(String::from("key"), String::from("uploads/source.zip"))],
            },
        })
    }

    async fn upload_source(&self, _target: &UploadTarget, archive: &Path) -> GatewayResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_upload {
            return Err(GatewayError::Api {
                status: 403,
                message: String::from("signature expired"),
            });
        }
        state.uploads.push(archive.to_path_buf());
        Ok(())
    }

    async fn trigger_scan(
        &self,
        scan_id: &str,
        _engines: &[Engine],
        preset: Option<&str>,
    ) -> GatewayResult<()> {
        self.state
            .lock()
            .unwrap()
            .triggered
            .push((scan_id.to_string(), preset.map(str::to_string)));
        Ok(())
    }

    async fn scan_status(&self, _scan_id: &str) -> GatewayResult<ScanState> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let status = match state.statuses.pop_front() {
            Some(status) => {
                state.last_status = Some(status);
                status
            }
            None => state.last_status.unwrap_or(ScanStatus::Scanning),
        };
        Ok(ScanState {
            status,
            progress: None,
        })
    }

    async fn scan_details(&self, scan_id: &str) -> GatewayResult<ScanDetails> {
        let state = self.state.lock().unwrap();
        Ok(ScanDetails {
            scan_id: scan_id.to_string(),
            project_id: String::from("42"),
            application_id: String::from("7"),
            business_unit_id: String::from("3"),
            status: state.last_status.unwrap_or(ScanStatus::Finished),
            engines: state.engines.clone(),
        })
    }

    async fn list_results(
        &self,
        _project_id: &str,
        _scan_id: &str,
        engine: Engine,
        page: u32,
        page_size: u32,
    ) -> GatewayResult<Page<RawFinding>> {
        let state = self.state.lock().unwrap();
        let findings = state.results.get(&engine).cloned().unwrap_or_default();
        Ok(page_of(&findings, page, page_size))
    }

    async fn source_file(&self, _project_id: &str, _scan_id: &str, path: &str) -> GatewayResult<String> {
        self.source_calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .unwrap()
            .sources
            .get(path)
            .cloned()
            .ok_or_else(|| GatewayError::Api {
                status: 404,
                message: format!("{} not found", path),
            })
    }

    async fn navigation_tree(&self) -> GatewayResult<Vec<TreeNode>> {
        Ok(self.state.lock().unwrap().tree.clone())
    }

    async fn create_application(
        &self,
        _parent_id: &str,
        _name: &str,
        _description: &str,
    ) -> GatewayResult<String> {
        Ok(String::from("99"))
    }

    async fn list_scans(
        &self,
        _project_id: &str,
        page: u32,
        page_size: u32,
    ) -> GatewayResult<Page<ScanSummary>> {
        Ok(page_of(&self.state.lock().unwrap().scans, page, page_size))
    }
}

// ── Finding builders ──

pub fn sast(id: &str, similarity: &str, severity: &str, file: &str, line: u32) -> RawFinding {
    RawFinding::Sast(SastFinding {
        id: Some(id.to_string()),
        similarity_id: Some(similarity.to_string()),
        query_name: Some(String::from("SQL_Injection")),
        severity: Some(severity.to_string()),
        state: Some(0),
        status: Some(String::from("NEW")),
        cwe_id: Some(89),
        language: Some(String::from("Java")),
        description: None,
        nodes: vec![SastNode {
            file_name: file.to_string(),
            line,
            column: Some(5),
            name: Some(String::from("query")),
        }],
    })
}

pub fn sca(id: &str, package: &str, severity: &str, ignored: bool) -> RawFinding {
    RawFinding::Sca(ScaFinding {
        id: Some(id.to_string()),
        package_id: Some(package.to_string()),
        severity: Some(severity.to_string()),
        recommended_version: Some(String::from("2.0.0")),
        ignored,
        ..ScaFinding::default()
    })
}
