//! Integration tests for the scan lifecycle:
//! - project resolution and creation
//! - scan creation, upload and triggering
//! - polling to a terminal state or timeout

mod support;

use std::io::Write;
use std::sync::atomic::Ordering;
use std::time::Duration;

use scanpilot_core::{
    Engine, EngineFilters, Error, FilterConfiguration, Phase, ScanRequest, ScanStatus, SourceOrigin,
};
use scanpilot_gateway::TreeNode;
use scanpilot_orchestrator::{OrchestratorConfig, PackagedSource, ScanOrchestrator, SourcePackager};
use support::{sast, MockGateway};
use tempfile::NamedTempFile;

fn archive() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"PK\x03\x04").unwrap();
    file
}

fn request(archive: &NamedTempFile) -> ScanRequest {
    ScanRequest::new(
        "webgoat",
        "team-1",
        SourceOrigin::File(archive.path().to_path_buf()),
    )
}

fn config() -> OrchestratorConfig {
    OrchestratorConfig::default().poll_interval(Duration::from_secs(10))
}

#[tokio::test(start_paused = true)]
async fn test_create_and_wait_end_to_end() {
    let gateway = MockGateway::new().with_statuses(&[
        ScanStatus::Queued,
        ScanStatus::Scanning,
        ScanStatus::Finished,
    ]);
    let orchestrator = ScanOrchestrator::new(gateway.clone(), config());
    let source = archive();

    let handle = orchestrator.create_scan(&request(&source)).await.unwrap();
    assert_eq!(handle.scan_id, "123");
    assert_eq!(handle.project_id, "42");
    assert_eq!(gateway.created_projects(), vec![String::from("webgoat")]);
    assert_eq!(gateway.uploads(), vec![source.path().to_path_buf()]);
    assert_eq!(gateway.triggered().len(), 1);

    orchestrator.wait_for_completion(&handle, 5).await.unwrap();
    assert_eq!(gateway.status_calls.load(Ordering::SeqCst), 3);

    // Caller-owned archives are never removed
    assert!(source.path().exists());
}

#[tokio::test]
async fn test_existing_project_is_reused() {
    let gateway = MockGateway::new()
        .with_project("7", "legacy")
        .with_project("8", "webgoat");
    let orchestrator = ScanOrchestrator::new(gateway.clone(), config());
    let source = archive();

    let handle = orchestrator.create_scan(&request(&source)).await.unwrap();
    assert_eq!(handle.project_id, "8");
    assert!(gateway.created_projects().is_empty());
}

#[tokio::test]
async fn test_projects_found_across_pages() {
    let mut gateway = MockGateway::new();
    for n in 0..5 {
        gateway = gateway.with_project(&n.to_string(), &format!("project-{}", n));
    }
    let gateway = gateway.with_project("77", "webgoat");
    let orchestrator = ScanOrchestrator::new(gateway.clone(), config().page_size(2));
    let source = archive();

    let handle = orchestrator.create_scan(&request(&source)).await.unwrap();
    assert_eq!(handle.project_id, "77");
    assert_eq!(gateway.project_pages.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_invalid_request_rejected_before_any_call() {
    let gateway = MockGateway::new();
    let orchestrator = ScanOrchestrator::new(gateway.clone(), config());
    let source = archive();

    let err = orchestrator
        .create_scan(&request(&source).engines(Vec::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRequest { .. }));
    assert_eq!(gateway.project_pages.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_upload_failure_carries_scan_id() {
    let gateway = MockGateway::new().failing_upload();
    let orchestrator = ScanOrchestrator::new(gateway.clone(), config());
    let source = archive();

    let err = orchestrator.create_scan(&request(&source)).await.unwrap_err();
    match err {
        Error::Transport {
            scan_id,
            phase,
            status,
            ..
        } => {
            assert_eq!(scan_id.as_deref(), Some("123"));
            assert_eq!(phase, Phase::SourceUpload);
            assert_eq!(status, Some(403));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(gateway.triggered().is_empty());
}

#[tokio::test]
async fn test_duplicate_scan_id_rejected() {
    let gateway = MockGateway::new().with_scan_ids(&["123", "123"]);
    let orchestrator = ScanOrchestrator::new(gateway, config());
    let source = archive();

    orchestrator.create_scan(&request(&source)).await.unwrap();
    let err = orchestrator.create_scan(&request(&source)).await.unwrap_err();
    assert!(matches!(
        err,
        Error::DataIntegrity {
            phase: Phase::ScanCreation,
            ..
        }
    ));
    assert_eq!(err.scan_id(), Some("123"));
}

struct TempArchivePackager {
    dir: tempfile::TempDir,
}

#[async_trait::async_trait]
impl SourcePackager for TempArchivePackager {
    async fn package(&self, _origin: &SourceOrigin) -> scanpilot_core::Result<PackagedSource> {
        let path = self.dir.path().join("source.zip");
        std::fs::write(&path, b"PK\x03\x04").unwrap();
        Ok(PackagedSource::temporary(path))
    }
}

#[tokio::test]
async fn test_temporary_archive_removed_after_upload() {
    let gateway = MockGateway::new();
    let packager = TempArchivePackager {
        dir: tempfile::tempdir().unwrap(),
    };
    let archive_path = packager.dir.path().join("source.zip");
    let orchestrator = ScanOrchestrator::new(gateway.clone(), config()).with_packager(packager);

    let git = ScanRequest::new(
        "webgoat",
        "team-1",
        SourceOrigin::GitRepo {
            url: String::from("https://git.example.com/webgoat.git"),
            branch: None,
        },
    );
    orchestrator.create_scan(&git).await.unwrap();

    assert_eq!(gateway.uploads(), vec![archive_path.clone()]);
    assert!(!archive_path.exists());
}

#[tokio::test(start_paused = true)]
async fn test_wait_times_out_after_budget() {
    let gateway = MockGateway::new().with_statuses(&[ScanStatus::Scanning]);
    let orchestrator = ScanOrchestrator::new(gateway.clone(), config());
    let handle = scanpilot_core::ScanHandle::new("123", "42");

    let err = orchestrator.wait_for_completion(&handle, 1).await.unwrap_err();
    match err {
        Error::Timeout {
            elapsed,
            budget,
            scan_id,
            ..
        } => {
            assert_eq!(budget, Duration::from_secs(60));
            assert!(elapsed >= Duration::from_secs(60));
            assert!(elapsed <= Duration::from_secs(70));
            assert_eq!(scan_id.as_deref(), Some("123"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    // Checks at 0s, 10s, ... 60s
    assert_eq!(gateway.status_calls.load(Ordering::SeqCst), 7);
}

#[tokio::test(start_paused = true)]
async fn test_failed_scan_is_upstream_state_error() {
    let gateway =
        MockGateway::new().with_statuses(&[ScanStatus::Queued, ScanStatus::Failed]);
    let orchestrator = ScanOrchestrator::new(gateway, config());
    let handle = scanpilot_core::ScanHandle::new("123", "42");

    let err = orchestrator.wait_for_completion(&handle, 5).await.unwrap_err();
    assert!(matches!(
        err,
        Error::UpstreamState {
            state: ScanStatus::Failed,
            ..
        }
    ));
    assert_eq!(err.code(), "SCAN_FAILED");
}

#[tokio::test(start_paused = true)]
async fn test_canceled_scan_is_not_a_timeout() {
    let gateway = MockGateway::new().with_statuses(&[ScanStatus::Canceled]);
    let orchestrator = ScanOrchestrator::new(gateway, config());
    let handle = scanpilot_core::ScanHandle::new("123", "42");

    let err = orchestrator.wait_for_completion(&handle, 0).await.unwrap_err();
    assert!(matches!(err, Error::UpstreamState { .. }));
}

#[tokio::test]
async fn test_team_resolution_and_creation() {
    let tree = vec![TreeNode::new("1", "CxServer")
        .child(TreeNode::new("3", "Unit").child(TreeNode::new("7", "Payments")))];
    let gateway = MockGateway::new().with_tree(tree);
    let orchestrator = ScanOrchestrator::new(gateway, config());

    assert_eq!(
        orchestrator
            .resolve_team_id("\\CxServer\\Unit\\Payments")
            .await
            .unwrap()
            .as_deref(),
        Some("7")
    );
    assert_eq!(
        orchestrator.resolve_team_id("\\CxServer\\Other").await.unwrap(),
        None
    );
    assert_eq!(orchestrator.create_team("3", "Checkout").await.unwrap(), "99");
}

#[tokio::test]
async fn test_last_finished_scan() {
    let gateway = MockGateway::new().with_scan_history(&[
        ("130", ScanStatus::Scanning),
        ("129", ScanStatus::Failed),
        ("128", ScanStatus::Finished),
        ("120", ScanStatus::Finished),
    ]);
    let orchestrator = ScanOrchestrator::new(gateway, config().page_size(2));

    assert_eq!(
        orchestrator.last_finished_scan("42").await.unwrap().as_deref(),
        Some("128")
    );
}

#[tokio::test(start_paused = true)]
async fn test_scan_and_report_end_to_end() {
    let gateway = MockGateway::new()
        .with_statuses(&[ScanStatus::Scanning, ScanStatus::Finished])
        .with_results(
            Engine::Sast,
            vec![sast("r-1", "sim-1", "High", "src/A.java", 1)],
        );
    let orchestrator = ScanOrchestrator::new(gateway.clone(), config());
    let source = archive();

    let report = orchestrator
        .scan_and_report(&request(&source), 5, &FilterConfiguration::none())
        .await
        .unwrap();

    assert_eq!(report.scan_id, "123");
    assert_eq!(report.issue_count(), 1);
    assert_eq!(gateway.status_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_malformed_script_rejected_before_any_call() {
    let gateway = MockGateway::new();
    let orchestrator = ScanOrchestrator::new(gateway.clone(), config());
    let source = archive();
    let filters =
        FilterConfiguration::none().sca(EngineFilters::scripted("finding.severity == ("));

    let err = orchestrator
        .scan_and_report(&request(&source), 5, &filters)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Configuration {
            phase: Phase::Filtering,
            ..
        }
    ));
    assert_eq!(gateway.project_pages.load(Ordering::SeqCst), 0);
    assert!(gateway.created_projects().is_empty());
    assert!(gateway.uploads().is_empty());
    assert_eq!(gateway.status_calls.load(Ordering::SeqCst), 0);
}
