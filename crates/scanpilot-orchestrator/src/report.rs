//! Caller-facing scan report

use scanpilot_core::{CanonicalIssue, Engine, Severity, SeverityHistogram};
use scanpilot_gateway::{EngineSummary, ScanDetails};
use scanpilot_results::{AggregatedResults, AggregationStats};
use serde::Serialize;

/// Filtered, de-duplicated results of one finished scan
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub scan_id: String,
    pub project_id: String,
    /// Issues in first-seen order
    pub issues: Vec<CanonicalIssue>,
    pub histogram: SeverityHistogram,
    /// Portal page for the scan
    pub deep_link: String,
    /// Severity counts as summarised by the service, before filtering
    pub engines: Vec<EngineSummary>,
    pub stats: AggregationStats,
}

impl ScanReport {
    pub fn new(details: ScanDetails, results: AggregatedResults, deep_link: String) -> Self {
        Self {
            scan_id: details.scan_id,
            project_id: details.project_id,
            issues: results.issues,
            histogram: results.histogram,
            deep_link,
            engines: details.engines,
            stats: results.stats,
        }
    }

    pub fn issue_count(&self) -> usize {
        self.issues.len()
    }

    pub fn highest_severity(&self) -> Option<Severity> {
        self.histogram.highest()
    }

    /// Issues at or above `min`
    pub fn issues_at_least(&self, min: Severity) -> impl Iterator<Item = &CanonicalIssue> {
        self.issues.iter().filter(move |issue| issue.severity >= min)
    }
}

/// Portal link for a scan.
///
/// SCA-only scans link to the project page, which is where the portal shows
/// package results.
pub fn deep_link(portal_base: &str, details: &ScanDetails, engines: &[Engine]) -> String {
    let base = portal_base.trim_end_matches('/');
    let project = format!(
        "{}/scan/business-unit/{}/application/{}/project/{}",
        base, details.business_unit_id, details.application_id, details.project_id
    );
    if !engines.is_empty() && engines.iter().all(|e| *e == Engine::Sca) {
        project
    } else {
        format!("{}/scans/{}", project, details.scan_id)
    }
}
