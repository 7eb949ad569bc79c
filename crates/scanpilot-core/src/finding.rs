//! Raw engine findings and the canonical issues they are merged into

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

use crate::error::{Error, Result};
use crate::filter::FilterableView;
use crate::scan::Engine;
use crate::severity::Severity;

/// Triage state the service assigns to SAST results, by numeric id
const SAST_STATES: [&str; 5] = [
    "TO_VERIFY",
    "NOT_EXPLOITABLE",
    "CONFIRMED",
    "URGENT",
    "PROPOSED_NOT_EXPLOITABLE",
];

/// State name for a SAST state id; unknown ids are logged and dropped
pub fn sast_state_name(id: u8) -> Option<&'static str> {
    let name = SAST_STATES.get(id as usize).copied();
    if name.is_none() {
        warn!("Unknown SAST state id {}, treating state as absent", id);
    }
    name
}

/// Result ids and fingerprints arrive as numbers or strings
fn lenient_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(Option::<Id>::deserialize(deserializer)?.map(|id| match id {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    }))
}

/// One node of a SAST data-flow path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SastNode {
    pub file_name: String,
    pub line: u32,
    #[serde(default)]
    pub column: Option<u32>,
    /// Element name at this node
    #[serde(default)]
    pub name: Option<String>,
}

/// A static-analysis result as returned by one results page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SastFinding {
    /// Per-occurrence result id
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    /// Structural fingerprint shared by occurrences of the same issue
    #[serde(default, deserialize_with = "lenient_id")]
    pub similarity_id: Option<String>,
    /// Query (vulnerability type) that produced the result
    pub query_name: Option<String>,
    pub severity: Option<String>,
    /// Numeric triage state
    pub state: Option<u8>,
    /// NEW or RECURRENT
    pub status: Option<String>,
    pub cwe_id: Option<u32>,
    pub language: Option<String>,
    pub description: Option<String>,
    /// Data-flow path, source first and sink last
    #[serde(default)]
    pub nodes: Vec<SastNode>,
}

/// A vulnerable dependency as returned by one results page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaFinding {
    /// Vulnerability id, usually a CVE
    pub id: Option<String>,
    pub package_id: Option<String>,
    pub similarity_id: Option<String>,
    pub severity: Option<String>,
    /// Vulnerability category reported by the engine
    pub category: Option<String>,
    pub cwe_id: Option<String>,
    pub status: Option<String>,
    pub description: Option<String>,
    /// Version that fixes the vulnerability
    pub recommended_version: Option<String>,
    /// Marked as ignored by a user on the service side
    #[serde(default)]
    pub ignored: bool,
}

/// Per-engine raw result record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawFinding {
    Sast(SastFinding),
    Sca(ScaFinding),
}

/// Where one occurrence of an issue lives
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LocationKey {
    Source { file: String, line: u32 },
    Package { id: String },
}

impl std::fmt::Display for LocationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocationKey::Source { file, line } => write!(f, "{}:{}", file, line),
            LocationKey::Package { id } => write!(f, "{}", id),
        }
    }
}

impl Serialize for LocationKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Identity fields every finding must carry to be aggregated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindingIdentity {
    /// Deduplication key, unique per issue within one aggregation pass
    pub similarity_key: String,
    pub title: String,
    pub severity: Severity,
    pub location: LocationKey,
}

impl RawFinding {
    pub fn engine(&self) -> Engine {
        match self {
            RawFinding::Sast(_) => Engine::Sast,
            RawFinding::Sca(_) => Engine::Sca,
        }
    }

    pub fn finding_id(&self) -> Option<&str> {
        match self {
            RawFinding::Sast(f) => f.id.as_deref(),
            RawFinding::Sca(f) => f.id.as_deref(),
        }
    }

    /// Ignored SCA findings never reach the issue list
    pub fn is_ignored(&self) -> bool {
        matches!(self, RawFinding::Sca(f) if f.ignored)
    }

    /// Validate required fields and derive the dedup identity
    pub fn identity(&self) -> Result<FindingIdentity> {
        let missing = |field: &str| {
            Error::data_integrity(
                self.finding_id().map(String::from),
                format!("{} finding is missing {}", self.engine(), field),
            )
        };

        match self {
            RawFinding::Sast(f) => {
                let similarity = non_blank(&f.similarity_id).ok_or_else(|| missing("similarityId"))?;
                let title = non_blank(&f.query_name).ok_or_else(|| missing("queryName"))?;
                let source = f.nodes.first().ok_or_else(|| missing("source node"))?;
                Ok(FindingIdentity {
                    similarity_key: format!("sast:{}", similarity),
                    title: title.to_string(),
                    severity: self.parse_severity(f.severity.as_deref(), missing)?,
                    location: LocationKey::Source {
                        file: source.file_name.clone(),
                        line: source.line,
                    },
                })
            }
            RawFinding::Sca(f) => {
                let package = non_blank(&f.package_id).ok_or_else(|| missing("packageId"))?;
                Ok(FindingIdentity {
                    similarity_key: format!("sca:{}", package.to_lowercase()),
                    title: non_blank(&f.id).unwrap_or(package).to_string(),
                    severity: self.parse_severity(f.severity.as_deref(), missing)?,
                    location: LocationKey::Package {
                        id: package.to_string(),
                    },
                })
            }
        }
    }

    fn parse_severity(
        &self,
        raw: Option<&str>,
        missing: impl Fn(&str) -> Error,
    ) -> Result<Severity> {
        let raw = raw.ok_or_else(|| missing("severity"))?;
        raw.parse().map_err(|e: String| {
            Error::data_integrity(self.finding_id().map(String::from), e)
        })
    }

    /// Attributes filters are evaluated against
    pub fn filterable_view(&self) -> FilterableView {
        let mut view = FilterableView::new();
        match self {
            RawFinding::Sast(f) => {
                if let Some(id) = &f.id {
                    view = view.id(id.as_str());
                }
                if let Some(title) = &f.query_name {
                    view = view.category(title);
                }
                if let Some(cwe) = f.cwe_id {
                    view = view.cwe_id(cwe.to_string());
                }
                if let Some(severity) = &f.severity {
                    view = view.severity(severity);
                }
                if let Some(status) = &f.status {
                    view = view.status(status);
                }
                if let Some(name) = f.state.and_then(sast_state_name) {
                    view = view.state(name);
                }
            }
            RawFinding::Sca(f) => {
                if let Some(id) = &f.id {
                    view = view.id(id.as_str());
                }
                if let Some(category) = &f.category {
                    view = view.category(category);
                }
                if let Some(cwe) = &f.cwe_id {
                    view = view.cwe_id(cwe.trim_start_matches("CWE-"));
                }
                if let Some(severity) = &f.severity {
                    view = view.severity(severity);
                }
                if let Some(status) = &f.status {
                    view = view.status(status);
                }
            }
        }
        view
    }

    /// Detail for this single occurrence, without its code snippet
    pub fn detail(&self) -> Detail {
        match self {
            RawFinding::Sast(f) => {
                let state = f.state.and_then(sast_state_name);
                let comment = match (f.nodes.first(), f.nodes.last()) {
                    (Some(source), Some(sink)) => format!(
                        "source: {} ({}:{}), sink: {} ({}:{})",
                        source.name.as_deref().unwrap_or("?"),
                        source.file_name,
                        source.line,
                        sink.name.as_deref().unwrap_or("?"),
                        sink.file_name,
                        sink.line,
                    ),
                    _ => String::new(),
                };
                Detail {
                    finding_id: f.id.clone(),
                    code_snippet: None,
                    comment,
                    is_false_positive: state == Some("NOT_EXPLOITABLE"),
                }
            }
            RawFinding::Sca(f) => Detail {
                finding_id: f.id.clone(),
                code_snippet: None,
                comment: f
                    .recommended_version
                    .as_deref()
                    .map(|v| format!("upgrade to {}", v))
                    .unwrap_or_default(),
                is_false_positive: false,
            },
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Evidence for one occurrence of an issue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Detail {
    /// Raw result id the detail came from
    pub finding_id: Option<String>,
    /// Source line at the occurrence, when it could be resolved
    pub code_snippet: Option<String>,
    pub comment: String,
    pub is_false_positive: bool,
}

/// A de-duplicated issue aggregated from one or more raw findings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalIssue {
    pub similarity_key: String,
    pub engine: Engine,
    /// Query name for SAST, vulnerability id for SCA
    pub vulnerability_type: String,
    pub severity: Severity,
    /// Location of the first occurrence seen
    pub reference: LocationKey,
    pub cwe_id: Option<String>,
    pub language: Option<String>,
    pub description: Option<String>,
    /// Fix recommendation, SCA only
    pub recommendation: Option<String>,
    #[serde(serialize_with = "serialize_details")]
    pub details_by_location: BTreeMap<LocationKey, Vec<Detail>>,
}

impl CanonicalIssue {
    /// Seed an issue from its first occurrence
    pub fn new(identity: FindingIdentity, finding: &RawFinding) -> Self {
        let (cwe_id, language, description, recommendation) = match finding {
            RawFinding::Sast(f) => (
                f.cwe_id.map(|c| c.to_string()),
                f.language.clone(),
                f.description.clone(),
                None,
            ),
            RawFinding::Sca(f) => (
                f.cwe_id.clone(),
                None,
                f.description.clone(),
                f.recommended_version.clone(),
            ),
        };

        Self {
            similarity_key: identity.similarity_key,
            engine: finding.engine(),
            vulnerability_type: identity.title,
            severity: identity.severity,
            reference: identity.location,
            cwe_id,
            language,
            description,
            recommendation,
            details_by_location: BTreeMap::new(),
        }
    }

    pub fn attach(&mut self, location: LocationKey, detail: Detail) {
        self.details_by_location
            .entry(location)
            .or_default()
            .push(detail);
    }

    /// Total number of occurrences merged into this issue
    pub fn detail_count(&self) -> usize {
        self.details_by_location.values().map(Vec::len).sum()
    }

    /// True when every occurrence was triaged as not exploitable
    pub fn all_false_positive(&self) -> bool {
        self.detail_count() > 0
            && self
                .details_by_location
                .values()
                .flatten()
                .all(|d| d.is_false_positive)
    }
}

fn serialize_details<S: Serializer>(
    details: &BTreeMap<LocationKey, Vec<Detail>>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_map(details.iter().map(|(k, v)| (k.to_string(), v)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sast(similarity: &str, line: u32) -> RawFinding {
        RawFinding::Sast(SastFinding {
            id: Some(format!("r-{}", line)),
            similarity_id: Some(similarity.to_string()),
            query_name: Some(String::from("Client_Potential_XSS")),
            severity: Some(String::from("HIGH")),
            state: Some(3),
            status: Some(String::from("New")),
            cwe_id: Some(79),
            language: Some(String::from("JavaScript")),
            description: None,
            nodes: vec![
                SastNode {
                    file_name: String::from("src/app.js"),
                    line,
                    column: Some(4),
                    name: Some(String::from("input")),
                },
                SastNode {
                    file_name: String::from("src/view.js"),
                    line: 99,
                    column: None,
                    name: Some(String::from("innerHTML")),
                },
            ],
        })
    }

    #[test]
    fn test_sast_identity() {
        let identity = sast("sim-1", 10).identity().unwrap();
        assert_eq!(identity.similarity_key, "sast:sim-1");
        assert_eq!(identity.severity, Severity::High);
        assert_eq!(
            identity.location,
            LocationKey::Source {
                file: String::from("src/app.js"),
                line: 10
            }
        );
    }

    #[test]
    fn test_missing_similarity_is_integrity_error() {
        let mut finding = sast("sim-1", 10);
        if let RawFinding::Sast(f) = &mut finding {
            f.similarity_id = None;
        }
        let err = finding.identity().unwrap_err();
        assert!(matches!(err, Error::DataIntegrity { .. }));
        assert!(err.to_string().contains("similarityId"));
    }

    #[test]
    fn test_sca_key_case_insensitive() {
        let a = RawFinding::Sca(ScaFinding {
            package_id: Some(String::from("Npm-Lodash-4.17.15")),
            severity: Some(String::from("Medium")),
            ..Default::default()
        });
        let b = RawFinding::Sca(ScaFinding {
            package_id: Some(String::from("npm-lodash-4.17.15")),
            severity: Some(String::from("Medium")),
            ..Default::default()
        });
        assert_eq!(
            a.identity().unwrap().similarity_key,
            b.identity().unwrap().similarity_key
        );
    }

    #[test]
    fn test_view_maps_state_name() {
        let view = sast("sim-1", 10).filterable_view();
        assert_eq!(view.state.as_deref(), Some("URGENT"));
        assert_eq!(view.category.as_deref(), Some("CLIENT_POTENTIAL_XSS"));
        assert_eq!(view.cwe_id.as_deref(), Some("79"));
        assert_eq!(view.status.as_deref(), Some("NEW"));
    }

    #[test]
    fn test_unknown_state_is_absent() {
        assert_eq!(sast_state_name(1), Some("NOT_EXPLOITABLE"));
        assert_eq!(sast_state_name(42), None);
    }

    #[test]
    fn test_not_exploitable_detail_is_false_positive() {
        let mut finding = sast("sim-1", 10);
        if let RawFinding::Sast(f) = &mut finding {
            f.state = Some(1);
        }
        let detail = finding.detail();
        assert!(detail.is_false_positive);
        assert!(detail.comment.contains("sink: innerHTML"));
    }

    #[test]
    fn test_issue_serializes_locations_as_strings() {
        let finding = sast("sim-1", 10);
        let identity = finding.identity().unwrap();
        let location = identity.location.clone();
        let mut issue = CanonicalIssue::new(identity, &finding);
        issue.attach(location, finding.detail());

        let json = serde_json::to_value(&issue).unwrap();
        assert!(json["details_by_location"]["src/app.js:10"].is_array());
        assert_eq!(json["reference"], "src/app.js:10");
    }

    #[test]
    fn test_numeric_ids_decode_as_strings() {
        let finding: SastFinding = serde_json::from_value(serde_json::json!({
            "id": 1017,
            "similarityId": -1204871,
            "nodes": []
        }))
        .unwrap();
        assert_eq!(finding.id.as_deref(), Some("1017"));
        assert_eq!(finding.similarity_id.as_deref(), Some("-1204871"));
    }
}
