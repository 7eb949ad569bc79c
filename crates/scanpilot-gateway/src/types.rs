//! Wire shapes of the scanning service REST API
//!
//! These mirror the JSON the service sends and are converted into the
//! gateway types before leaving the crate.

use std::collections::BTreeMap;

use scanpilot_core::{SastFinding, ScaFinding, ScanStatus};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::gateway::{EngineSummary, GatewayError, ScanDetails, UploadTarget};
use crate::navigation::TreeNode;

/// Ids arrive as numbers from some endpoints and strings from others
pub(crate) fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

pub(crate) fn parse_status(raw: &str) -> Result<ScanStatus, GatewayError> {
    raw.parse().map_err(GatewayError::Decode)
}

/// Most management endpoints wrap their payload in `data`
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub data: T,
}

// ── Requests ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateProjectBody<'a> {
    pub business_application_id: &'a str,
    pub name: &'a str,
    pub description: &'a str,
    pub type_ids: Vec<&'a str>,
    pub criticality: u8,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateProjectRequest<'a> {
    pub project: CreateProjectBody<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateApplicationBody<'a> {
    pub ba_name: &'a str,
    pub description: &'a str,
    pub criticality: u8,
    pub ba_bu_id: &'a str,
    pub license_type: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateApplicationRequest<'a> {
    pub business_application: CreateApplicationBody<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateScanRequest<'a> {
    pub project_id: &'a str,
    pub engine_types: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TriggerScanRequest<'a> {
    pub engine_types: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<&'a str>,
}

// ── Responses ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedId {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProjectList {
    pub total_count: u64,
    #[serde(default)]
    pub projects: Vec<WireProject>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireProject {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateScanResponse {
    pub scan: CreatedId,
    pub storage: Storage,
}

/// Pre-signed POST policy for the object store
#[derive(Debug, Deserialize)]
pub(crate) struct Storage {
    pub url: String,
    pub fields: StorageFields,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StorageFields {
    pub key: Option<String>,
    pub bucket: Option<String>,
    #[serde(rename = "X-Amz-Algorithm")]
    pub algorithm: Option<String>,
    #[serde(rename = "X-Amz-Credential")]
    pub credential: Option<String>,
    #[serde(rename = "X-Amz-Date")]
    pub date: Option<String>,
    #[serde(rename = "X-Amz-Security-Token")]
    pub security_token: Option<String>,
    #[serde(rename = "Policy")]
    pub policy: Option<String>,
    #[serde(rename = "X-Amz-Signature")]
    pub signature: Option<String>,
    /// Anything else the service signs goes after the known fields
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl From<Storage> for UploadTarget {
    fn from(storage: Storage) -> Self {
        let f = storage.fields;
        let known = [
            ("key", f.key),
            ("bucket", f.bucket),
            ("X-Amz-Algorithm", f.algorithm),
            ("X-Amz-Credential", f.credential),
            ("X-Amz-Date", f.date),
            ("X-Amz-Security-Token", f.security_token),
            ("Policy", f.policy),
            ("X-Amz-Signature", f.signature),
        ];

        let mut fields: Vec<(String, String)> = known
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name.to_string(), v)))
            .collect();

        for (name, value) in f.extra {
            if let Value::String(v) = value {
                fields.push((name, v));
            }
        }

        UploadTarget {
            url: storage.url,
            fields,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusResponse {
    pub status: String,
    pub progress: Option<u8>,
}

/// Scan record; unlike the listing endpoints it uses snake_case names
#[derive(Debug, Deserialize)]
pub(crate) struct WireScan {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(deserialize_with = "id_string")]
    pub project_id: String,
    #[serde(deserialize_with = "id_string")]
    pub application_id: String,
    #[serde(deserialize_with = "id_string")]
    pub business_unit_id: String,
    pub status: String,
    /// Per-engine severity counts keyed by engine name
    #[serde(default)]
    pub engines: BTreeMap<String, WireEngineCounts>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct WireEngineCounts {
    pub high_severities_count: u32,
    pub medium_severities_count: u32,
    pub low_severities_count: u32,
}

impl TryFrom<WireScan> for ScanDetails {
    type Error = GatewayError;

    fn try_from(scan: WireScan) -> Result<Self, Self::Error> {
        let engines = scan
            .engines
            .into_iter()
            .map(|(engine, counts)| EngineSummary {
                engine,
                high: counts.high_severities_count,
                medium: counts.medium_severities_count,
                low: counts.low_severities_count,
            })
            .collect();

        Ok(ScanDetails {
            status: parse_status(&scan.status)?,
            scan_id: scan.id,
            project_id: scan.project_id,
            application_id: scan.application_id,
            business_unit_id: scan.business_unit_id,
            engines,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResultList<T> {
    pub total_count: u64,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

pub(crate) type SastResultList = ResultList<SastFinding>;
pub(crate) type ScaResultList = ResultList<ScaFinding>;

#[derive(Debug, Deserialize)]
pub(crate) struct SourceFile {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NavigationTree {
    #[serde(default)]
    pub tree: Vec<TreeNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScanList {
    pub total_count: u64,
    #[serde(default)]
    pub scans: Vec<WireScanSummary>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireScanSummary {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub status: String,
}
