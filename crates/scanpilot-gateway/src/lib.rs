//! ScanPilot Gateway - access to the remote scanning service
//!
//! This crate provides:
//! - `ScanGateway`: the async trait the orchestrator drives
//! - `RestGateway`: its HTTP/JSON implementation
//! - `fetch_all`: the offset-style page walker shared by every listing
//! - navigation tree types and team path matching

pub mod gateway;
pub mod navigation;
pub mod paging;
pub mod rest_client;
mod types;

pub use gateway::{
    CreatedScan, EngineSummary, GatewayError, GatewayResult, Project, ScanDetails, ScanGateway,
    ScanState, ScanSummary, UploadTarget,
};
pub use navigation::{find_team_id, TreeNode};
pub use paging::{fetch_all, Page, DEFAULT_PAGE_SIZE};
pub use rest_client::{RestGateway, RestGatewayConfig, GENERATED_DESCRIPTION};
