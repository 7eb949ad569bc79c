//! ScanPilot Results - turning raw result pages into canonical issues
//!
//! This crate provides:
//! - `ResultAggregator`: similarity-keyed deduplication with detail merging
//!   and a first-seen severity histogram
//! - `SnippetCache`: per-pass memoisation of scanned source files

pub mod aggregate;
pub mod snippet;

pub use aggregate::{aggregate, AggregatedResults, AggregationStats, ResultAggregator};
pub use snippet::{SnippetCache, SourceFetcher};
