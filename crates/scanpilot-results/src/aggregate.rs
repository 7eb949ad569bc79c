//! Result aggregation
//!
//! Raw findings from every engine are filtered by their own engine's
//! filters, keyed by similarity and
//! folded into canonical issues. Each distinct key counts once in the
//! severity histogram, at the severity of its first occurrence.

use std::collections::HashMap;
use std::time::Instant;

use scanpilot_core::{
    CanonicalIssue, LocationKey, RawFinding, Result, SeverityHistogram,
};
use scanpilot_filter::FilterSet;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::snippet::{SnippetCache, SourceFetcher};

/// Aggregation statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregationStats {
    /// Raw records seen
    pub records_processed: u32,
    /// Records folded into an issue that already existed
    pub records_merged: u32,
    /// Records marked ignored upstream
    pub records_ignored: u32,
    /// Records rejected by the filter
    pub records_filtered: u32,
    pub unique_issues: u32,
    /// Source files fetched for snippets
    pub snippet_fetches: u32,
    /// Aggregation duration in milliseconds
    pub duration_ms: u64,
}

/// Output of one aggregation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregatedResults {
    /// Issues in first-seen order
    pub issues: Vec<CanonicalIssue>,
    pub histogram: SeverityHistogram,
    pub stats: AggregationStats,
}

/// Folds raw findings into canonical issues for one scan
pub struct ResultAggregator<'a, F> {
    scan_id: String,
    filters: &'a FilterSet,
    snippets: SnippetCache<F>,
    issues: Vec<CanonicalIssue>,
    index: HashMap<String, usize>,
    histogram: SeverityHistogram,
    stats: AggregationStats,
    started: Instant,
}

impl<'a, F: SourceFetcher> ResultAggregator<'a, F> {
    pub fn new(scan_id: impl Into<String>, filters: &'a FilterSet, fetcher: F) -> Self {
        Self {
            scan_id: scan_id.into(),
            filters,
            snippets: SnippetCache::new(fetcher),
            issues: Vec::new(),
            index: HashMap::new(),
            histogram: SeverityHistogram::new(),
            stats: AggregationStats::default(),
            started: Instant::now(),
        }
    }

    /// Fold one raw finding in.
    ///
    /// A finding missing its identity fields aborts the pass, as does a
    /// filter script that fails at runtime.
    pub async fn add(&mut self, finding: RawFinding) -> Result<()> {
        self.stats.records_processed += 1;

        if finding.is_ignored() {
            debug!("Skipping ignored finding {:?}", finding.finding_id());
            self.stats.records_ignored += 1;
            return Ok(());
        }

        let identity = finding
            .identity()
            .map_err(|e| e.with_scan_id(&self.scan_id))?;

        let view = finding.filterable_view();
        if !self
            .filters
            .passes(finding.engine(), &view)
            .map_err(|e| e.with_scan_id(&self.scan_id))?
        {
            self.stats.records_filtered += 1;
            return Ok(());
        }

        let mut detail = finding.detail();
        if let LocationKey::Source { file, line } = &identity.location {
            detail.code_snippet = match self.snippets.get_line(file, *line).await {
                Ok(snippet) => snippet,
                Err(e) => {
                    warn!("No snippet for {}: {}", identity.location, e);
                    None
                }
            };
        }

        let location = identity.location.clone();
        match self.index.get(&identity.similarity_key) {
            Some(&position) => {
                self.stats.records_merged += 1;
                self.issues[position].attach(location, detail);
            }
            None => {
                self.histogram.increment(identity.severity);
                self.index
                    .insert(identity.similarity_key.clone(), self.issues.len());
                let mut issue = CanonicalIssue::new(identity, &finding);
                issue.attach(location, detail);
                self.issues.push(issue);
            }
        }

        Ok(())
    }

    pub async fn add_all<I>(&mut self, findings: I) -> Result<()>
    where
        I: IntoIterator<Item = RawFinding>,
    {
        for finding in findings {
            self.add(finding).await?;
        }
        Ok(())
    }

    /// Issues aggregated so far
    pub fn issue_count(&self) -> usize {
        self.issues.len()
    }

    pub fn finish(self) -> AggregatedResults {
        let mut stats = self.stats;
        stats.unique_issues = self.issues.len() as u32;
        stats.snippet_fetches = self.snippets.fetches();
        stats.duration_ms = self.started.elapsed().as_millis() as u64;

        info!(
            "Aggregated scan {}: {} records, {} issues ({} merged, {} ignored, {} filtered)",
            self.scan_id,
            stats.records_processed,
            stats.unique_issues,
            stats.records_merged,
            stats.records_ignored,
            stats.records_filtered
        );

        AggregatedResults {
            issues: self.issues,
            histogram: self.histogram,
            stats,
        }
    }
}

/// Aggregate a complete set of raw findings in one call
pub async fn aggregate<F, I>(
    scan_id: &str,
    findings: I,
    filters: &FilterSet,
    fetcher: F,
) -> Result<AggregatedResults>
where
    F: SourceFetcher,
    I: IntoIterator<Item = RawFinding>,
{
    let mut aggregator = ResultAggregator::new(scan_id, filters, fetcher);
    aggregator.add_all(findings).await?;
    Ok(aggregator.finish())
}
