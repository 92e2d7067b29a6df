//! Deduplicating report collection.

use crate::{Report, Severity};
use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

/// Anything that accepts reports one at a time.
///
/// Submission must be idempotent on the dedup key: feeding the same
/// report twice leaves at most one item behind.
pub trait ReportSink {
    /// Returns true iff the report was kept
    fn submit(&mut self, report: Report) -> bool;
}

/// In-memory, deduplicated report sink
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportCollector {
    reports: Vec<Report>,
    seen: HashSet<String>,
    suppress_warnings: bool,
}

impl ReportCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop warning-class reports entirely
    pub fn with_suppressed_warnings(mut self, suppress: bool) -> Self {
        self.suppress_warnings = suppress;
        self
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    pub fn into_reports(self) -> Vec<Report> {
        self.reports
    }

    /// Reports of one severity
    pub fn with_severity(&self, severity: Severity) -> impl Iterator<Item = &Report> {
        self.reports.iter().filter(move |r| r.severity == severity)
    }

    /// Serialize all kept reports
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.reports)
    }
}

impl ReportSink for ReportCollector {
    fn submit(&mut self, report: Report) -> bool {
        if self.suppress_warnings && report.severity == Severity::Warning {
            tracing::debug!(kind = report.kind.code(), "warning suppressed");
            return false;
        }
        let key = report.dedup_key();
        if !self.seen.insert(key) {
            tracing::debug!(kind = report.kind.code(), "duplicate report dropped");
            return false;
        }
        tracing::info!(kind = report.kind.code(), severity = ?report.severity, "bug reported");
        self.reports.push(report);
        true
    }
}
