//! Build report schema (stable v1)
//!
//! Breaking changes require a new version.

use serde::{Deserialize, Serialize};
use crate::issue::{BuildIssue, Severity};

/// Report schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    /// Major version (breaking changes)
    pub major: u32,

    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl ReportVersion {
    /// Current report schema version
    pub const CURRENT: ReportVersion = ReportVersion { major: 1, minor: 0 };
}

impl std::fmt::Display for ReportVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Summary statistics for a build
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Total number of issues
    pub total: usize,

    pub errors: usize,

    pub warnings: usize,

    pub info: usize,

    /// Number of sources enumerated (failed ones included)
    pub sources_scanned: usize,

    /// Number of templates read after exclusion
    pub templates_scanned: usize,

    /// Number of (downstream, upstream) edges recorded
    pub edges: usize,
}

/// Build report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    /// Schema version
    pub version: ReportVersion,

    /// Timestamp (RFC 3339)
    pub timestamp: String,

    /// Summary statistics
    pub summary: ReportSummary,

    /// All issues, in the order they were found
    pub issues: Vec<BuildIssue>,
}

impl BuildReport {
    /// Create a new empty report
    pub fn new() -> Self {
        Self {
            version: ReportVersion::CURRENT,
            timestamp: chrono::Utc::now().to_rfc3339(),
            summary: ReportSummary::default(),
            issues: Vec::new(),
        }
    }

    /// Create a report from issues
    pub fn from_issues(issues: Vec<BuildIssue>) -> Self {
        let mut report = Self::new();
        for issue in issues {
            report.add_issue(issue);
        }
        report
    }

    /// Add an issue to the report
    pub fn add_issue(&mut self, issue: BuildIssue) {
        match issue.severity {
            Severity::Error => self.summary.errors += 1,
            Severity::Warn => self.summary.warnings += 1,
            Severity::Info => self.summary.info += 1,
        }

        self.summary.total += 1;
        self.issues.push(issue);
    }

    /// Check if the report has any errors
    pub fn has_errors(&self) -> bool {
        self.summary.errors > 0
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Save to file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let json = self.to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }
}

impl Default for BuildReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::{BuildIssue, IssueCode, Severity};

    #[test]
    fn empty_report() {
        let report = BuildReport::new();
        assert_eq!(report.version, ReportVersion::CURRENT);
        assert_eq!(report.summary.total, 0);
        assert!(!report.has_errors());
    }

    #[test]
    fn report_with_issues() {
        let issues = vec![
            BuildIssue::new(IssueCode::ConnectorError, Severity::Error, "bucket unreachable"),
            BuildIssue::new(IssueCode::RenderError, Severity::Warn, "undefined value"),
            BuildIssue::new(IssueCode::Info, Severity::Info, "All good"),
        ];

        let report = BuildReport::from_issues(issues);
        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.errors, 1);
        assert_eq!(report.summary.warnings, 1);
        assert_eq!(report.summary.info, 1);
        assert!(report.has_errors());
    }

    #[test]
    fn report_serialization() {
        let report = BuildReport::new();
        let json = report.to_json().unwrap();
        assert!(json.contains("\"version\""));
        assert!(json.contains("\"issues\""));
        assert!(json.contains("\"templates_scanned\""));
    }
}
