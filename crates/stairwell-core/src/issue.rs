//! Build issue codes and locations
//!
//! Issue codes are stable identifiers that appear in saved reports.
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};

use crate::source_type::SourceType;

/// Issue code registry (v1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    // Source failures
    /// A template source could not be reached or returned an unusable response
    ConnectorError,

    /// A network call exceeded its timeout
    ConnectorTimeout,

    /// The transformation project failed to compile
    CompileError,

    /// Missing or malformed configuration (including project descriptors)
    ConfigError,

    // Template failures
    /// Substituting parameters into a template failed
    RenderError,

    /// Malformed placeholder syntax
    ParseError,

    /// Rendered SQL could not be parsed
    SqlParseError,

    // Lineage findings
    /// A template references placeholders no mapping binds
    UndefinedTemplate,

    /// General informational message
    Info,
}

impl IssueCode {
    /// Get the issue code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectorError => "CONNECTOR_ERROR",
            Self::ConnectorTimeout => "CONNECTOR_TIMEOUT",
            Self::CompileError => "COMPILE_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::RenderError => "RENDER_ERROR",
            Self::ParseError => "PARSE_ERROR",
            Self::SqlParseError => "SQL_PARSE_ERROR",
            Self::UndefinedTemplate => "UNDEFINED_TEMPLATE",
            Self::Info => "INFO",
        }
    }
}

impl std::fmt::Display for IssueCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Issue severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,

    /// Warning - the build continued without this piece
    Warn,

    /// Error - a whole source was lost
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Where an issue happened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueLocation {
    /// Source type of the failing source or template
    pub source_type: SourceType,

    /// Template key, or a source description when the whole source failed
    pub key: String,

    /// Optional line number (1-indexed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl IssueLocation {
    pub fn new(source_type: SourceType, key: impl Into<String>) -> Self {
        Self {
            source_type,
            key: key.into(),
            line: None,
        }
    }

    pub fn with_line(source_type: SourceType, key: impl Into<String>, line: usize) -> Self {
        Self {
            source_type,
            key: key.into(),
            line: Some(line),
        }
    }
}

impl std::fmt::Display for IssueLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}:{}", self.source_type, self.key, line),
            None => write!(f, "{}:{}", self.source_type, self.key),
        }
    }
}

/// A problem found while building the dependency map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildIssue {
    /// Stable issue code
    pub code: IssueCode,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Source location (best-effort)
    pub location: Option<IssueLocation>,
}

impl BuildIssue {
    /// Create a new issue with minimal fields
    pub fn new(code: IssueCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            location: None,
        }
    }

    /// Set the location
    pub fn with_location(mut self, location: IssueLocation) -> Self {
        self.location = Some(location);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_code_stability() {
        assert_eq!(IssueCode::ConnectorTimeout.as_str(), "CONNECTOR_TIMEOUT");
        assert_eq!(IssueCode::SqlParseError.as_str(), "SQL_PARSE_ERROR");
        assert_eq!(
            serde_json::to_string(&IssueCode::CompileError).unwrap(),
            "\"COMPILE_ERROR\""
        );
    }

    #[test]
    fn issue_serialization() {
        let issue = BuildIssue::new(IssueCode::RenderError, Severity::Warn, "undefined value")
            .with_location(IssueLocation::with_line(SourceType::File, "sql/orders.sql", 3));

        let json = serde_json::to_string(&issue).unwrap();
        assert!(json.contains("RENDER_ERROR"));
        assert!(json.contains("\"warn\""));
        assert!(json.contains("\"file\""));
    }

    #[test]
    fn location_display() {
        let location = IssueLocation::new(SourceType::BiQuery, "daily orders");
        assert_eq!(location.to_string(), "BIQuery:daily orders");
    }
}
