//! Template errors

use stairwell_core::{BuildIssue, IssueCode, IssueLocation, Severity, SourceType};

/// Error while scanning or rendering a template
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("Unterminated placeholder block starting at line {line}")]
    UnterminatedBlock { line: usize },

    #[error("Render error: {message}")]
    Render {
        message: String,
        line: Option<usize>,
    },
}

impl TemplateError {
    /// Line the error points at, if known
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::UnterminatedBlock { line } => Some(*line),
            Self::Render { line, .. } => *line,
        }
    }

    /// Convert to a build issue for the given template
    pub fn to_issue(&self, source_type: SourceType, key: &str) -> BuildIssue {
        let code = match self {
            Self::UnterminatedBlock { .. } => IssueCode::ParseError,
            Self::Render { .. } => IssueCode::RenderError,
        };

        let location = match self.line() {
            Some(line) => IssueLocation::with_line(source_type, key, line),
            None => IssueLocation::new(source_type, key),
        };

        BuildIssue::new(code, Severity::Warn, self.to_string()).with_location(location)
    }
}

impl From<minijinja::Error> for TemplateError {
    fn from(error: minijinja::Error) -> Self {
        Self::Render {
            line: error.line(),
            message: error.to_string(),
        }
    }
}
