//! Unified engine error

use stairwell_connectors::ConnectorError;
use stairwell_core::{BuildIssue, ConfigError, IssueCode, IssueLocation, Severity, SourceType};
use stairwell_dbt::{CompileError, ProjectError};
use stairwell_sql::SqlParseError;
use stairwell_template::TemplateError;

/// Any failure while building or persisting a dependency map
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Sql(#[from] SqlParseError),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Convert to a build issue located at a source or template
    pub fn to_issue(&self, source_type: SourceType, key: &str) -> BuildIssue {
        match self {
            Self::Connector(e) => e.to_issue(source_type, key),
            Self::Template(e) => e.to_issue(source_type, key),
            Self::Sql(e) => e.to_issue(source_type, key),
            _ => {
                let code = match self {
                    Self::Compile(_) => IssueCode::CompileError,
                    Self::Config(_) | Self::Project(_) => IssueCode::ConfigError,
                    _ => IssueCode::ConnectorError,
                };
                BuildIssue::new(code, Severity::Error, self.to_string())
                    .with_location(IssueLocation::new(source_type, key))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_codes_by_failure_kind() {
        let compile = Error::from(CompileError::Timeout { seconds: 300.0 });
        assert_eq!(compile.to_issue(SourceType::TransformProject, "dbt").code, IssueCode::CompileError);

        let project = Error::from(ProjectError::MissingDescriptor("dbt/dbt_project.yml".into()));
        assert_eq!(project.to_issue(SourceType::TransformProject, "dbt").code, IssueCode::ConfigError);

        let render = Error::from(TemplateError::Render { message: "undefined".to_string(), line: Some(2) });
        let issue = render.to_issue(SourceType::File, "sql/a.sql");
        assert_eq!(issue.code, IssueCode::RenderError);
        assert_eq!(issue.location.and_then(|l| l.line), Some(2));
    }
}
