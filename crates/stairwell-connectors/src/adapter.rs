//! Connector traits for remote template sources

use serde::{Deserialize, Serialize};
use stairwell_core::{BuildIssue, IssueCode, IssueLocation, Severity, SourceType};

/// Errors that can occur when talking to a template source
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectorError {
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Request to {url} failed with status {status}")]
    Status { status: u16, url: String },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl ConnectorError {
    /// Convert to a build issue for a whole source or a single template
    pub fn to_issue(&self, source_type: SourceType, key: &str) -> BuildIssue {
        let code = match self {
            Self::Timeout(_) => IssueCode::ConnectorTimeout,
            _ => IssueCode::ConnectorError,
        };

        BuildIssue::new(code, Severity::Error, self.to_string())
            .with_location(IssueLocation::new(source_type, key))
    }
}

impl From<reqwest::Error> for ConnectorError {
    fn from(error: reqwest::Error) -> Self {
        let url = error
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown url>".to_string());

        if error.is_timeout() {
            Self::Timeout(url)
        } else if error.is_decode() {
            Self::InvalidResponse(error.to_string())
        } else if let Some(status) = error.status() {
            Self::Status {
                status: status.as_u16(),
                url,
            }
        } else {
            Self::NetworkError(error.to_string())
        }
    }
}

/// Object storage holding template files
pub trait ObjectStore: Send + Sync {
    /// Get the store name (e.g., "GCS")
    fn name(&self) -> &'static str;

    /// Names of all objects under `prefix`, in listing order
    fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, ConnectorError>;

    /// Object content as UTF-8 text
    fn get_object(&self, bucket: &str, name: &str) -> Result<String, ConnectorError>;

    /// Create or overwrite an object
    fn put_object(&self, bucket: &str, name: &str, content: &str) -> Result<(), ConnectorError>;
}

/// A saved query in a BI tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedQuery {
    pub id: u64,
    pub name: String,

    /// Query text, possibly templated
    pub query: String,

    pub data_source_id: u64,
}

/// BI tool holding saved queries
pub trait QueryCatalog: Send + Sync {
    /// Get the catalog name (e.g., "Redash")
    fn name(&self) -> &'static str;

    /// Base URL the query uris are built from
    fn base_url(&self) -> &str;

    /// Saved queries belonging to a data source, by name or id
    fn list_queries(&self, data_source: &str) -> Result<Vec<SavedQuery>, ConnectorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_have_their_own_issue_code() {
        let issue = ConnectorError::Timeout("https://example.com".to_string())
            .to_issue(SourceType::ObjectStorage, "bucket-a");
        assert_eq!(issue.code, IssueCode::ConnectorTimeout);
        assert_eq!(issue.severity, Severity::Error);

        let issue = ConnectorError::NotFound("bucket-a".to_string())
            .to_issue(SourceType::ObjectStorage, "bucket-a");
        assert_eq!(issue.code, IssueCode::ConnectorError);
    }
}
