//! Template source types
//!
//! The set of source types is closed. Every place whose behavior depends on
//! where a template came from matches on this enum exhaustively.

use serde::{Deserialize, Serialize};

/// Where a SQL template was discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Plain files on the local filesystem
    File,

    /// Objects in a cloud storage bucket
    ObjectStorage,

    /// Saved queries of a BI tool
    #[serde(rename = "bi_query")]
    BiQuery,

    /// Compiled models of a transformation (dbt) project
    TransformProject,
}

impl SourceType {
    /// All source types, in declaration order
    pub const ALL: [SourceType; 4] = [
        SourceType::File,
        SourceType::ObjectStorage,
        SourceType::BiQuery,
        SourceType::TransformProject,
    ];

    /// Stable identifier used in configuration files
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::ObjectStorage => "object_storage",
            Self::BiQuery => "bi_query",
            Self::TransformProject => "transform_project",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "File"),
            Self::ObjectStorage => write!(f, "ObjectStorage"),
            Self::BiQuery => write!(f, "BIQuery"),
            Self::TransformProject => write!(f, "TransformProject"),
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s) || t.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown source type '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_spelling_is_stable() {
        assert_eq!(SourceType::BiQuery.as_str(), "bi_query");
        assert_eq!(
            serde_json::to_string(&SourceType::TransformProject).unwrap(),
            "\"transform_project\""
        );
        let parsed: SourceType = serde_json::from_str("\"bi_query\"").unwrap();
        assert_eq!(parsed, SourceType::BiQuery);
    }

    #[test]
    fn parse_accepts_display_and_config_names() {
        assert_eq!("File".parse::<SourceType>().unwrap(), SourceType::File);
        assert_eq!("object_storage".parse::<SourceType>().unwrap(), SourceType::ObjectStorage);
        assert_eq!("BIQuery".parse::<SourceType>().unwrap(), SourceType::BiQuery);
        assert!("s3".parse::<SourceType>().is_err());
    }
}
