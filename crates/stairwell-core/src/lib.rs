//! Stairwell Core
//!
//! Shared domain model: source types, the two configuration files and the
//! stable build issue / report types.
//! Never rename issue codes - they are part of the saved report format.

pub mod source_type;
pub mod config;
pub mod mapping;
pub mod issue;
pub mod report;

pub use source_type::SourceType;
pub use config::{
    Config, ConfigError, DialectConfig, ExcludeRule, ExcludeRules, IncludeSource, Settings,
    SourceOptions, FileInclude, ObjectStorageInclude, BiQueryInclude, TransformProjectInclude,
};
pub use mapping::{
    Labels, MappingConfig, MappingEntry, MatchRule, Parameters, TableDeclaration, TableMetadata,
};
pub use issue::{BuildIssue, IssueCode, IssueLocation, Severity};
pub use report::{BuildReport, ReportSummary, ReportVersion};
