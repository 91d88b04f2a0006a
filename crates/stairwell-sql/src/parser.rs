//! SQL parsing using sqlparser
//!
//! Parses rendered template SQL into an AST.

use sqlparser::ast::Statement;
use sqlparser::dialect::{Dialect, GenericDialect, BigQueryDialect, PostgreSqlDialect, SnowflakeDialect};
use sqlparser::parser::{Parser, ParserError};
use stairwell_core::{BuildIssue, DialectConfig, IssueCode, IssueLocation, Severity, SourceType};

/// SQL parser with configurable dialect
pub struct SqlParser {
    dialect: Box<dyn Dialect>,
}

impl SqlParser {
    /// Create a new SQL parser with the default (generic) dialect
    pub fn new() -> Self {
        Self {
            dialect: Box::new(GenericDialect {}),
        }
    }

    /// Create a SQL parser for BigQuery
    pub fn bigquery() -> Self {
        Self {
            dialect: Box::new(BigQueryDialect {}),
        }
    }

    /// Create a SQL parser for PostgreSQL
    pub fn postgres() -> Self {
        Self {
            dialect: Box::new(PostgreSqlDialect {}),
        }
    }

    /// Create a SQL parser for Snowflake
    pub fn snowflake() -> Self {
        Self {
            dialect: Box::new(SnowflakeDialect {}),
        }
    }

    /// Create a parser from a dialect config
    pub fn from_dialect(dialect: &DialectConfig) -> Self {
        match dialect {
            DialectConfig::BigQuery => Self::bigquery(),
            DialectConfig::Snowflake => Self::snowflake(),
            DialectConfig::Postgres => Self::postgres(),
            DialectConfig::Ansi => Self::new(),
        }
    }

    /// Parse SQL string into AST
    pub fn parse(&self, sql: &str) -> Result<ParsedSql, SqlParseError> {
        let statements = Parser::parse_sql(&*self.dialect, sql)
            .map_err(|error| SqlParseError { error })?;

        Ok(ParsedSql {
            sql: sql.to_string(),
            statements,
        })
    }
}

impl Default for SqlParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Successfully parsed SQL with AST
#[derive(Debug, Clone)]
pub struct ParsedSql {
    /// Original SQL string
    pub sql: String,

    /// Parsed statements
    pub statements: Vec<Statement>,
}

/// SQL parsing error
#[derive(Debug, thiserror::Error)]
#[error("SQL parse error: {error}")]
pub struct SqlParseError {
    /// Parser error from sqlparser
    pub error: ParserError,
}

impl SqlParseError {
    /// Convert to a build issue for the given template
    pub fn to_issue(&self, source_type: SourceType, key: &str) -> BuildIssue {
        BuildIssue::new(
            IssueCode::SqlParseError,
            Severity::Warn,
            format!("Failed to parse SQL: {}", self.error),
        )
        .with_location(IssueLocation::new(source_type, key))
    }
}
