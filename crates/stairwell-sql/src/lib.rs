//! SQL parsing and table reference extraction
//!
//! This crate handles:
//! - Parsing rendered SQL using sqlparser, in the configured dialect
//! - Collecting the tables a statement reads from (CTEs excluded)

pub mod parser;
pub mod references;

pub use parser::{SqlParser, ParsedSql, SqlParseError};
pub use references::{object_name_to_string, TableReferenceCollector};

/// Parse `sql` and return the tables it reads from
pub fn extract_table_references(
    parser: &SqlParser,
    sql: &str,
) -> Result<Vec<String>, SqlParseError> {
    let parsed = parser.parse(sql)?;
    Ok(TableReferenceCollector::collect(&parsed.statements))
}
