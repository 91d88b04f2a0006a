//! Mapping configuration schema (mapping.toml)
//!
//! Binds template locations to the logical tables they define and to the
//! parameter values that name their upstream tables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::ConfigError;
use crate::source_type::SourceType;

/// Nested parameter values, e.g. `{ params = { customers = "customers" } }`
pub type Parameters = BTreeMap<String, serde_json::Value>;

/// Table labels
pub type Labels = BTreeMap<String, String>;

/// `[global]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalSection {
    /// Defaults merged under every table's parameters
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: Parameters,
}

/// How a mapping entry selects templates.
///
/// An entry may set both rules; a template matches when either one does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRule {
    /// Template key ends with this suffix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_suffix: Option<String>,

    /// Template uri equals this uri
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

impl MatchRule {
    pub fn file_suffix(suffix: impl Into<String>) -> Self {
        Self { file_suffix: Some(suffix.into()), uri: None }
    }

    pub fn uri(uri: impl Into<String>) -> Self {
        Self { file_suffix: None, uri: Some(uri.into()) }
    }

    pub fn is_empty(&self) -> bool {
        self.file_suffix.is_none() && self.uri.is_none()
    }

    pub fn matches(&self, key: &str, uri: &str) -> bool {
        let suffix_hit = self
            .file_suffix
            .as_deref()
            .is_some_and(|suffix| key.ends_with(suffix));
        let uri_hit = self.uri.as_deref() == Some(uri);

        suffix_hit || uri_hit
    }
}

/// A logical table defined by a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDeclaration {
    pub table_name: String,

    /// Placeholder names excluded from lineage and left unrendered
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore_parameters: Vec<String>,

    /// Placeholder bindings; string leaves name upstream tables
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: Parameters,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: Labels,
}

impl TableDeclaration {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ignore_parameters: Vec::new(),
            parameters: Parameters::new(),
            labels: Labels::new(),
        }
    }

    pub fn is_ignored(&self, token: &str) -> bool {
        self.ignore_parameters.iter().any(|p| p == token)
    }
}

/// One `[[mapping]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    #[serde(rename = "type")]
    pub source_type: SourceType,

    #[serde(flatten)]
    pub rule: MatchRule,

    #[serde(default)]
    pub tables: Vec<TableDeclaration>,
}

/// One `[[metadata]]` entry, labels for tables seen only as upstreams
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub table_name: String,

    #[serde(default)]
    pub labels: Labels,
}

/// Mapping configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingConfig {
    #[serde(default)]
    pub global: GlobalSection,

    /// Evaluated in order
    #[serde(default)]
    pub mapping: Vec<MappingEntry>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<TableMetadata>,
}

impl MappingConfig {
    /// Load mapping from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::MissingFile(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml(&contents)
    }

    /// Load mapping from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let mapping: Self =
            toml::from_str(toml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        mapping.validate()?;
        Ok(mapping)
    }

    /// Every entry needs `file_suffix` or `uri`
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (index, entry) in self.mapping.iter().enumerate() {
            if entry.rule.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "mapping entry {} ({}) needs file_suffix or uri",
                    index + 1,
                    entry.source_type
                )));
            }
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Save mapping to TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let toml = self.to_toml()?;
        std::fs::write(path, toml).map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// No mapping entries are configured
    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// Labels attached to `table_name` by the `[[metadata]]` section
    pub fn metadata_labels(&self, table_name: &str) -> Labels {
        self.metadata
            .iter()
            .filter(|m| m.table_name == table_name)
            .flat_map(|m| m.labels.iter().map(|(k, v)| (k.clone(), v.clone())))
            .collect()
    }

    /// Tables whose labels contain every `key:value` target.
    ///
    /// Both declared tables and metadata entries are searched. Result is
    /// sorted and deduplicated.
    pub fn tables_by_labels(&self, targets: &[String]) -> Result<Vec<String>, ConfigError> {
        let targets = targets
            .iter()
            .map(|target| parse_label_target(target))
            .collect::<Result<Vec<_>, _>>()?;

        let declared = self
            .mapping
            .iter()
            .flat_map(|entry| entry.tables.iter())
            .map(|table| (&table.table_name, &table.labels));
        let described = self.metadata.iter().map(|m| (&m.table_name, &m.labels));

        let mut tables: Vec<String> = declared
            .chain(described)
            .filter(|(_, labels)| {
                targets
                    .iter()
                    .all(|(key, value)| labels.get(*key).map(String::as_str) == Some(*value))
            })
            .map(|(name, _)| name.clone())
            .collect();

        tables.sort();
        tables.dedup();
        Ok(tables)
    }
}

/// Split `key:value`
pub fn parse_label_target(target: &str) -> Result<(&str, &str), ConfigError> {
    match target.split_once(':') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => Err(ConfigError::Invalid(format!(
            "label target '{}' must be written as key:value",
            target
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const SAMPLE: &str = r#"
        [global.parameters.params]
        run_date = "2024-01-01"

        [[mapping]]
        type = "file"
        file_suffix = "orders.sql"

        [[mapping.tables]]
        table_name = "orders"
        ignore_parameters = ["params.run_date"]
        parameters = { params = { customers = "customers" } }
        labels = { team = "sales", tier = "gold" }

        [[mapping]]
        type = "object_storage"
        uri = "gs://bucket-a/queries/items.sql"

        [[mapping.tables]]
        table_name = "items"
        labels = { team = "sales" }

        [[metadata]]
        table_name = "customers"
        labels = { source = "crm", team = "sales" }
    "#;

    #[test]
    fn parse_sample_mapping() {
        let mapping = MappingConfig::from_toml(SAMPLE).unwrap();

        assert_eq!(
            mapping.global.parameters["params"],
            json!({ "run_date": "2024-01-01" })
        );
        assert_eq!(mapping.mapping.len(), 2);

        let orders = &mapping.mapping[0];
        assert_eq!(orders.source_type, SourceType::File);
        assert_eq!(orders.rule, MatchRule::file_suffix("orders.sql"));
        assert!(orders.tables[0].is_ignored("params.run_date"));
        assert_eq!(orders.tables[0].parameters["params"], json!({ "customers": "customers" }));

        assert_eq!(
            mapping.mapping[1].rule,
            MatchRule::uri("gs://bucket-a/queries/items.sql")
        );
    }

    #[test]
    fn entry_without_rule_is_rejected() {
        let result = MappingConfig::from_toml(
            r#"
            [[mapping]]
            type = "file"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn entry_with_both_rules_keeps_both() {
        let mapping = MappingConfig::from_toml(
            r#"
            [[mapping]]
            type = "bi_query"
            file_suffix = "never_matches.sql"
            uri = "https://bi.example.com/queries/4"

            [[mapping.tables]]
            table_name = "daily"
            "#,
        )
        .unwrap();

        let rule = &mapping.mapping[0].rule;
        assert_eq!(rule.file_suffix.as_deref(), Some("never_matches.sql"));
        assert_eq!(rule.uri.as_deref(), Some("https://bi.example.com/queries/4"));
        assert!(rule.matches("daily", "https://bi.example.com/queries/4"));
        assert!(rule.matches("x/never_matches.sql", "https://bi.example.com/queries/9"));
        assert!(!rule.matches("daily", "https://bi.example.com/queries/9"));

        let reloaded = MappingConfig::from_toml(&mapping.to_toml().unwrap()).unwrap();
        assert_eq!(reloaded, mapping);
    }

    #[test]
    fn match_rules() {
        let suffix = MatchRule::file_suffix("orders.sql");
        assert!(suffix.matches("sql/orders.sql", "/abs/sql/orders.sql"));
        assert!(!suffix.matches("sql/orders.sql.bak", "/abs/sql/orders.sql.bak"));

        let uri = MatchRule::uri("gs://b/k.sql");
        assert!(uri.matches("k.sql", "gs://b/k.sql"));
        assert!(!uri.matches("k.sql", "gs://other/k.sql"));
    }

    #[test]
    fn metadata_labels_for_upstream() {
        let mapping = MappingConfig::from_toml(SAMPLE).unwrap();
        let labels = mapping.metadata_labels("customers");
        assert_eq!(labels.get("source").map(String::as_str), Some("crm"));
        assert!(mapping.metadata_labels("orders").is_empty());
    }

    #[test]
    fn tables_by_labels_requires_every_target() {
        let mapping = MappingConfig::from_toml(SAMPLE).unwrap();

        let sales = mapping.tables_by_labels(&["team:sales".to_string()]).unwrap();
        assert_eq!(sales, vec!["customers", "items", "orders"]);

        let gold = mapping
            .tables_by_labels(&["team:sales".to_string(), "tier:gold".to_string()])
            .unwrap();
        assert_eq!(gold, vec!["orders"]);

        assert!(mapping.tables_by_labels(&["nolabel".to_string()]).is_err());
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.toml");

        let mapping = MappingConfig::from_toml(SAMPLE).unwrap();
        mapping.save_to_file(&path).unwrap();

        assert_eq!(MappingConfig::from_file(&path).unwrap(), mapping);
    }
}
