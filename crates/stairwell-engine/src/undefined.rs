//! Templates no mapping covers, and the mapping stub generated from them

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use stairwell_core::{MappingConfig, MappingEntry, MatchRule, SourceType, TableDeclaration};
use stairwell_template::insert_path;

use crate::template::TemplateRef;

/// A template whose placeholders could not be resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndefinedTemplate {
    pub template: TemplateRef,

    /// Mapped table the tokens were missing for; none when the template is unmapped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,

    /// Unresolved placeholder tokens
    pub params: Vec<String>,
}

/// Build a mapping stub with one entry per undefined template.
///
/// File templates get a `file_suffix` rule, the rest a `uri` rule. Every
/// token is nested into `parameters` with an empty value to be filled in.
pub fn to_mapping_stub(undefined: &[UndefinedTemplate]) -> MappingConfig {
    let mut grouped: BTreeMap<(SourceType, String), (&UndefinedTemplate, Vec<&str>)> =
        BTreeMap::new();

    for entry in undefined {
        let (_, params) = grouped
            .entry((entry.template.source_type, entry.template.key.clone()))
            .or_insert_with(|| (entry, Vec::new()));
        for param in &entry.params {
            if !params.contains(&param.as_str()) {
                params.push(param);
            }
        }
    }

    let mapping = grouped
        .into_values()
        .map(|(entry, params)| {
            let rule = match entry.template.source_type {
                SourceType::File => MatchRule::file_suffix(entry.template.key.clone()),
                _ => MatchRule::uri(entry.template.uri.clone()),
            };

            let mut table = TableDeclaration::new(
                entry
                    .table_name
                    .clone()
                    .unwrap_or_else(|| table_name_from_key(&entry.template.key)),
            );
            for param in params {
                insert_path(&mut table.parameters, param, Value::String(String::new()));
            }

            MappingEntry {
                source_type: entry.template.source_type,
                rule,
                tables: vec![table],
            }
        })
        .collect();

    MappingConfig {
        mapping,
        ..MappingConfig::default()
    }
}

/// File stem of a template key, `sql/orders.sql` -> `orders`
fn table_name_from_key(key: &str) -> String {
    Path::new(key)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn undefined(source_type: SourceType, key: &str, uri: &str, params: &[&str]) -> UndefinedTemplate {
        UndefinedTemplate {
            template: TemplateRef {
                source_type,
                key: key.to_string(),
                uri: uri.to_string(),
                bucket: None,
                project: None,
                data_source: None,
            },
            table_name: None,
            params: params.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn file_template_gets_suffix_rule() {
        let stub = to_mapping_stub(&[undefined(
            SourceType::File,
            "sql/orders.sql",
            "/repo/sql/orders.sql",
            &["params.customers", "params.run_date"],
        )]);

        assert_eq!(stub.mapping.len(), 1);
        let entry = &stub.mapping[0];
        assert_eq!(entry.rule, MatchRule::file_suffix("sql/orders.sql"));
        assert_eq!(entry.tables[0].table_name, "orders");
        assert_eq!(
            serde_json::to_value(&entry.tables[0].parameters).unwrap(),
            json!({ "params": { "customers": "", "run_date": "" } })
        );
    }

    #[test]
    fn remote_template_gets_uri_rule() {
        let stub = to_mapping_stub(&[undefined(
            SourceType::ObjectStorage,
            "queries/daily.sql",
            "gs://bucket/queries/daily.sql",
            &["source"],
        )]);

        assert_eq!(stub.mapping[0].rule, MatchRule::uri("gs://bucket/queries/daily.sql"));
        assert_eq!(stub.mapping[0].tables[0].table_name, "daily");
    }

    #[test]
    fn same_template_is_merged() {
        let mut second = undefined(SourceType::File, "a.sql", "/a.sql", &["params.y", "params.x"]);
        second.table_name = Some("ignored_for_first".to_string());

        let stub = to_mapping_stub(&[
            undefined(SourceType::File, "a.sql", "/a.sql", &["params.x"]),
            second,
        ]);

        assert_eq!(stub.mapping.len(), 1);
        assert_eq!(stub.mapping[0].tables[0].table_name, "a");
        assert_eq!(
            serde_json::to_value(&stub.mapping[0].tables[0].parameters).unwrap(),
            json!({ "params": { "x": "", "y": "" } })
        );
    }

    #[test]
    fn stub_serializes_to_toml() {
        let stub = to_mapping_stub(&[undefined(SourceType::File, "a.sql", "/a.sql", &["params.x"])]);
        let toml = stub.to_toml().unwrap();
        assert!(toml.contains("file_suffix = \"a.sql\""));

        let reloaded = MappingConfig::from_toml(&toml).unwrap();
        assert_eq!(reloaded, stub);
    }
}
