//! Configuration schema (stairwell.toml)
//!
//! Declares which template sources to scan (`[[include]]`), which templates to
//! skip (`[[exclude]]`) and general `[settings]`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::source_type::SourceType;

/// Default config file name
pub const CONFIG_FILE_NAME: &str = "stairwell.toml";

/// Default mapping file prefix (`mapping.toml`)
pub const MAPPING_PREFIX_DEFAULT: &str = "mapping";

/// Default regex selecting SQL templates
pub const SQL_FILE_REGEX_DEFAULT: &str = r".*\.sql$";

/// Network calls give up after this long unless overridden
pub const NETWORK_TIMEOUT_DEFAULT: Duration = Duration::from_secs(60);

/// The compile subprocess is killed after this long unless overridden
pub const COMPILE_TIMEOUT_DEFAULT: Duration = Duration::from_secs(300);

/// SQL dialect configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectConfig {
    /// BigQuery SQL dialect
    BigQuery,

    /// Snowflake SQL dialect
    Snowflake,

    /// PostgreSQL SQL dialect
    Postgres,

    /// Generic ANSI SQL
    Ansi,
}

impl Default for DialectConfig {
    fn default() -> Self {
        Self::Ansi
    }
}

/// General settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Prefix of the mapping file, resolved next to the config file
    #[serde(default = "default_mapping_prefix")]
    pub mapping_prefix: String,

    /// SQL dialect used when scanning rendered SQL
    #[serde(default)]
    pub dialect: DialectConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mapping_prefix: default_mapping_prefix(),
            dialect: DialectConfig::default(),
        }
    }
}

fn default_mapping_prefix() -> String {
    MAPPING_PREFIX_DEFAULT.to_string()
}

fn default_sql_regex() -> String {
    SQL_FILE_REGEX_DEFAULT.to_string()
}

fn default_compile_executable() -> String {
    "dbt".to_string()
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Options shared by every include entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceOptions {
    /// Abort the whole build if this source fails
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,

    /// Bound for network calls or the compile subprocess, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Completes partially-qualified table names (e.g. `project` or `project.dataset`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_table_prefix: Option<String>,

    /// Also extract table references from the rendered SQL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_sql: Option<bool>,
}

impl SourceOptions {
    /// Configured timeout, or the given default
    pub fn timeout_or(&self, default: Duration) -> Duration {
        self.timeout_secs.map(Duration::from_secs).unwrap_or(default)
    }
}

/// Local directory of SQL templates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInclude {
    /// Root directory walked recursively
    pub path: PathBuf,

    /// Files whose path fully matches this regex are templates
    #[serde(default = "default_sql_regex")]
    pub regex: String,

    #[serde(flatten)]
    pub options: SourceOptions,
}

/// Bucket of SQL templates in cloud object storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectStorageInclude {
    /// Bucket name
    pub bucket: String,

    /// Only objects under this prefix are listed
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prefix: String,

    /// Cloud project owning the bucket
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    /// Objects whose name fully matches this regex are templates
    #[serde(default = "default_sql_regex")]
    pub regex: String,

    /// Storage API endpoint override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Environment variable holding a bearer token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_env: Option<String>,

    #[serde(flatten)]
    pub options: SourceOptions,
}

/// Saved queries of a BI tool (Redash API)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiQueryInclude {
    /// Base URL of the BI tool
    pub base_url: String,

    /// Data source whose queries are scanned
    pub data_source: String,

    /// Environment variable holding the API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(flatten)]
    pub options: SourceOptions,
}

/// dbt project compiled before scanning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformProjectInclude {
    /// Directory containing dbt_project.yml
    pub project_dir: PathBuf,

    /// Directory containing profiles.yml
    pub profiles_dir: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Passed to the compiler as `--vars '<json>'`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: BTreeMap<String, serde_json::Value>,

    /// Compiler executable
    #[serde(default = "default_compile_executable")]
    pub executable: String,

    #[serde(flatten)]
    pub options: SourceOptions,
}

/// One `[[include]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncludeSource {
    File(FileInclude),
    ObjectStorage(ObjectStorageInclude),
    #[serde(rename = "bi_query")]
    BiQuery(BiQueryInclude),
    TransformProject(TransformProjectInclude),
}

impl IncludeSource {
    /// Source type of this entry
    pub fn source_type(&self) -> SourceType {
        match self {
            Self::File(_) => SourceType::File,
            Self::ObjectStorage(_) => SourceType::ObjectStorage,
            Self::BiQuery(_) => SourceType::BiQuery,
            Self::TransformProject(_) => SourceType::TransformProject,
        }
    }

    /// Options shared by all entries
    pub fn options(&self) -> &SourceOptions {
        match self {
            Self::File(include) => &include.options,
            Self::ObjectStorage(include) => &include.options,
            Self::BiQuery(include) => &include.options,
            Self::TransformProject(include) => &include.options,
        }
    }

    /// Whether rendered SQL is scanned for table references.
    ///
    /// Compiled models carry no placeholders, so scanning defaults to on for them.
    pub fn scan_sql(&self) -> bool {
        self.options()
            .scan_sql
            .unwrap_or(matches!(self, Self::TransformProject(_)))
    }
}

/// One `[[exclude]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludeRule {
    #[serde(rename = "type")]
    pub source_type: SourceType,

    /// Searched (not anchored) in the template key
    pub regex: String,
}

/// Exclude rules with compiled regexes, evaluated in configured order
#[derive(Debug, Clone, Default)]
pub struct ExcludeRules {
    rules: Vec<(SourceType, Regex)>,
}

impl ExcludeRules {
    /// Compile the configured rules
    pub fn compile(rules: &[ExcludeRule]) -> Result<Self, ConfigError> {
        let rules = rules
            .iter()
            .map(|rule| {
                Regex::new(&rule.regex)
                    .map(|regex| (rule.source_type, regex))
                    .map_err(|e| ConfigError::InvalidRegex {
                        pattern: rule.regex.clone(),
                        message: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { rules })
    }

    /// True when the first rule for `source_type` whose regex matches `key` exists
    pub fn is_excluded(&self, source_type: SourceType, key: &str) -> bool {
        self.rules
            .iter()
            .any(|(rule_type, regex)| *rule_type == source_type && regex.is_match(key))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Compile a regex that must match the whole input
pub fn full_match_regex(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| ConfigError::InvalidRegex {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub settings: Settings,

    /// Template sources to scan
    #[serde(default)]
    pub include: Vec<IncludeSource>,

    /// Templates to skip
    #[serde(default)]
    pub exclude: Vec<ExcludeRule>,

    /// Directory of the config file (for resolving the mapping file)
    #[serde(skip)]
    pub config_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            include: Vec::new(),
            exclude: Vec::new(),
            config_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::MissingFile(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config = Self::from_toml(&contents)?;

        // Mapping file lives next to the config file
        if let Some(parent) = path.parent() {
            config.config_dir = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        // Surface bad patterns at load time rather than mid-build
        config.exclude_rules()?;
        Ok(config)
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Compiled exclude rules
    pub fn exclude_rules(&self) -> Result<ExcludeRules, ConfigError> {
        ExcludeRules::compile(&self.exclude)
    }

    /// Path of the mapping file
    pub fn mapping_path(&self) -> PathBuf {
        self.config_dir
            .join(format!("{}.toml", self.settings.mapping_prefix))
    }

    /// Skeleton written by `stairwell init`
    pub fn skeleton() -> Self {
        Self {
            include: vec![IncludeSource::File(FileInclude {
                path: PathBuf::from("./sql"),
                regex: default_sql_regex(),
                options: SourceOptions::default(),
            })],
            exclude: vec![ExcludeRule {
                source_type: SourceType::File,
                regex: "^tmp/".to_string(),
            }],
            ..Self::default()
        }
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Config file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("Invalid regex '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [settings]
        dialect = "bigquery"

        [[include]]
        type = "file"
        path = "./sql"
        default_table_prefix = "proj"

        [[include]]
        type = "object_storage"
        bucket = "bucket-a"
        prefix = "queries/"
        required = true
        timeout_secs = 5

        [[include]]
        type = "bi_query"
        base_url = "https://redash.example.com"
        data_source = "warehouse"

        [[include]]
        type = "transform_project"
        project_dir = "./dbt"
        profiles_dir = "./dbt"
        target = "prod"
        vars = { key_a = "value_a" }

        [[exclude]]
        type = "file"
        regex = "^tmp/"
    "#;

    #[test]
    fn parse_sample_config() {
        let config = Config::from_toml(SAMPLE).unwrap();

        assert_eq!(config.settings.dialect, DialectConfig::BigQuery);
        assert_eq!(config.settings.mapping_prefix, MAPPING_PREFIX_DEFAULT);
        assert_eq!(config.include.len(), 4);

        let types: Vec<SourceType> = config.include.iter().map(|i| i.source_type()).collect();
        assert_eq!(types, SourceType::ALL.to_vec());

        match &config.include[0] {
            IncludeSource::File(file) => {
                assert_eq!(file.regex, SQL_FILE_REGEX_DEFAULT);
                assert_eq!(file.options.default_table_prefix.as_deref(), Some("proj"));
            }
            other => panic!("unexpected include: {:?}", other),
        }

        let storage = config.include[1].options();
        assert!(storage.required);
        assert_eq!(storage.timeout_or(NETWORK_TIMEOUT_DEFAULT), Duration::from_secs(5));

        match &config.include[3] {
            IncludeSource::TransformProject(project) => {
                assert_eq!(project.executable, "dbt");
                assert_eq!(project.vars["key_a"], serde_json::json!("value_a"));
            }
            other => panic!("unexpected include: {:?}", other),
        }
    }

    #[test]
    fn scan_sql_defaults_by_source_type() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert!(!config.include[0].scan_sql());
        assert!(config.include[3].scan_sql());
    }

    #[test]
    fn exclude_rules_match_by_type_and_regex() {
        let rules = ExcludeRules::compile(&[ExcludeRule {
            source_type: SourceType::File,
            regex: "^tmp/".to_string(),
        }])
        .unwrap();

        assert!(rules.is_excluded(SourceType::File, "tmp/scratch.sql"));
        assert!(!rules.is_excluded(SourceType::File, "models/a.sql"));
        assert!(!rules.is_excluded(SourceType::ObjectStorage, "tmp/scratch.sql"));
    }

    #[test]
    fn empty_exclude_rules_never_match() {
        let rules = ExcludeRules::default();
        assert!(rules.is_empty());
        assert!(!rules.is_excluded(SourceType::File, "anything.sql"));
    }

    #[test]
    fn invalid_exclude_regex_is_config_error() {
        let result = Config::from_toml(
            r#"
            [[exclude]]
            type = "file"
            regex = "("
            "#,
        );
        assert!(matches!(result, Err(ConfigError::InvalidRegex { .. })));
    }

    #[test]
    fn full_match_is_anchored() {
        let regex = full_match_regex(SQL_FILE_REGEX_DEFAULT).unwrap();
        assert!(regex.is_match("sql/a.sql"));
        assert!(!regex.is_match("sql/a.sql.bak"));
    }

    #[test]
    fn skeleton_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        Config::skeleton().save_to_file(&path).unwrap();
        let loaded = Config::from_file(&path).unwrap();

        assert_eq!(loaded.include, Config::skeleton().include);
        assert_eq!(loaded.exclude, Config::skeleton().exclude);
        assert_eq!(loaded.mapping_path(), dir.path().join("mapping.toml"));
    }

    #[test]
    fn missing_config_file() {
        let result = Config::from_file(Path::new("does/not/exist.toml"));
        assert!(matches!(result, Err(ConfigError::MissingFile(_))));
    }
}
