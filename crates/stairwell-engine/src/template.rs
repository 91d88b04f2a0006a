//! Discovered SQL templates

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use stairwell_connectors::{ConnectorError, ObjectStore, GCS_URI_PREFIX};
use stairwell_core::{MappingConfig, Parameters, SourceType, TableDeclaration};
use stairwell_template::{get_parameter_tokens, TemplateRenderer};

use crate::error::Error;
use crate::resolver::MappingResolver;

fn renderer() -> &'static TemplateRenderer {
    static RENDERER: OnceLock<TemplateRenderer> = OnceLock::new();
    RENDERER.get_or_init(TemplateRenderer::new)
}

/// Where a template's text lives
#[derive(Clone)]
pub enum TemplateOrigin {
    /// Local file
    File { path: PathBuf },

    /// Object in a bucket, fetched on demand
    Object { store: Arc<dyn ObjectStore> },

    /// Saved BI query, text delivered with the listing
    Query { base_url: String, id: u64, text: String },

    /// Compiled transformation model
    Compiled { path: PathBuf },
}

impl fmt::Debug for TemplateOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File { path } => f.debug_struct("File").field("path", path).finish(),
            Self::Object { store } => f.debug_struct("Object").field("store", &store.name()).finish(),
            Self::Query { base_url, id, .. } => f
                .debug_struct("Query")
                .field("base_url", base_url)
                .field("id", id)
                .finish(),
            Self::Compiled { path } => f.debug_struct("Compiled").field("path", path).finish(),
        }
    }
}

/// Serializable reference to the template an edge came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRef {
    #[serde(rename = "type")]
    pub source_type: SourceType,

    pub key: String,

    pub uri: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<String>,
}

/// One discovered template.
///
/// Immutable after construction apart from the cached uri and text.
#[derive(Debug, Clone)]
pub struct Template {
    source_type: SourceType,
    key: String,
    bucket: Option<String>,
    project: Option<String>,
    data_source: Option<String>,
    default_table_prefix: Option<String>,
    origin: TemplateOrigin,
    uri: OnceLock<String>,
    text: OnceLock<String>,
}

impl Template {
    fn with_origin(source_type: SourceType, key: String, origin: TemplateOrigin) -> Self {
        Self {
            source_type,
            key,
            bucket: None,
            project: None,
            data_source: None,
            default_table_prefix: None,
            origin,
            uri: OnceLock::new(),
            text: OnceLock::new(),
        }
    }

    /// Local file template; the key is the walked path
    pub fn file(key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::with_origin(
            SourceType::File,
            key.into(),
            TemplateOrigin::File { path: path.into() },
        )
    }

    /// Object storage template
    pub fn object(
        bucket: impl Into<String>,
        key: impl Into<String>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        let mut template = Self::with_origin(
            SourceType::ObjectStorage,
            key.into(),
            TemplateOrigin::Object { store },
        );
        template.bucket = Some(bucket.into());
        template
    }

    /// Saved BI query; the key is the query name
    pub fn query(
        base_url: impl Into<String>,
        data_source: impl Into<String>,
        id: u64,
        name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let mut template = Self::with_origin(
            SourceType::BiQuery,
            name.into(),
            TemplateOrigin::Query {
                base_url: base_url.into(),
                id,
                text: text.into(),
            },
        );
        template.data_source = Some(data_source.into());
        template
    }

    /// Compiled transformation model
    pub fn compiled(key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::with_origin(
            SourceType::TransformProject,
            key.into(),
            TemplateOrigin::Compiled { path: path.into() },
        )
    }

    pub fn with_project(mut self, project: Option<String>) -> Self {
        self.project = project;
        self
    }

    pub fn with_default_table_prefix(mut self, prefix: Option<String>) -> Self {
        self.default_table_prefix = prefix;
        self
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref()
    }

    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    pub fn default_table_prefix(&self) -> Option<&str> {
        self.default_table_prefix.as_deref()
    }

    /// Canonical identifier, computed once
    pub fn uri(&self) -> &str {
        self.uri.get_or_init(|| match &self.origin {
            TemplateOrigin::File { path } | TemplateOrigin::Compiled { path } => absolute_path(path),
            TemplateOrigin::Object { .. } => format!(
                "{}{}/{}",
                GCS_URI_PREFIX,
                self.bucket.as_deref().unwrap_or_default(),
                self.key
            ),
            TemplateOrigin::Query { base_url, id, .. } => {
                format!("{}/queries/{}", base_url.trim_end_matches('/'), id)
            }
        })
    }

    /// Raw template text, fetched from the source on first use
    pub fn template_str(&self) -> Result<&str, Error> {
        if let Some(text) = self.text.get() {
            return Ok(text);
        }

        let text = match &self.origin {
            TemplateOrigin::File { path } | TemplateOrigin::Compiled { path } => {
                std::fs::read_to_string(path).map_err(|e| {
                    ConnectorError::IoError(format!("{}: {}", path.display(), e))
                })?
            }
            TemplateOrigin::Object { store } => {
                store.get_object(self.bucket.as_deref().unwrap_or_default(), &self.key)?
            }
            TemplateOrigin::Query { text, .. } => text.clone(),
        };

        Ok(self.text.get_or_init(|| text))
    }

    /// Substitute parameters into the raw text.
    ///
    /// Blocks mentioning `ignored` parameters stay verbatim. Compiled models
    /// are returned unchanged.
    pub fn render(&self, params: &Parameters, ignored: &[String]) -> Result<String, Error> {
        let text = self.template_str()?;
        match self.source_type {
            SourceType::TransformProject => Ok(text.to_string()),
            SourceType::File | SourceType::ObjectStorage | SourceType::BiQuery => {
                Ok(renderer().render(text, params, ignored)?)
            }
        }
    }

    /// Placeholder tokens of the raw text, one per occurrence
    pub fn parameter_tokens(&self) -> Result<Vec<String>, Error> {
        Ok(get_parameter_tokens(self.template_str()?)?)
    }

    /// Tables the mapping declares for this template
    pub fn mapped_tables<'a>(
        &'a self,
        mapping: &'a MappingConfig,
    ) -> impl Iterator<Item = &'a TableDeclaration> + 'a {
        MappingResolver::new(mapping).mapped_tables(self)
    }

    pub fn is_mapped(&self, mapping: &MappingConfig) -> bool {
        MappingResolver::new(mapping).is_mapped(self)
    }

    /// Reference stored on edges
    pub fn to_ref(&self) -> TemplateRef {
        TemplateRef {
            source_type: self.source_type,
            key: self.key.clone(),
            uri: self.uri().to_string(),
            bucket: self.bucket.clone(),
            project: self.project.clone(),
            data_source: self.data_source.clone(),
        }
    }
}

fn absolute_path(path: &Path) -> String {
    let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    });
    resolved.to_string_lossy().into_owned()
}
