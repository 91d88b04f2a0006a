//! Template sources
//!
//! Each configured include entry becomes a [`TemplateSource`] that enumerates
//! its templates after exclusion. Enumeration is restartable: every call to
//! [`TemplateSource::templates`] lists the source again.

use regex::Regex;
use std::sync::Arc;
use walkdir::WalkDir;

use stairwell_connectors::{GcsObjectStore, ObjectStore, QueryCatalog, RedashClient};
use stairwell_core::config::full_match_regex;
use stairwell_core::{
    BiQueryInclude, ExcludeRules, FileInclude, IncludeSource, ObjectStorageInclude, SourceType,
    TransformProjectInclude,
};
use stairwell_dbt::{compiled_artifacts, DbtCompileCommand, DbtProject};

use crate::error::Error;
use crate::template::Template;

/// Lazy sequence of templates; items fail individually
pub type Templates<'a> = Box<dyn Iterator<Item = Result<Template, Error>> + 'a>;

/// Connector overrides, used instead of the network clients built from config
#[derive(Clone, Default)]
pub struct Connectors {
    pub object_store: Option<Arc<dyn ObjectStore>>,
    pub query_catalog: Option<Arc<dyn QueryCatalog>>,
}

impl Connectors {
    fn object_store_for(&self, include: &ObjectStorageInclude) -> Result<Arc<dyn ObjectStore>, Error> {
        match &self.object_store {
            Some(store) => Ok(Arc::clone(store)),
            None => Ok(Arc::new(GcsObjectStore::from_include(include)?)),
        }
    }

    fn query_catalog_for(&self, include: &BiQueryInclude) -> Result<Arc<dyn QueryCatalog>, Error> {
        match &self.query_catalog {
            Some(catalog) => Ok(Arc::clone(catalog)),
            None => Ok(Arc::new(RedashClient::from_include(include)?)),
        }
    }
}

enum SourceKind {
    File {
        include: FileInclude,
        regex: Regex,
    },
    ObjectStorage {
        include: ObjectStorageInclude,
        regex: Regex,
        store: Arc<dyn ObjectStore>,
    },
    BiQuery {
        include: BiQueryInclude,
        catalog: Arc<dyn QueryCatalog>,
    },
    TransformProject {
        include: TransformProjectInclude,
    },
}

/// One configured include entry
pub struct TemplateSource {
    kind: SourceKind,
    location: String,
    excludes: ExcludeRules,
}

impl TemplateSource {
    /// Set up a source. Bad regexes and missing credentials fail here.
    pub fn from_include(
        include: &IncludeSource,
        connectors: &Connectors,
        excludes: ExcludeRules,
    ) -> Result<Self, Error> {
        let kind = match include {
            IncludeSource::File(include) => SourceKind::File {
                regex: full_match_regex(&include.regex)?,
                include: include.clone(),
            },
            IncludeSource::ObjectStorage(include) => SourceKind::ObjectStorage {
                regex: full_match_regex(&include.regex)?,
                store: connectors.object_store_for(include)?,
                include: include.clone(),
            },
            IncludeSource::BiQuery(include) => SourceKind::BiQuery {
                catalog: connectors.query_catalog_for(include)?,
                include: include.clone(),
            },
            IncludeSource::TransformProject(include) => SourceKind::TransformProject {
                include: include.clone(),
            },
        };

        Ok(Self {
            kind,
            location: describe_include(include),
            excludes,
        })
    }

    pub fn source_type(&self) -> SourceType {
        match &self.kind {
            SourceKind::File { .. } => SourceType::File,
            SourceKind::ObjectStorage { .. } => SourceType::ObjectStorage,
            SourceKind::BiQuery { .. } => SourceType::BiQuery,
            SourceKind::TransformProject { .. } => SourceType::TransformProject,
        }
    }

    /// Whether an exclude rule for this source's type matches `key`
    pub fn is_excluded(&self, key: &str) -> bool {
        self.excludes.is_excluded(self.source_type(), key)
    }

    /// Human-readable location, used in logs and issues
    pub fn describe(&self) -> &str {
        &self.location
    }

    fn default_table_prefix(&self) -> Option<String> {
        let options = match &self.kind {
            SourceKind::File { include, .. } => &include.options,
            SourceKind::ObjectStorage { include, .. } => &include.options,
            SourceKind::BiQuery { include, .. } => &include.options,
            SourceKind::TransformProject { include } => &include.options,
        };
        options.default_table_prefix.clone()
    }

    /// Enumerate templates.
    ///
    /// Listing failures (unreachable bucket, failed compile, missing project
    /// descriptor) are returned here; per-template failures come through the
    /// iterator.
    pub fn templates(&self) -> Result<Templates<'_>, Error> {
        let prefix = self.default_table_prefix();

        match &self.kind {
            SourceKind::File { include, regex } => {
                if !include.path.exists() {
                    return Err(Error::Io(format!(
                        "template directory {} does not exist",
                        include.path.display()
                    )));
                }

                let walk = WalkDir::new(&include.path)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(move |entry| {
                        let entry = match entry {
                            Ok(entry) => entry,
                            Err(e) => return Some(Err(Error::Io(e.to_string()))),
                        };
                        if !entry.file_type().is_file() {
                            return None;
                        }

                        let key = file_key(&entry.path().to_string_lossy());
                        if !regex.is_match(&key) {
                            return None;
                        }
                        if self.is_excluded(&key) {
                            tracing::debug!("{} is skipped.", key);
                            return None;
                        }

                        Some(Ok(Template::file(key, entry.path())
                            .with_default_table_prefix(prefix.clone())))
                    });

                Ok(Box::new(walk))
            }

            SourceKind::ObjectStorage { include, regex, store } => {
                let names = store.list_objects(&include.bucket, &include.prefix)?;
                tracing::debug!(
                    "Listed {} objects in gs://{}/{}",
                    names.len(),
                    include.bucket,
                    include.prefix
                );

                let templates = names.into_iter().filter_map(move |name| {
                    if !regex.is_match(&name) {
                        return None;
                    }
                    if self.is_excluded(&name) {
                        tracing::debug!("{} is skipped.", name);
                        return None;
                    }

                    Some(Ok(Template::object(include.bucket.clone(), name, Arc::clone(store))
                        .with_project(include.project.clone())
                        .with_default_table_prefix(prefix.clone())))
                });

                Ok(Box::new(templates))
            }

            SourceKind::BiQuery { include, catalog } => {
                let queries = catalog.list_queries(&include.data_source)?;
                let base_url = catalog.base_url().to_string();

                let templates = queries.into_iter().filter_map(move |query| {
                    if self.is_excluded(&query.name) {
                        tracing::debug!("{} is skipped.", query.name);
                        return None;
                    }

                    Some(Ok(Template::query(
                        base_url.clone(),
                        include.data_source.clone(),
                        query.id,
                        query.name,
                        query.query,
                    )
                    .with_default_table_prefix(prefix.clone())))
                });

                Ok(Box::new(templates))
            }

            SourceKind::TransformProject { include } => {
                let output = DbtCompileCommand::from_include(include).run()?;
                tracing::debug!("Compile finished: {}", output.stdout.trim_end());

                let project = DbtProject::load(&include.project_dir)?;
                let artifacts = compiled_artifacts(&include.project_dir, &project)?;

                let templates = artifacts.into_iter().filter_map(move |artifact| {
                    let key = artifact.key();
                    if self.is_excluded(&key) {
                        tracing::debug!("{} is skipped.", key);
                        return None;
                    }

                    Some(Ok(Template::compiled(key, artifact.path)
                        .with_project(Some(project.name.clone()))
                        .with_default_table_prefix(prefix.clone())))
                });

                Ok(Box::new(templates))
            }
        }
    }
}

/// Human-readable location of an include entry
pub fn describe_include(include: &IncludeSource) -> String {
    match include {
        IncludeSource::File(include) => include.path.display().to_string(),
        IncludeSource::ObjectStorage(include) => {
            format!("gs://{}/{}", include.bucket, include.prefix)
        }
        IncludeSource::BiQuery(include) => {
            format!("{} ({})", include.base_url, include.data_source)
        }
        IncludeSource::TransformProject(include) => include.project_dir.display().to_string(),
    }
}

/// Walked path as a key, without a leading `./`
fn file_key(path: &str) -> String {
    let path = path.replace('\\', "/");
    path.strip_prefix("./").map(str::to_string).unwrap_or(path)
}
