//! Compiled model discovery

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

use crate::project::{DbtProject, ProjectError};

/// Generated schema tests land under `.../schema.yml/<test>.sql`
fn schema_test_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(^|/)schema\.yml/.*\.sql$").expect("schema test regex is valid")
    })
}

/// A compiled `.sql` model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledArtifact {
    /// Path as walked from the project directory
    pub path: PathBuf,
}

impl CompiledArtifact {
    /// Template key, the walked path as a string
    pub fn key(&self) -> String {
        self.path.to_string_lossy().replace('\\', "/")
    }
}

/// Whether a compiled path is a generated schema test
pub fn is_schema_test(key: &str) -> bool {
    schema_test_pattern().is_match(key)
}

/// Compiled models for every model path, sorted, schema tests left out.
///
/// Missing compiled directories yield nothing.
pub fn compiled_artifacts(
    project_dir: &Path,
    project: &DbtProject,
) -> Result<Vec<CompiledArtifact>, ProjectError> {
    let mut artifacts = Vec::new();

    for dir in project.compiled_model_dirs(project_dir) {
        if !dir.exists() {
            tracing::debug!("No compiled models under {}", dir.display());
            continue;
        }

        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry
                .map_err(|e| ProjectError::IoError(dir.display().to_string(), e.to_string()))?;

            if !entry.file_type().is_file()
                || entry.path().extension().and_then(|e| e.to_str()) != Some("sql")
            {
                continue;
            }

            let artifact = CompiledArtifact {
                path: entry.path().to_path_buf(),
            };
            if is_schema_test(&artifact.key()) {
                tracing::debug!("{} is skipped.", artifact.key());
                continue;
            }

            artifacts.push(artifact);
        }
    }

    Ok(artifacts)
}
