//! dbt_project.yml parsing
//!
//! Only the fields needed to locate compiled models are read.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Project descriptor file name
pub const PROJECT_FILE_NAME: &str = "dbt_project.yml";

/// dbt_project.yml structure (subset of fields we care about)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbtProject {
    /// Project name, used as a directory under `compiled/`
    pub name: String,

    /// Model directories relative to the project
    #[serde(rename = "model-paths", default = "default_model_paths")]
    pub model_paths: Vec<String>,

    /// Directory compile writes to
    #[serde(rename = "target-path", default = "default_target_path")]
    pub target_path: String,
}

fn default_model_paths() -> Vec<String> {
    vec!["models".to_string()]
}

fn default_target_path() -> String {
    "target".to_string()
}

impl DbtProject {
    /// Load the descriptor from a project directory
    pub fn load(project_dir: &Path) -> Result<Self, ProjectError> {
        Self::from_file(&project_dir.join(PROJECT_FILE_NAME))
    }

    /// Load the descriptor from file
    pub fn from_file(path: &Path) -> Result<Self, ProjectError> {
        if !path.exists() {
            return Err(ProjectError::MissingDescriptor(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| ProjectError::IoError(path.display().to_string(), e.to_string()))?;

        Self::from_yaml(&contents)
    }

    /// Parse the descriptor from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ProjectError> {
        serde_yaml::from_str(yaml).map_err(|e| ProjectError::ParseError(e.to_string()))
    }

    /// `{project_dir}/{target-path}/compiled/{name}/{model-path}` for every model path
    pub fn compiled_model_dirs(&self, project_dir: &Path) -> Vec<PathBuf> {
        self.model_paths
            .iter()
            .map(|model_path| {
                project_dir
                    .join(&self.target_path)
                    .join("compiled")
                    .join(&self.name)
                    .join(model_path)
            })
            .collect()
    }
}

/// Error reading a project
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("Project descriptor not found: {}", .0.display())]
    MissingDescriptor(PathBuf),

    #[error("Failed to read {0}: {1}")]
    IoError(String, String),

    #[error("Failed to parse project descriptor: {0}")]
    ParseError(String),
}
