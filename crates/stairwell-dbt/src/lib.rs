//! Transformation project (dbt) support
//!
//! This crate handles:
//! - Reading dbt_project.yml
//! - Running `dbt compile` as a bounded subprocess
//! - Discovering compiled model artifacts

pub mod project;
pub mod compile;
pub mod artifacts;

pub use project::{DbtProject, ProjectError, PROJECT_FILE_NAME};
pub use compile::{CompileError, CompileOutput, DbtCompileCommand};
pub use artifacts::{compiled_artifacts, is_schema_test, CompiledArtifact};
