//! `dbt compile` subprocess
//!
//! The compiler runs without a shell, with captured output and a timeout.
//! The child is killed when the timeout expires.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use stairwell_core::config::{TransformProjectInclude, COMPILE_TIMEOUT_DEFAULT};
use tokio::process::Command;
use tokio::time::timeout;

/// Builder for a compile invocation
#[derive(Debug, Clone)]
pub struct DbtCompileCommand {
    /// Program, optionally followed by leading arguments (`poetry run dbt`)
    executable: String,
    project_dir: PathBuf,
    profiles_dir: PathBuf,
    profile: Option<String>,
    target: Option<String>,
    vars: BTreeMap<String, serde_json::Value>,
    timeout_duration: Duration,
}

/// Captured output of a successful compile
#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub stdout: String,
    pub stderr: String,
}

impl DbtCompileCommand {
    pub fn new(project_dir: impl Into<PathBuf>, profiles_dir: impl Into<PathBuf>) -> Self {
        Self {
            executable: "dbt".to_string(),
            project_dir: project_dir.into(),
            profiles_dir: profiles_dir.into(),
            profile: None,
            target: None,
            vars: BTreeMap::new(),
            timeout_duration: COMPILE_TIMEOUT_DEFAULT,
        }
    }

    /// Command for a configured include entry
    pub fn from_include(include: &TransformProjectInclude) -> Self {
        Self {
            executable: include.executable.clone(),
            project_dir: include.project_dir.clone(),
            profiles_dir: include.profiles_dir.clone(),
            profile: include.profile.clone(),
            target: include.target.clone(),
            vars: include.vars.clone(),
            timeout_duration: include.options.timeout_or(COMPILE_TIMEOUT_DEFAULT),
        }
    }

    pub fn executable(mut self, executable: impl Into<String>) -> Self {
        self.executable = executable.into();
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn var(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.vars.insert(key.into(), value);
        self
    }

    pub fn with_timeout(mut self, duration: Duration) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Arguments after the program
    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = self
            .executable
            .split_whitespace()
            .skip(1)
            .map(str::to_string)
            .collect();

        args.push("compile".to_string());
        args.push("--project-dir".to_string());
        args.push(self.project_dir.display().to_string());
        args.push("--profiles-dir".to_string());
        args.push(self.profiles_dir.display().to_string());

        if let Some(profile) = &self.profile {
            args.push("--profile".to_string());
            args.push(profile.clone());
        }
        if let Some(target) = &self.target {
            args.push("--target".to_string());
            args.push(target.clone());
        }
        if !self.vars.is_empty() {
            let vars: serde_json::Map<String, serde_json::Value> = self
                .vars
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            args.push("--vars".to_string());
            args.push(serde_json::Value::Object(vars).to_string());
        }

        args
    }

    /// Run to completion, blocking the calling thread
    pub fn run(&self) -> Result<CompileOutput, CompileError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CompileError::Launch {
                program: self.executable.clone(),
                message: e.to_string(),
            })?;

        runtime.block_on(self.execute())
    }

    /// Run the compiler
    pub async fn execute(&self) -> Result<CompileOutput, CompileError> {
        let program = self
            .executable
            .split_whitespace()
            .next()
            .ok_or_else(|| CompileError::Launch {
                program: self.executable.clone(),
                message: "empty executable".to_string(),
            })?;
        let args = self.args();

        tracing::info!("Executing: {} {}", program, args.join(" "));

        let mut cmd = Command::new(program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match timeout(self.timeout_duration, cmd.output()).await {
            Ok(result) => result.map_err(|e| CompileError::Launch {
                program: program.to_string(),
                message: e.to_string(),
            })?,
            Err(_) => {
                tracing::warn!(
                    "Compile timed out after {} seconds",
                    self.timeout_duration.as_secs_f64()
                );
                return Err(CompileError::Timeout {
                    seconds: self.timeout_duration.as_secs_f64(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            tracing::debug!("Compile failed with exit code: {:?}", output.status.code());
            return Err(CompileError::Exit {
                code: output.status.code(),
                stderr,
            });
        }

        Ok(CompileOutput { stdout, stderr })
    }
}

/// Compile step failure
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("Compile exited with status {}: {stderr}", .code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()))]
    Exit { code: Option<i32>, stderr: String },

    #[error("Compile timed out after {seconds} seconds")]
    Timeout { seconds: f64 },

    #[error("Failed to launch {program}: {message}")]
    Launch { program: String, message: String },
}
