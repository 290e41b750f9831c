use std::path::{Path, PathBuf};
use std::process::Command;

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::info;

use crate::config::ScorerConfig;
use crate::error::QcError;

pub const CHECKM2_TAG: &str = "checkm2";

#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub runner: Option<String>,
    pub scorer: Option<String>,
}

/// One batch scoring job over a directory of FASTA files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScorerRequest {
    pub threads: usize,
    pub input_dir: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    pub extension: String,
    pub database: Option<Utf8PathBuf>,
}

pub trait QualityScorer: Send + Sync {
    /// Runs the tool to completion. Either the report lands in
    /// `request.output_dir` or the whole batch fails.
    fn predict(&self, request: &ScorerRequest) -> Result<(), QcError>;
    fn tool_info(&self) -> ToolInfo;
}

#[derive(Debug, Clone)]
pub struct CheckM2Scorer {
    runner: Option<PathBuf>,
    runner_name: Option<String>,
    env: String,
}

impl CheckM2Scorer {
    pub fn new(config: &ScorerConfig) -> Self {
        Self {
            runner: config.runner.as_deref().and_then(resolve_program),
            runner_name: config.runner.clone(),
            env: config.env.clone(),
        }
    }

    /// Program and argument list for `request`.
    pub fn command_line(&self, request: &ScorerRequest) -> Result<(PathBuf, Vec<String>), QcError> {
        let mut args = Vec::new();
        let program = match &self.runner_name {
            Some(name) => {
                let runner = self
                    .runner
                    .clone()
                    .ok_or_else(|| QcError::MissingTool(name.clone()))?;
                args.extend([
                    "run".to_string(),
                    "-n".to_string(),
                    self.env.clone(),
                    CHECKM2_TAG.to_string(),
                ]);
                runner
            }
            None => find_in_path(CHECKM2_TAG)
                .ok_or_else(|| QcError::MissingTool(CHECKM2_TAG.to_string()))?,
        };
        args.extend([
            "predict".to_string(),
            "--threads".to_string(),
            request.threads.max(1).to_string(),
            "--input".to_string(),
            request.input_dir.to_string(),
            "--output-directory".to_string(),
            request.output_dir.to_string(),
            "--extension".to_string(),
            request.extension.clone(),
        ]);
        if let Some(db) = &request.database {
            args.push("--database_path".to_string());
            args.push(db.to_string());
        }
        Ok((program, args))
    }

    fn run_cmd(&self, program: &Path, args: &[String]) -> Result<(), QcError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| QcError::Scorer(format!("spawn {}: {err}", program.display())))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("command failed ({}): {}", output.status, program.display())
        } else {
            stderr
        };
        Err(QcError::Scorer(message))
    }
}

impl QualityScorer for CheckM2Scorer {
    fn predict(&self, request: &ScorerRequest) -> Result<(), QcError> {
        let (program, args) = self.command_line(request)?;
        info!(
            command = %format!("{} {}", program.display(), args.join(" ")),
            "running quality scorer"
        );
        self.run_cmd(&program, &args)
    }

    fn tool_info(&self) -> ToolInfo {
        ToolInfo {
            runner: self
                .runner
                .as_ref()
                .and_then(|path| tool_version(path, &["--version"])),
            scorer: match &self.runner {
                Some(runner) => tool_version(
                    runner,
                    &["run", "-n", &self.env, CHECKM2_TAG, "--version"],
                ),
                None => find_in_path(CHECKM2_TAG)
                    .and_then(|path| tool_version(&path, &["--version"])),
            },
        }
    }
}

/// A name containing a path separator is taken relative to the current
/// directory; a bare name is looked up on `PATH`.
fn resolve_program(name: &str) -> Option<PathBuf> {
    if name.contains('/') || name.contains('\\') {
        let path = PathBuf::from(name);
        return std::path::absolute(&path).ok().filter(|path| path.exists());
    }
    find_in_path(name)
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}

fn tool_version(path: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new(path).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() { None } else { Some(stdout) }
}
