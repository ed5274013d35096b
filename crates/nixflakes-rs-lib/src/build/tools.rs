//! Thin wrappers around the `git` and `nix` command line tools.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
	#[error("git init failed in {}: {output}", folder.display())]
	GitInitFailed { folder: PathBuf, output: String },
	#[error("git add {file} failed: {output}")]
	GitAddFailed { file: String, output: String },
	#[error("failed to run {program}: {source}")]
	Spawn { program: String, source: std::io::Error },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
	pub success: bool,
	pub stdout: String,
	pub stderr: String,
}

impl ToolOutput {
	pub fn combined(&self) -> String {
		match (self.stdout.is_empty(), self.stderr.is_empty()) {
			(true, _) => self.stderr.clone(),
			(_, true) => self.stdout.clone(),
			_ => format!("{}\n{}", self.stdout, self.stderr),
		}
	}
}

/// Runs external programs.
#[async_trait]
pub trait ToolRunner: Send + Sync {
	async fn run(&self, program: &str, args: &[&str], cwd: &Path) -> std::io::Result<ToolOutput>;
}

/// Runs programs as child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl ToolRunner for ProcessRunner {
	async fn run(&self, program: &str, args: &[&str], cwd: &Path) -> std::io::Result<ToolOutput> {
		log::trace!("Running `{} {}` in {}", program, args.join(" "), cwd.display());
		let output = tokio::process::Command::new(program)
			.args(args)
			.current_dir(cwd)
			.stdin(std::process::Stdio::null())
			.output()
			.await?;

		Ok(ToolOutput {
			success: output.status.success(),
			stdout: String::from_utf8_lossy(&output.stdout).to_string(),
			stderr: String::from_utf8_lossy(&output.stderr).to_string(),
		})
	}
}

#[derive(Clone)]
pub struct GitTool {
	runner: Arc<dyn ToolRunner>,
	program: String,
}

impl GitTool {
	pub fn new(runner: Arc<dyn ToolRunner>, program: impl Into<String>) -> Self {
		Self { runner, program: program.into() }
	}

	pub async fn init(&self, folder: &Path) -> Result<(), ToolError> {
		log::debug!("Initializing a git repository in {}", folder.display());
		let output = self.runner.run(&self.program, &["init"], folder).await
			.map_err(|source| ToolError::Spawn { program: self.program.clone(), source })?;
		if !output.success {
			return Err(ToolError::GitInitFailed { folder: folder.to_path_buf(), output: output.combined() });
		}
		Ok(())
	}

	pub async fn add(&self, folder: &Path, file: &str) -> Result<(), ToolError> {
		log::trace!("Adding {} to the git repository in {}", file, folder.display());
		let output = self.runner.run(&self.program, &["add", file], folder).await
			.map_err(|source| ToolError::Spawn { program: self.program.clone(), source })?;
		if !output.success {
			return Err(ToolError::GitAddFailed { file: file.to_string(), output: output.combined() });
		}
		Ok(())
	}
}

#[derive(Clone)]
pub struct NixTool {
	runner: Arc<dyn ToolRunner>,
	program: String,
}

impl NixTool {
	pub fn new(runner: Arc<dyn ToolRunner>, program: impl Into<String>) -> Self {
		Self { runner, program: program.into() }
	}

	/// Runs `nix build .` in `folder`. A failed build is not an error here, check [`ToolOutput::success`].
	pub async fn build(&self, folder: &Path) -> Result<ToolOutput, ToolError> {
		log::debug!("Building the flake in {}", folder.display());
		self.runner.run(&self.program, &["build", "."], folder).await
			.map_err(|source| ToolError::Spawn { program: self.program.clone(), source })
	}
}
