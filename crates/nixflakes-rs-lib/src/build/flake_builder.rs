use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::events::FailureReason;
use crate::flake::FlakeIdentifier;
use super::{AttemptOrdinal, BuildAttempt, BuildOutcome, Builder};
use super::hash_repair::HashRepair;
use super::tools::{GitTool, NixTool, ToolRunner};

/// Builds flakes with `nix build`, repairing a wrong source hash once.
pub struct FlakeBuilder {
	git: GitTool,
	nix: NixTool,
	repair: HashRepair,
	forensic_dir: PathBuf,
}

impl FlakeBuilder {
	/// # Parameters
	/// - `config` - Supplies the tool programs and the forensic directory, failed builds are copied below it one folder per flake.
	/// - `runner` - Runs `git` and `nix`, tests pass a scripted one.
	pub fn new(config: &crate::Config, runner: Arc<dyn ToolRunner>) -> crate::Result<Self> {
		Ok(Self {
			git: GitTool::new(runner.clone(), config.git_program()),
			nix: NixTool::new(runner, config.nix_program()),
			repair: HashRepair::new()?,
			forensic_dir: config.forensic_dir().to_path_buf(),
		})
	}

	/// Where a failed build of `flake` is preserved.
	pub fn forensic_path(&self, flake: &FlakeIdentifier) -> PathBuf {
		self.forensic_dir.join(flake.folder_name())
	}

	/// Copies `output_dir` into a fresh scratch directory and stages every top level entry.
	async fn stage(&self, output_dir: &Path) -> Result<tempfile::TempDir, FailureReason> {
		let scratch = tempfile::Builder::new()
			.prefix("nixflakes-build-")
			.tempdir()
			.map_err(|e| FailureReason::Internal(format!("failed to create scratch directory: {}", e)))?;

		if output_dir.is_dir() {
			copy_contents(output_dir, scratch.path())
				.map_err(|e| FailureReason::Internal(format!("failed to stage {}: {}", output_dir.display(), e)))?;
		}

		self.git.init(scratch.path()).await.map_err(|e| FailureReason::Tool(e.to_string()))?;

		let mut entries = std::fs::read_dir(scratch.path())
			.map_err(|e| FailureReason::Internal(e.to_string()))?
			.filter_map(|e| e.ok())
			.map(|e| e.file_name().to_string_lossy().to_string())
			.filter(|name| name != ".git")
			.collect::<Vec<_>>();
		entries.sort();
		for entry in entries {
			self.git.add(scratch.path(), &entry).await.map_err(|e| FailureReason::Tool(e.to_string()))?;
		}

		Ok(scratch)
	}

	async fn attempt(&self, scratch: &Path, ordinal: AttemptOrdinal) -> Result<BuildAttempt, FailureReason> {
		let output = self.nix.build(scratch).await.map_err(|e| FailureReason::Tool(e.to_string()))?;
		let combined = output.combined();
		Ok(BuildAttempt {
			scratch_dir: scratch.to_path_buf(),
			ordinal,
			succeeded: output.success,
			expected_hash: if output.success { None } else { self.repair.extract_expected_hash(&combined) },
			output: combined,
		})
	}

	/// Applies the hash nix reported, drops the staged git metadata and copies the result back.
	fn apply_repair(&self, scratch: &Path, output_dir: &Path, hash: &str) -> crate::Result<()> {
		let changed = self.repair.rewrite_tree(scratch, hash)?;
		log::info!("Rewrote source hash to {} in {} file(s)", hash, changed.len());

		let git_dir = scratch.join(".git");
		if git_dir.exists() {
			std::fs::remove_dir_all(&git_dir)?;
		}
		std::fs::create_dir_all(output_dir)?;
		copy_contents(scratch, output_dir)?;
		Ok(())
	}

	/// Copies the scratch directory to the forensic location, replacing an older copy.
	fn preserve(&self, flake: &FlakeIdentifier, scratch: &Path, attempt: &BuildAttempt) -> FailureReason {
		let destination = self.forensic_path(flake);
		log::error!("Building {} failed on {:?} attempt:\n{}", flake, attempt.ordinal, attempt.output);

		let copied = (|| -> crate::Result<()> {
			if destination.exists() {
				std::fs::remove_dir_all(&destination)?;
			}
			std::fs::create_dir_all(&destination)?;
			copy_contents(scratch, &destination)
		})();

		match copied {
			Ok(()) => {
				log::error!("Build files of {} preserved in {}", flake, destination.display());
				FailureReason::BuildTool { forensic_dir: destination, output: attempt.output.clone() }
			},
			Err(e) => FailureReason::Internal(format!("build of {} failed and could not be preserved: {}", flake, e)),
		}
	}

	async fn run(&self, flake: &FlakeIdentifier, output_dir: &Path) -> Result<PathBuf, FailureReason> {
		/* `scratch` is deleted when dropped, whatever the outcome */
		let scratch = self.stage(output_dir).await?;

		let first = self.attempt(scratch.path(), AttemptOrdinal::First).await?;
		if first.succeeded {
			return Ok(output_dir.to_path_buf());
		}

		let Some(hash) = first.expected_hash.clone() else {
			return Err(self.preserve(flake, scratch.path(), &first));
		};

		log::warn!("Source hash of {} is wrong, nix got {}", flake, hash);
		self.apply_repair(scratch.path(), output_dir, &hash)
			.map_err(|e| FailureReason::Internal(format!("failed to apply repaired hash: {}", e)))?;

		let repaired = self.attempt(scratch.path(), AttemptOrdinal::Repair).await?;
		if repaired.succeeded {
			Ok(output_dir.to_path_buf())
		} else {
			Err(self.preserve(flake, scratch.path(), &repaired))
		}
	}
}

#[async_trait]
impl Builder for FlakeBuilder {
	async fn build(&self, flake: &FlakeIdentifier, output_dir: &Path) -> BuildOutcome {
		log::info!("Building {} from {}", flake, output_dir.display());
		match self.run(flake, output_dir).await {
			Ok(location) => {
				log::info!("Built {}", flake);
				BuildOutcome::Built(location)
			},
			Err(reason) => BuildOutcome::Failed(reason),
		}
	}
}

/// Copies the contents of `source` into `destination`, overwriting existing files.
fn copy_contents(source: &Path, destination: &Path) -> crate::Result<()> {
	let options = fs_extra::dir::CopyOptions::new().overwrite(true).content_only(true);
	fs_extra::dir::copy(source, destination, &options)?;
	Ok(())
}
