//! # Building flakes
//!
//! A flake is built in a throwaway copy of its folder so a failed build
//! never leaves anything behind in the flakes directory. The one failure we
//! know how to fix is a wrong source hash, the builder rewrites it and tries
//! exactly once more. Anything else is copied to the forensic directory for
//! inspection.

pub mod tools;
pub mod hash_repair;
pub mod flake_builder;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::events::FailureReason;
use crate::flake::FlakeIdentifier;

pub use flake_builder::FlakeBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOrdinal {
	First,
	/// Second and last attempt after rewriting the source hash.
	Repair,
}

/// A single invocation of the build tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildAttempt {
	pub scratch_dir: PathBuf,
	pub ordinal: AttemptOrdinal,
	pub succeeded: bool,
	/// Hash the build tool expected, when it failed on a hash mismatch.
	pub expected_hash: Option<String>,
	/// Combined stdout and stderr.
	pub output: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome {
	Built(PathBuf),
	Failed(FailureReason),
}

#[async_trait]
pub trait Builder: Send + Sync {
	/// Builds the flake whose files are in `output_dir`.
	async fn build(&self, flake: &FlakeIdentifier, output_dir: &Path) -> BuildOutcome;
}
