//! Fixing source hashes after nix reports a mismatch.
//!
//! nix prints something like
//! ```text
//! error: hash mismatch in fixed-output derivation '/nix/store/...':
//!          specified: sha256-AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=
//!             got:    sha256-3Wc+z3nQyKkBu/ZFn6UQb7L7rlN8M5vvi6iq1FBB3ZI=
//! ```
//! the `got` hash replaces every `hash = "..."` and `sha256 = "..."`
//! assignment in the flake's `.nix` files.

use std::path::{Path, PathBuf};

const NIX_EXTENSION: &str = "nix";

#[derive(Debug, Clone)]
pub struct HashRepair {
	got: regex::Regex,
	assignment: regex::Regex,
}

impl HashRepair {
	pub fn new() -> Result<Self, regex::Error> {
		Ok(Self {
			got: regex::Regex::new(r"got:\s+(sha\d+-\S+)")?,
			assignment: regex::Regex::new(r#"((?:hash|sha256)\s*=\s*)"([^"]*)""#)?,
		})
	}

	/// The hash nix actually got, if the output reports a mismatch.
	pub fn extract_expected_hash(&self, diagnostics: &str) -> Option<String> {
		self.got.captures(diagnostics)
			.and_then(|c| c.get(1))
			.map(|m| m.as_str().to_string())
	}

	/// Rewrites hash assignments in `content`, `None` when nothing changed.
	pub fn rewrite(&self, content: &str, hash: &str) -> Option<String> {
		let rewritten = self.assignment.replace_all(content, |c: &regex::Captures| format!("{}\"{}\"", &c[1], hash));
		(rewritten != content).then(|| rewritten.into_owned())
	}

	/// Rewrites a single file, leaving it untouched when it already carries `hash`.
	///
	/// Returns whether the file was written.
	pub fn rewrite_file(&self, path: impl AsRef<Path>, hash: &str) -> crate::Result<bool> {
		let path = path.as_ref();
		let content = std::fs::read_to_string(path)?;
		match self.rewrite(&content, hash) {
			Some(rewritten) => {
				log::debug!("Rewriting hash in {}", path.display());
				std::fs::write(path, rewritten)?;
				Ok(true)
			},
			None => Ok(false),
		}
	}

	/// Rewrites every `.nix` file under `root`, returning the files that changed.
	pub fn rewrite_tree(&self, root: impl AsRef<Path>, hash: &str) -> crate::Result<Vec<PathBuf>> {
		let mut changed = Vec::<PathBuf>::new();
		let walker = walkdir::WalkDir::new(root).into_iter()
			.filter_entry(|e| e.file_name() != ".git");
		for entry in walker {
			let entry = entry?;
			let is_nix = entry.path().extension().map(|e| e == NIX_EXTENSION).unwrap_or(false);
			if entry.file_type().is_file() && is_nix && self.rewrite_file(entry.path(), hash)? {
				changed.push(entry.into_path());
			}
		}
		Ok(changed)
	}
}
