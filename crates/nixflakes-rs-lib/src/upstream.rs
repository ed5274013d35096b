//! Collaborators that know about packages outside of our flakes.
//!
//! A [`PackageResolver`] turns a name and version into a [`PackageShape`],
//! a [`NixpkgsIndex`] tells whether nixpkgs already provides a dependency.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Serialize, Deserialize};

use crate::flake::FlakeIdentifier;
use crate::package::{Dependency, PackageShape};

#[async_trait]
pub trait PackageResolver: Send + Sync {
	/// Resolves the package, `None` when it is unknown upstream.
	async fn resolve(&self, package: &FlakeIdentifier) -> crate::Result<Option<PackageShape>>;
}

pub trait NixpkgsIndex: Send + Sync {
	/// Whether nixpkgs already provides `dependency`.
	fn contains(&self, dependency: &Dependency) -> bool;
}

/// Reads package shapes from `<dir>/<name>-<version>.json`.
#[derive(Debug, Clone)]
pub struct JsonPackageResolver {
	dir: PathBuf,
}

impl JsonPackageResolver {
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self { dir: dir.into() }
	}

	fn path_for(&self, package: &FlakeIdentifier) -> PathBuf {
		self.dir.join(format!("{}.json", package.folder_name()))
	}
}

#[async_trait]
impl PackageResolver for JsonPackageResolver {
	async fn resolve(&self, package: &FlakeIdentifier) -> crate::Result<Option<PackageShape>> {
		let path = self.path_for(package);
		log::trace!("Looking up {} in {}", package, path.display());

		let data = match tokio::fs::read(&path).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(e.into()),
		};
		let shape: PackageShape = serde_json::from_slice(&data)?;

		if shape.name != package.name || shape.version != package.version {
			return Err(crate::Error::Parse(format!("{} describes {}-{}", path.display(), shape.name, shape.version)));
		}
		Ok(Some(shape))
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NixpkgsEntry {
	pub name: String,
	/// `*` matches every version.
	pub version: String,
}

/// A nixpkgs index backed by a JSON list of [`NixpkgsEntry`].
#[derive(Debug, Default, Clone)]
pub struct JsonNixpkgsIndex {
	entries: Vec<NixpkgsEntry>,
}

impl JsonNixpkgsIndex {
	pub fn new(entries: Vec<NixpkgsEntry>) -> Self {
		Self { entries }
	}

	/// # Errors
	/// - [`IO`](crate::error::Error::IO) when opening or reading from the file.
	/// - [`SerdeJSON`](crate::error::Error::SerdeJSON) when deserializing the file.
	pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
		let file = std::fs::File::open(path)?;
		Ok(Self { entries: serde_json::from_reader(file)? })
	}
}

impl NixpkgsIndex for JsonNixpkgsIndex {
	fn contains(&self, dependency: &Dependency) -> bool {
		self.entries.iter().any(|e| e.name == dependency.name && (e.version == "*" || e.version == dependency.version))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn wildcard_matches_any_version() {
		let index = JsonNixpkgsIndex::new(vec![NixpkgsEntry { name: "urllib3".into(), version: "*".into() }]);
		assert!(index.contains(&Dependency::new("urllib3", "2.0.4")) && !index.contains(&Dependency::new("idna", "3.4")));
	}

	#[tokio::test]
	async fn missing_package_is_unknown() {
		let dir = tempfile::tempdir().unwrap();
		let resolver = JsonPackageResolver::new(dir.path());
		assert!(resolver.resolve(&FlakeIdentifier::new("nope", "1.0")).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn resolves_from_json() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(
			dir.path().join("requests-2.31.0.json"),
			r#"{"name":"requests","version":"2.31.0","package_type":"setuptools","dependencies":{"propagated_build":[{"name":"idna","version":"3.4"}]}}"#,
		).unwrap();
		let shape = JsonPackageResolver::new(dir.path()).resolve(&FlakeIdentifier::new("requests", "2.31.0")).await.unwrap().unwrap();
		assert_eq!(shape.dependencies.propagated_build, vec![Dependency::new("idna", "3.4")]);
	}
}
