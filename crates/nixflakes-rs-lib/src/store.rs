//! # Flake store
//!
//! Records of flakes that were created. A flake that is in the store is never
//! built again.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Serialize, Deserialize};

use crate::events::FlakeCreated;
use crate::flake::{FlakeDescriptor, FlakeIdentifier};
use crate::recipe::render::RenderedTemplate;

pub const MANIFEST_FILE: &str = "flake.json";

/// What the store keeps about a created flake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFlake {
	pub flake: FlakeIdentifier,
	pub recipe: String,
	pub files: Vec<PathBuf>,
}

#[async_trait]
pub trait FlakeRepository: Send + Sync {
	async fn find_by_name_and_version(&self, flake: &FlakeIdentifier) -> crate::Result<Option<StoredFlake>>;

	/// Records `flake` as created from `recipe`.
	async fn create(&self, flake: &FlakeDescriptor, rendered: &[RenderedTemplate], recipe: &str) -> crate::Result<FlakeCreated>;

	/// Reference other flakes can use as an input to depend on `flake`.
	fn url_for_flake(&self, flake: &FlakeIdentifier) -> String;
}

/// Stores flakes as folders of a flakes directory, each with a JSON manifest.
///
/// The rendered files are written by the orchestrator before building, this
/// only adds the manifest once the build succeeded.
#[derive(Debug, Clone)]
pub struct FileSystemFlakeRepository {
	flakes_dir: PathBuf,
}

impl FileSystemFlakeRepository {
	pub fn new(flakes_dir: impl Into<PathBuf>) -> Self {
		Self { flakes_dir: flakes_dir.into() }
	}

	pub fn flakes_dir(&self) -> &Path {
		&self.flakes_dir
	}

	pub fn folder_for(&self, flake: &FlakeIdentifier) -> PathBuf {
		self.flakes_dir.join(flake.folder_name())
	}
}

#[async_trait]
impl FlakeRepository for FileSystemFlakeRepository {
	async fn find_by_name_and_version(&self, flake: &FlakeIdentifier) -> crate::Result<Option<StoredFlake>> {
		let manifest = self.folder_for(flake).join(MANIFEST_FILE);
		match tokio::fs::read(&manifest).await {
			Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(e.into()),
		}
	}

	async fn create(&self, flake: &FlakeDescriptor, rendered: &[RenderedTemplate], recipe: &str) -> crate::Result<FlakeCreated> {
		let folder = self.folder_for(flake.identifier());
		tokio::fs::create_dir_all(&folder).await?;

		let stored = StoredFlake {
			flake: flake.identifier().clone(),
			recipe: recipe.to_string(),
			files: rendered.iter().map(RenderedTemplate::relative_path).collect(),
		};
		tokio::fs::write(folder.join(MANIFEST_FILE), serde_json::to_vec_pretty(&stored)?).await?;
		log::info!("Stored flake {} in {}", flake.identifier(), folder.display());

		Ok(FlakeCreated {
			url: self.url_for_flake(flake.identifier()),
			flake: stored.flake,
			recipe: stored.recipe,
			files: stored.files,
		})
	}

	fn url_for_flake(&self, flake: &FlakeIdentifier) -> String {
		let folder = self.folder_for(flake);
		let folder = if folder.is_absolute() {
			folder
		} else {
			std::env::current_dir().map(|d| d.join(&folder)).unwrap_or(folder)
		};
		format!("path:{}", folder.display())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::package::{PackageShape, RoleLists};

	#[tokio::test]
	async fn created_flake_is_found() {
		let dir = tempfile::tempdir().unwrap();
		let repo = FileSystemFlakeRepository::new(dir.path());
		let flake = FlakeDescriptor::new(PackageShape::new("idna", "3.4", "setuptools"), RoleLists::default());
		let rendered = vec![RenderedTemplate { folder: PathBuf::new(), path: "flake.nix".into(), contents: String::new() }];

		assert!(repo.find_by_name_and_version(flake.identifier()).await.unwrap().is_none());
		let created = repo.create(&flake, &rendered, "base").await.unwrap();
		let stored = repo.find_by_name_and_version(flake.identifier()).await.unwrap().unwrap();

		assert_eq!(stored.files, vec![PathBuf::from("flake.nix")]);
		assert!(created.url.starts_with("path:") && created.url.ends_with("idna-3.4"));
	}
}
