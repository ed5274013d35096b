//! # Recipes
//!
//! A recipe is a directory holding a [declaration](declaration) and a
//! `templates/` tree. Recipes are loaded once and never change afterwards,
//! the [matcher] picks one per flake and [render] turns its templates into
//! the flake's files.

pub mod declaration;
pub mod matcher;
pub mod render;

use std::path::{Path, PathBuf};

use crate::package::PackageShape;
use declaration::{DeclarationError, SupportedEntry};

pub const TEMPLATES_DIR: &str = "templates";
const TEMPLATE_EXTENSION: &str = ".tmpl";

/// A single template file of a recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateUnit {
	/// Directory relative to the flake root, empty for top level files.
	pub folder: PathBuf,
	pub path: String,
	pub contents: String,
}

/// A loaded recipe.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeDescriptor {
	pub name: String,
	pub flake_type: String,
	pub entries: Vec<SupportedEntry>,
	pub supports: Vec<(String, String)>,
	pub templates: Vec<TemplateUnit>,
}

impl RecipeDescriptor {
	/// Loads the recipe stored in `dir`, named after the directory.
	///
	/// # Errors
	/// - Any [`DeclarationError`] from reading `recipe.toml`.
	/// - [`IO`](DeclarationError::IO) when reading the templates.
	pub fn load(dir: impl AsRef<Path>) -> Result<Self, DeclarationError> {
		let dir = dir.as_ref();
		let declaration = declaration::load_declaration(dir)?;
		let name = dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();

		Ok(Self {
			templates: load_templates(dir.join(TEMPLATES_DIR))?,
			name,
			flake_type: declaration.flake_type,
			entries: declaration.entries,
			supports: declaration.supports,
		})
	}

	/// Whether the recipe lists `name==version` among the flakes it is written for.
	pub fn directly_supports(&self, shape: &PackageShape) -> bool {
		self.supports.iter().any(|(n, v)| *n == shape.name && *v == shape.version)
	}
}

fn load_templates(dir: PathBuf) -> Result<Vec<TemplateUnit>, DeclarationError> {
	let mut templates = Vec::<TemplateUnit>::new();
	if !dir.is_dir() {
		return Ok(templates);
	}

	for entry in walkdir::WalkDir::new(&dir).sort_by_file_name() {
		let entry = entry.map_err(|e| DeclarationError::IO(e.into()))?;
		if !entry.file_type().is_file() {
			continue;
		}
		let relative = pathdiff::diff_paths(entry.path(), &dir).unwrap_or_else(|| entry.path().to_path_buf());
		let file_name = entry.file_name().to_string_lossy();
		templates.push(TemplateUnit {
			folder: relative.parent().map(Path::to_path_buf).unwrap_or_default(),
			path: file_name.strip_suffix(TEMPLATE_EXTENSION).unwrap_or(&file_name).to_string(),
			contents: std::fs::read_to_string(entry.path())?,
		});
	}

	Ok(templates)
}

/// Somewhere recipes can be looked up.
pub trait RecipeRepository: Send + Sync {
	/// Every recipe in registration order.
	fn recipes(&self) -> &[RecipeDescriptor];

	/// Recipes that may be used for `shape`. Scoring happens in the [matcher].
	fn find_recipes_for(&self, _shape: &PackageShape) -> Vec<&RecipeDescriptor> {
		self.recipes().iter().collect()
	}
}

/// Recipes loaded from subdirectories of a recipes directory.
#[derive(Debug, Default, Clone)]
pub struct DirectoryRecipeRepository {
	recipes: Vec<RecipeDescriptor>,
}

impl DirectoryRecipeRepository {
	pub fn from_recipes(recipes: Vec<RecipeDescriptor>) -> Self {
		Self { recipes }
	}

	/// Loads every recipe under `dir`, malformed ones are logged and left out.
	///
	/// # Errors
	/// - [`IO`](crate::error::Error::IO) when `dir` can't be listed.
	pub fn load(dir: impl AsRef<Path>) -> crate::Result<Self> {
		let (repo, failures) = Self::load_with_failures(dir)?;
		for (recipe, e) in failures {
			log::error!("Recipe `{}` is malformed and won't be used: {}", recipe, e);
		}
		Ok(repo)
	}

	/// Like [`load`](Self::load) but refuses to continue if any recipe is malformed.
	///
	/// # Errors
	/// - [`MalformedRecipes`](crate::error::Error::MalformedRecipes) carrying every malformed recipe.
	pub fn load_strict(dir: impl AsRef<Path>) -> crate::Result<Self> {
		let (repo, failures) = Self::load_with_failures(dir)?;
		if failures.is_empty() {
			return Ok(repo);
		}
		for (recipe, e) in &failures {
			log::error!("Recipe `{}` is malformed: {}", recipe, e);
		}
		Err(crate::Error::MalformedRecipes(failures))
	}

	/// Loads recipes in directory name order, returning the failures alongside.
	pub fn load_with_failures(dir: impl AsRef<Path>) -> crate::Result<(Self, Vec<(String, DeclarationError)>)> {
		let dir = dir.as_ref();
		log::debug!("Loading recipes from {}", dir.display());

		let mut dirs = std::fs::read_dir(dir)?
			.filter_map(|e| e.ok())
			.map(|e| e.path())
			.filter(|p| p.is_dir())
			.collect::<Vec<_>>();
		dirs.sort();

		let mut recipes = Vec::<RecipeDescriptor>::new();
		let mut failures = Vec::<(String, DeclarationError)>::new();
		for recipe_dir in dirs {
			match RecipeDescriptor::load(&recipe_dir) {
				Ok(recipe) => {
					log::trace!("Loaded recipe `{}` of type `{}`", recipe.name, recipe.flake_type);
					recipes.push(recipe)
				},
				Err(e) => failures.push((recipe_dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default(), e)),
			}
		}

		Ok((Self { recipes }, failures))
	}
}

impl RecipeRepository for DirectoryRecipeRepository {
	fn recipes(&self) -> &[RecipeDescriptor] {
		&self.recipes
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn templates_keep_folder_and_drop_extension() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::create_dir_all(dir.path().join("nix")).unwrap();
		std::fs::write(dir.path().join("flake.nix.tmpl"), "{}").unwrap();
		std::fs::write(dir.path().join("nix").join("package.nix"), "x").unwrap();

		let templates = load_templates(dir.path().to_path_buf()).unwrap();
		assert_eq!(templates.len(), 2);
		assert!(templates.iter().any(|t| t.folder == Path::new("") && t.path == "flake.nix"));
		assert!(templates.iter().any(|t| t.folder == Path::new("nix") && t.path == "package.nix"));
	}

	#[test]
	fn missing_templates_dir_is_empty() {
		assert!(load_templates(PathBuf::from("/definitely/not/here")).unwrap().is_empty());
	}
}
