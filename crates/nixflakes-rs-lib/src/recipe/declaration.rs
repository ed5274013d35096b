//! # Recipe declaration
//!
//! Every recipe directory carries a `recipe.toml` stating what it can build.
//!
//! ```toml
//! [flake]
//! requests = "2.31.0"
//!
//! [flake.metadata]
//! type = "setuptools"
//! supports = ["requests==2.31.0"]
//! ```
//!
//! The `metadata` table is not a flake entry. Declarations are checked when
//! recipes are loaded so a broken one never takes part in matching.

use std::path::Path;

use crate::package::VersionSpec;

pub const DECLARATION_FILE: &str = "recipe.toml";

#[derive(Debug, thiserror::Error)]
pub enum DeclarationError {
	#[error("recipe.toml is missing")]
	MissingRecipeToml,
	#[error("IO error reading recipe.toml: {0}")]
	IO(#[from] std::io::Error),
	#[error("recipe.toml is not valid TOML: {0}")]
	Toml(#[from] toml::de::Error),
	#[error("recipe.toml has no [flake] section")]
	MissingFlakeSection,
	#[error("the [flake] section of recipe.toml declares no flakes")]
	EmptyFlakeSection,
	#[error("flake `{flake}` has no version spec")]
	MissingFlakeVersionSpec { flake: String },
	#[error("flake `{flake}` has an invalid version spec `{spec}`")]
	InvalidVersionSpec { flake: String, spec: String },
	#[error("the [flake.metadata] section of recipe.toml is empty")]
	EmptyFlakeMetadataSection,
	#[error("the [flake.metadata] section of recipe.toml has no type")]
	MissingTypeInFlakeMetadata,
	#[error("invalid entry `{0}` in supports, expected `name==version`")]
	InvalidSupportsEntry(String),
}

/// A supported flake entry, the name and the version spec it is declared with.
#[derive(Debug, Clone, PartialEq)]
pub struct SupportedEntry {
	pub name: String,
	pub spec: String,
	pub version_spec: VersionSpec,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecipeDeclaration {
	pub flake_type: String,
	pub entries: Vec<SupportedEntry>,
	/// Explicit `(name, version)` pairs the recipe is written for.
	pub supports: Vec<(String, String)>,
}

/// Reads `recipe.toml` from a recipe directory.
///
/// # Errors
/// - [`MissingRecipeToml`](DeclarationError::MissingRecipeToml) when the file doesn't exist.
/// - Any error from [`parse_declaration`].
pub fn load_declaration(recipe_dir: impl AsRef<Path>) -> Result<RecipeDeclaration, DeclarationError> {
	let path = recipe_dir.as_ref().join(DECLARATION_FILE);
	if !path.is_file() {
		return Err(DeclarationError::MissingRecipeToml);
	}
	parse_declaration(&std::fs::read_to_string(path)?)
}

pub fn parse_declaration(content: &str) -> Result<RecipeDeclaration, DeclarationError> {
	let document = content.parse::<toml::Table>()?;

	let flake = document.get("flake")
		.and_then(toml::Value::as_table)
		.ok_or(DeclarationError::MissingFlakeSection)?;

	let mut entries = Vec::<SupportedEntry>::new();
	for (name, value) in flake.iter().filter(|(k, _)| k.as_str() != "metadata") {
		let spec = value.as_str()
			.map(str::trim)
			.filter(|s| !s.is_empty())
			.ok_or_else(|| DeclarationError::MissingFlakeVersionSpec { flake: name.clone() })?;
		let version_spec = VersionSpec::parse(spec)
			.map_err(|_| DeclarationError::InvalidVersionSpec { flake: name.clone(), spec: spec.to_string() })?;
		entries.push(SupportedEntry { name: name.clone(), spec: spec.to_string(), version_spec });
	}
	if entries.is_empty() {
		return Err(DeclarationError::EmptyFlakeSection);
	}

	let metadata = flake.get("metadata")
		.and_then(toml::Value::as_table)
		.ok_or(DeclarationError::MissingTypeInFlakeMetadata)?;
	if metadata.is_empty() {
		return Err(DeclarationError::EmptyFlakeMetadataSection);
	}
	let flake_type = metadata.get("type")
		.and_then(toml::Value::as_str)
		.filter(|s| !s.trim().is_empty())
		.ok_or(DeclarationError::MissingTypeInFlakeMetadata)?
		.trim()
		.to_string();

	let mut supports = Vec::<(String, String)>::new();
	if let Some(list) = metadata.get("supports").and_then(toml::Value::as_array) {
		for item in list {
			let text = item.as_str().unwrap_or_default();
			let (name, version) = text.split_once("==")
				.map(|(n, v)| (n.trim(), v.trim()))
				.filter(|(n, v)| !n.is_empty() && !v.is_empty())
				.ok_or_else(|| DeclarationError::InvalidSupportsEntry(text.to_string()))?;
			supports.push((name.to_string(), version.to_string()));
		}
	}

	Ok(RecipeDeclaration { flake_type, entries, supports })
}
