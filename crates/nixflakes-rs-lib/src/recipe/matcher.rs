//! Picks the recipe that fits a package best.
//!
//! Each recipe gets a similarity score in `[0, 1]`:
//! - `1.0` when the recipe lists the exact package under `supports` or pins its exact version.
//! - `0.9` when a declared version spec is compatible with the package version.
//! - `0.7` when a declared entry merely has the same name.
//! - `0.5` when the recipe type matches the package type.
//!
//! The score is the best of these, not their sum. Recipes scoring zero never match.

use crate::package::PackageShape;
use crate::package::version_spec::exact_version_text;
use super::RecipeDescriptor;

pub const DIRECT_SUPPORT: f64 = 1.0;
pub const EXACT_VERSION: f64 = 1.0;
pub const COMPATIBLE_VERSION: f64 = 0.9;
pub const SAME_NAME: f64 = 0.7;
pub const SAME_TYPE: f64 = 0.5;

pub fn similarity(recipe: &RecipeDescriptor, shape: &PackageShape) -> f64 {
	if recipe.directly_supports(shape) {
		return DIRECT_SUPPORT;
	}

	let mut score = 0.0_f64;
	if recipe.flake_type == shape.package_type {
		score = SAME_TYPE;
	}

	let version = shape.parsed_version();
	for entry in recipe.entries.iter().filter(|e| e.name == shape.name) {
		if exact_version_text(&entry.spec) == shape.version {
			return EXACT_VERSION;
		}
		let contribution = match &version {
			Some(v) if entry.version_spec.is_compatible(v) => COMPATIBLE_VERSION,
			_ => SAME_NAME,
		};
		score = score.max(contribution);
	}

	score
}

/// Scores every recipe, dropping the ones at zero, best first.
///
/// Equal scores keep the order the recipes were given in.
pub fn rank<'a>(shape: &PackageShape, recipes: impl IntoIterator<Item = &'a RecipeDescriptor>) -> Vec<(&'a RecipeDescriptor, f64)> {
	let mut scored = recipes.into_iter()
		.map(|r| (r, similarity(r, shape)))
		.filter(|(_, score)| *score > 0.0)
		.collect::<Vec<_>>();
	/* sort_by is stable so ties stay in registration order */
	scored.sort_by(|a, b| b.1.total_cmp(&a.1));
	scored
}

pub fn select_recipe<'a>(shape: &PackageShape, recipes: impl IntoIterator<Item = &'a RecipeDescriptor>) -> Option<&'a RecipeDescriptor> {
	let ranked = rank(shape, recipes);
	for (recipe, score) in &ranked {
		log::debug!("Recipe `{}` scores {:.2} for {}-{}", recipe.name, score, shape.name, shape.version);
	}
	ranked.first().map(|(r, _)| *r)
}
