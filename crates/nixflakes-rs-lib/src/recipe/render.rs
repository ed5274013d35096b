//! # Rendering
//!
//! Templates use `{{ placeholder }}` markers. The values come from a
//! [`RenderContext`] built from the flake descriptor: scalar values describing
//! the flake and dependency lists in a handful of formats.
//!
//! Dependency lists put one entry per line, every line after the first is
//! indented like the line holding the placeholder.
//!
//! | Placeholder                 | Value                                          |
//! |-----------------------------|------------------------------------------------|
//! | `name`, `version`           | package name and version                       |
//! | `version_with_underscores`  | `2_31_0` for `2.31.0`                          |
//! | `description`, `license`    | upstream description, nix license attribute    |
//! | `sha256`                    | source hash                                    |
//! | `repo_url`, `repo_rev`, `repo_owner`, `repo_name` | git source when present  |
//! | `<subtemplate>`             | dependency list across every role              |
//! | `<role>_<subtemplate>`      | dependency list for one role, `check_inputs_flake_deps` |

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::flake::{ClassifiedDependency, FlakeDescriptor, FlakeIdentifier};
use crate::package::{DependencyRole, License};
use super::{RecipeDescriptor, TemplateUnit};

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
	#[error("recipe `{recipe}` does not support placeholder `{placeholder}` used in {template}")]
	UnsupportedPlaceholder { placeholder: String, template: String, recipe: String },
	#[error("recipe `{0}` provides no templates")]
	NoTemplates(String),
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
}

/// A rendered template, ready to be written below a flake folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTemplate {
	pub folder: PathBuf,
	pub path: String,
	pub contents: String,
}

impl RenderedTemplate {
	pub fn relative_path(&self) -> PathBuf {
		self.folder.join(&self.path)
	}
}

/// How a dependency is written out in a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyFormat {
	Name,
	FlakeDeclaration,
	NixpkgsDeclaration,
	AsParameterToPackageNix,
	Overrides,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyView {
	pub name: String,
	pub version: String,
	pub external: bool,
	pub flake_url: String,
}

impl DependencyView {
	pub fn format(&self, format: DependencyFormat) -> String {
		match (format, self.external) {
			(DependencyFormat::Name, _) => self.name.clone(),
			(DependencyFormat::FlakeDeclaration, _) => format!("{}-flake.url = \"{}\";", self.name, self.flake_url),
			(DependencyFormat::NixpkgsDeclaration, _) => format!("inherit (pythonPackages) {};", self.name),
			(DependencyFormat::AsParameterToPackageNix, true) => self.name.clone(),
			(DependencyFormat::AsParameterToPackageNix, false) => format!("{0} = {0}-flake.packages.${{system}}.{0};", self.name),
			(DependencyFormat::Overrides, _) => format!("{0} = python-super.{0};", self.name),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyListView {
	pub items: Vec<DependencyView>,
	pub format: DependencyFormat,
}

impl DependencyListView {
	pub fn render(&self, indent: &str) -> String {
		self.items.iter()
			.map(|d| d.format(self.format))
			.collect::<Vec<_>>()
			.join(&format!("\n{}", indent))
	}
}

/// Scalar values describing the flake itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlakeView {
	pub name: String,
	pub version: String,
	pub version_with_underscores: String,
	pub description: String,
	pub license: String,
	pub sha256: String,
	pub repo_url: String,
	pub repo_rev: String,
	pub repo_owner: String,
	pub repo_name: String,
}

impl FlakeView {
	pub fn new(flake: &FlakeDescriptor) -> Self {
		let package = flake.package();
		let (repo_url, repo_rev, repo_owner, repo_name) = match &package.git_repo {
			Some(repo) => {
				let (owner, name) = repo.owner_and_name().unwrap_or_default();
				(repo.url.clone(), repo.rev.clone(), owner.to_string(), name.to_string())
			},
			None => Default::default(),
		};

		Self {
			name: flake.name().to_string(),
			version: flake.version().to_string(),
			version_with_underscores: flake.version().replace('.', "_"),
			description: package.description.replace('"', "\\\""),
			license: License::from_upstream(&package.license).nix().to_string(),
			sha256: package.source_hash.clone(),
			repo_url,
			repo_rev,
			repo_owner,
			repo_name,
		}
	}

	fn get(&self, key: &str) -> Option<&str> {
		Some(match key {
			"name" => &self.name,
			"version" => &self.version,
			"version_with_underscores" => &self.version_with_underscores,
			"description" => &self.description,
			"license" => &self.license,
			"sha256" => &self.sha256,
			"repo_url" => &self.repo_url,
			"repo_rev" => &self.repo_rev,
			"repo_owner" => &self.repo_owner,
			"repo_name" => &self.repo_name,
			_ => return None,
		})
	}
}

/// The nine dependency list subtemplates, each available per role and across roles.
const SUBTEMPLATES: [&str; 9] = [
	"nixpkgs_deps",
	"flake_deps",
	"all_deps",
	"nixpkgs_declaration",
	"flakes_declaration",
	"nixpkgs_as_parameter_to_package_nix",
	"flakes_as_parameter_to_package_nix",
	"declaration",
	"nixpkgs_overrides",
];

fn subtemplate_lists(deps: &[ClassifiedDependency], url_for: &dyn Fn(&FlakeIdentifier) -> String) -> [DependencyListView; 9] {
	let mut seen = std::collections::HashSet::<&str>::new();
	let views = deps.iter()
		.filter(|d| seen.insert(d.dependency.name.as_str()))
		.map(|d| DependencyView {
			name: d.dependency.name.clone(),
			version: d.dependency.version.clone(),
			external: d.external,
			flake_url: if d.external { String::new() } else { url_for(&FlakeIdentifier::from(&d.dependency)) },
		})
		.collect::<Vec<_>>();

	let nixpkgs = views.iter().filter(|d| d.external).cloned().collect::<Vec<_>>();
	let flakes = views.iter().filter(|d| !d.external).cloned().collect::<Vec<_>>();
	let all = flakes.iter().chain(nixpkgs.iter()).cloned().collect::<Vec<_>>();

	let list = |items: &Vec<DependencyView>, format| DependencyListView { items: items.clone(), format };
	[
		list(&nixpkgs, DependencyFormat::Name),
		list(&flakes, DependencyFormat::Name),
		list(&all, DependencyFormat::Name),
		list(&nixpkgs, DependencyFormat::NixpkgsDeclaration),
		list(&flakes, DependencyFormat::FlakeDeclaration),
		list(&nixpkgs, DependencyFormat::AsParameterToPackageNix),
		list(&flakes, DependencyFormat::AsParameterToPackageNix),
		list(&all, DependencyFormat::Name),
		list(&nixpkgs, DependencyFormat::Overrides),
	]
}

/// Everything a template can refer to.
#[derive(Debug, Clone)]
pub struct RenderContext {
	pub flake: FlakeView,
	pub lists: HashMap<String, DependencyListView>,
}

impl RenderContext {
	/// # Parameters
	/// - `merged` - dependencies across all roles, already deduplicated by name.
	/// - `url_for` - where the flake of a dependency we build can be fetched from.
	pub fn new(flake: &FlakeDescriptor, merged: &[ClassifiedDependency], url_for: &dyn Fn(&FlakeIdentifier) -> String) -> Self {
		let mut lists = HashMap::<String, DependencyListView>::new();

		for role in DependencyRole::ALL {
			for (key, view) in SUBTEMPLATES.iter().zip(subtemplate_lists(flake.role(role), url_for)) {
				lists.insert(format!("{}_{}", role.attribute(), key), view);
			}
		}
		for (key, view) in SUBTEMPLATES.iter().zip(subtemplate_lists(merged, url_for)) {
			lists.insert(key.to_string(), view);
		}

		Self { flake: FlakeView::new(flake), lists }
	}

	/// Value of `key`, lists are joined using `indent` for continuation lines.
	pub fn lookup(&self, key: &str, indent: &str) -> Option<String> {
		self.flake.get(key).map(str::to_string)
			.or_else(|| self.lists.get(key).map(|l| l.render(indent)))
	}
}

/// Turns a template into text.
pub trait TemplateRenderer: Send + Sync {
	fn render(&self, template: &TemplateUnit, context: &RenderContext, recipe: &str) -> Result<String, RenderError>;
}

/// Replaces `{{ key }}` markers, failing on keys the context doesn't know.
#[derive(Debug, Clone)]
pub struct PlaceholderRenderer {
	pattern: regex::Regex,
}

impl PlaceholderRenderer {
	pub fn new() -> Result<Self, regex::Error> {
		Ok(Self { pattern: regex::Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}")? })
	}
}

impl TemplateRenderer for PlaceholderRenderer {
	fn render(&self, template: &TemplateUnit, context: &RenderContext, recipe: &str) -> Result<String, RenderError> {
		let mut out = String::with_capacity(template.contents.len());

		for (i, line) in template.contents.split('\n').enumerate() {
			if i > 0 {
				out.push('\n');
			}
			let indent = &line[..line.len() - line.trim_start_matches([' ', '\t']).len()];

			let mut last = 0;
			for captures in self.pattern.captures_iter(line) {
				let (Some(whole), Some(key)) = (captures.get(0), captures.get(1)) else { continue };
				let value = context.lookup(key.as_str(), indent).ok_or_else(|| RenderError::UnsupportedPlaceholder {
					placeholder: key.as_str().to_string(),
					template: template.folder.join(&template.path).display().to_string(),
					recipe: recipe.to_string(),
				})?;
				out.push_str(&line[last..whole.start()]);
				out.push_str(&value);
				last = whole.end();
			}
			out.push_str(&line[last..]);
		}

		Ok(out)
	}
}

/// Renders every template of `recipe`.
///
/// # Errors
/// - [`NoTemplates`](RenderError::NoTemplates) when the recipe has nothing to render.
/// - [`UnsupportedPlaceholder`](RenderError::UnsupportedPlaceholder) from the renderer.
pub fn render_recipe(recipe: &RecipeDescriptor, context: &RenderContext, renderer: &dyn TemplateRenderer) -> Result<Vec<RenderedTemplate>, RenderError> {
	if recipe.templates.is_empty() {
		return Err(RenderError::NoTemplates(recipe.name.clone()));
	}

	recipe.templates.iter()
		.map(|t| -> Result<RenderedTemplate, RenderError> {
			Ok(RenderedTemplate {
				folder: t.folder.clone(),
				path: t.path.clone(),
				contents: renderer.render(t, context, &recipe.name)?,
			})
		})
		.collect()
}

/// Writes rendered templates below `output_dir`, returning the paths written.
pub fn write_rendered(output_dir: impl AsRef<Path>, rendered: &[RenderedTemplate]) -> Result<Vec<PathBuf>, RenderError> {
	let output_dir = output_dir.as_ref();
	let mut written = Vec::<PathBuf>::new();
	for template in rendered {
		let destination = output_dir.join(template.relative_path());
		if let Some(parent) = destination.parent() {
			std::fs::create_dir_all(parent)?;
		}
		std::fs::write(&destination, &template.contents)?;
		written.push(destination);
	}
	Ok(written)
}
