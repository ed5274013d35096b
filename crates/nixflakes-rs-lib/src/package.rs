//! Upstream Python package model.
//!
//! A [`PackageShape`] is what the package resolver hands back once it knows
//! about a package. It is never mutated after that.

pub mod version;
pub mod version_bounds;
pub mod version_spec;
pub mod license;

use serde::{Serialize, Deserialize};

pub use version::PackageVersion;
pub use version_spec::VersionSpec;
pub use license::License;

/// A dependency of a package, the name and the version it was resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
	pub name: String,
	pub version: String,
}

impl Dependency {
	pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
		Self { name: name.into(), version: version.into() }
	}
}

impl std::fmt::Display for Dependency {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}-{}", self.name, self.version)
	}
}

/// The five roles a dependency can play when building a Python package with nix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DependencyRole {
	NativeBuild,
	PropagatedBuild,
	Build,
	Check,
	OptionalBuild,
}

impl DependencyRole {
	pub const ALL: [DependencyRole; 5] = [
		DependencyRole::NativeBuild,
		DependencyRole::PropagatedBuild,
		DependencyRole::Build,
		DependencyRole::Check,
		DependencyRole::OptionalBuild,
	];

	/// The nix attribute name, also used as the prefix of template placeholders.
	pub fn attribute(&self) -> &'static str {
		match self {
			DependencyRole::NativeBuild => "native_build_inputs",
			DependencyRole::PropagatedBuild => "propagated_build_inputs",
			DependencyRole::Build => "build_inputs",
			DependencyRole::Check => "check_inputs",
			DependencyRole::OptionalBuild => "optional_build_inputs",
		}
	}
}

/// Per role dependency lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleLists<T> {
	#[serde(default = "Vec::new")]
	pub native_build: Vec<T>,
	#[serde(default = "Vec::new")]
	pub propagated_build: Vec<T>,
	#[serde(default = "Vec::new")]
	pub build: Vec<T>,
	#[serde(default = "Vec::new")]
	pub check: Vec<T>,
	#[serde(default = "Vec::new")]
	pub optional_build: Vec<T>,
}

impl<T> Default for RoleLists<T> {
	fn default() -> Self {
		Self {
			native_build: Vec::new(),
			propagated_build: Vec::new(),
			build: Vec::new(),
			check: Vec::new(),
			optional_build: Vec::new(),
		}
	}
}

impl<T> RoleLists<T> {
	pub fn get(&self, role: DependencyRole) -> &[T] {
		match role {
			DependencyRole::NativeBuild => &self.native_build,
			DependencyRole::PropagatedBuild => &self.propagated_build,
			DependencyRole::Build => &self.build,
			DependencyRole::Check => &self.check,
			DependencyRole::OptionalBuild => &self.optional_build,
		}
	}

	pub fn get_mut(&mut self, role: DependencyRole) -> &mut Vec<T> {
		match role {
			DependencyRole::NativeBuild => &mut self.native_build,
			DependencyRole::PropagatedBuild => &mut self.propagated_build,
			DependencyRole::Build => &mut self.build,
			DependencyRole::Check => &mut self.check,
			DependencyRole::OptionalBuild => &mut self.optional_build,
		}
	}

	/// Iterates every entry along with the role it appears under.
	pub fn iter(&self) -> impl Iterator<Item = (DependencyRole, &T)> {
		DependencyRole::ALL.into_iter().flat_map(move |role| self.get(role).iter().map(move |t| (role, t)))
	}

	pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> RoleLists<U> {
		let mut out = RoleLists::<U>::default();
		for role in DependencyRole::ALL {
			*out.get_mut(role) = self.get(role).iter().map(&mut f).collect();
		}
		out
	}
}

/// Where the package's source lives when it is fetched from a git forge instead of PyPI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRepo {
	pub url: String,
	pub rev: String,
}

impl GitRepo {
	/// Splits `https://github.com/<owner>/<name>[.git]` into its owner and name.
	pub fn owner_and_name(&self) -> Option<(&str, &str)> {
		let path = self.url.trim_end_matches('/').trim_end_matches(".git");
		let (rest, name) = path.rsplit_once('/')?;
		let (_, owner) = rest.rsplit_once('/')?;
		(!owner.is_empty() && !name.is_empty() && !owner.contains(':')).then_some((owner, name))
	}
}

/// A resolved upstream package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageShape {
	pub name: String,
	pub version: String,
	/// Build system tag, compared against recipe type tags.
	pub package_type: String,
	#[serde(default)]
	pub description: String,
	#[serde(default)]
	pub license: String,
	#[serde(default)]
	pub source_hash: String,
	#[serde(default)]
	pub git_repo: Option<GitRepo>,
	#[serde(default)]
	pub dependencies: RoleLists<Dependency>,
}

impl PackageShape {
	pub fn new(name: impl Into<String>, version: impl Into<String>, package_type: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			version: version.into(),
			package_type: package_type.into(),
			description: String::new(),
			license: String::new(),
			source_hash: String::new(),
			git_repo: None,
			dependencies: RoleLists::default(),
		}
	}

	/// Parsed version, `None` when upstream uses a scheme we can't order.
	pub fn parsed_version(&self) -> Option<PackageVersion> {
		PackageVersion::new(&self.version).ok()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn owner_and_name_from_github_url() {
		let repo = GitRepo { url: "https://github.com/psf/requests.git".to_string(), rev: "v2.31.0".to_string() };
		assert_eq!(repo.owner_and_name(), Some(("psf", "requests")));
	}

	#[test]
	fn owner_and_name_needs_two_segments() {
		let repo = GitRepo { url: "https://example.org".to_string(), rev: String::new() };
		assert_eq!(repo.owner_and_name(), None);
	}

	#[test]
	fn role_iteration_follows_role_order() {
		let mut lists = RoleLists::<u8>::default();
		lists.check.push(4);
		lists.native_build.push(1);
		let roles: Vec<_> = lists.iter().map(|(r, _)| r).collect();
		assert_eq!(roles, vec![DependencyRole::NativeBuild, DependencyRole::Check]);
	}
}
