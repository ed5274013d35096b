//! Flake identity and the fully resolved flake descriptor.

use serde::{Serialize, Deserialize};

use crate::package::{Dependency, DependencyRole, PackageShape, RoleLists};

/// Identifies a flake, one per package name and version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlakeIdentifier {
	pub name: String,
	pub version: String,
}

impl FlakeIdentifier {
	pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
		Self { name: name.into(), version: version.into() }
	}

	/// Name of the folder holding this flake's files.
	pub fn folder_name(&self) -> String {
		format!("{}-{}", self.name, self.version)
	}
}

impl std::fmt::Display for FlakeIdentifier {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}-{}", self.name, self.version)
	}
}

impl From<&Dependency> for FlakeIdentifier {
	fn from(value: &Dependency) -> Self {
		Self::new(&value.name, &value.version)
	}
}

impl From<&PackageShape> for FlakeIdentifier {
	fn from(value: &PackageShape) -> Self {
		Self::new(&value.name, &value.version)
	}
}

/// A dependency after classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedDependency {
	pub dependency: Dependency,
	/// Already satisfied outside of our flakes, nixpkgs provides it.
	pub external: bool,
}

/// A flake whose package and dependencies are fully resolved.
///
/// Identity and role lists are fixed at construction, there are no setters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlakeDescriptor {
	identifier: FlakeIdentifier,
	package: PackageShape,
	dependencies: RoleLists<ClassifiedDependency>,
}

impl FlakeDescriptor {
	pub fn new(package: PackageShape, dependencies: RoleLists<ClassifiedDependency>) -> Self {
		Self {
			identifier: FlakeIdentifier::from(&package),
			package,
			dependencies,
		}
	}

	pub fn identifier(&self) -> &FlakeIdentifier {
		&self.identifier
	}

	pub fn name(&self) -> &str {
		&self.identifier.name
	}

	pub fn version(&self) -> &str {
		&self.identifier.version
	}

	pub fn package(&self) -> &PackageShape {
		&self.package
	}

	pub fn dependencies(&self) -> &RoleLists<ClassifiedDependency> {
		&self.dependencies
	}

	pub fn role(&self, role: DependencyRole) -> &[ClassifiedDependency] {
		self.dependencies.get(role)
	}
}
