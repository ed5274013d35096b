//! Splits a package's dependencies into those nixpkgs already provides and
//! those we need to build flakes for.
//!
//! Classification never waits for anything to be built. It reports which
//! dependencies have no flake yet and aren't being worked on, the orchestrator
//! requests those and waits for them before the package's flake is rendered.

use std::collections::HashMap;

use crate::flake::{ClassifiedDependency, FlakeIdentifier};
use crate::package::{Dependency, DependencyRole, PackageShape, RoleLists};
use crate::store::FlakeRepository;
use crate::upstream::NixpkgsIndex;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
	pub roles: RoleLists<ClassifiedDependency>,
	/// Dependencies with no stored flake and nothing in progress, in first seen order.
	pub sub_requests: Vec<FlakeIdentifier>,
	/// Dependencies some other request was already producing when classified.
	pub in_progress: Vec<FlakeIdentifier>,
}

impl Classification {
	/// `(external, to_build)` for one role.
	pub fn partition(&self, role: DependencyRole) -> (Vec<&Dependency>, Vec<&Dependency>) {
		let (external, to_build): (Vec<_>, Vec<_>) = self.roles.get(role).iter().partition(|d| d.external);
		(
			external.into_iter().map(|d| &d.dependency).collect(),
			to_build.into_iter().map(|d| &d.dependency).collect(),
		)
	}

	/// Every dependency that needs a flake of its own, once per name.
	///
	/// When a name shows up in several roles the first occurrence decides the version.
	pub fn to_build(&self) -> Vec<&Dependency> {
		let mut seen = std::collections::HashSet::<&str>::new();
		self.roles.iter()
			.filter(|(_, d)| !d.external)
			.map(|(_, d)| &d.dependency)
			.filter(|d| seen.insert(d.name.as_str()))
			.collect()
	}

	/// Dependencies that need a flake and were already stored when classified.
	pub fn stored(&self) -> Vec<FlakeIdentifier> {
		self.to_build().into_iter()
			.map(FlakeIdentifier::from)
			.filter(|id| !self.sub_requests.contains(id) && !self.in_progress.contains(id))
			.collect()
	}
}

/// Classifies one role list, keeping the first occurrence of each name.
pub fn classify_role(dependencies: &[Dependency], index: &dyn NixpkgsIndex) -> Vec<ClassifiedDependency> {
	let mut seen = std::collections::HashSet::<&str>::new();
	dependencies.iter()
		.filter(|d| seen.insert(d.name.as_str()))
		.map(|d| ClassifiedDependency { dependency: d.clone(), external: index.contains(d) })
		.collect()
}

/// Classifies every role of `package`.
///
/// # Parameters
/// - `in_progress` - whether a flake is currently being produced.
/// # Errors
/// Errors from the flake store lookup.
pub async fn classify(
	package: &PackageShape,
	index: &dyn NixpkgsIndex,
	store: &dyn FlakeRepository,
	in_progress: &(dyn Fn(&FlakeIdentifier) -> bool + Send + Sync),
) -> crate::Result<Classification> {
	let mut classification = Classification::default();
	for role in DependencyRole::ALL {
		*classification.roles.get_mut(role) = classify_role(package.dependencies.get(role), index);
	}

	let to_build = classification.to_build().into_iter().cloned().collect::<Vec<_>>();
	for dependency in to_build {
		let id = FlakeIdentifier::from(&dependency);
		if in_progress(&id) {
			log::debug!("{} needs {} which is already in progress", package.name, id);
			classification.in_progress.push(id);
		} else if store.find_by_name_and_version(&id).await?.is_some() {
			log::debug!("{} needs {} which is already available", package.name, id);
		} else {
			log::debug!("{} needs {} which must be built", package.name, id);
			classification.sub_requests.push(id);
		}
	}

	Ok(classification)
}

fn merged_entries(roles: &RoleLists<ClassifiedDependency>) -> Vec<&ClassifiedDependency> {
	let mut order = Vec::<&str>::new();
	let mut by_name = HashMap::<&str, &ClassifiedDependency>::new();
	for (_, dependency) in roles.iter() {
		let name = dependency.dependency.name.as_str();
		match by_name.get(name) {
			None => {
				order.push(name);
				by_name.insert(name, dependency);
			},
			Some(existing) if !existing.external && dependency.external => {
				by_name.insert(name, dependency);
			},
			Some(_) => {},
		}
	}
	order.into_iter().filter_map(|n| by_name.get(n).copied()).collect()
}

/// Combines all roles into one list, one entry per name.
///
/// A name counts as external if any of its occurrences is.
pub fn merged_declaration(roles: &RoleLists<ClassifiedDependency>) -> Vec<ClassifiedDependency> {
	merged_entries(roles).into_iter().cloned().collect()
}
