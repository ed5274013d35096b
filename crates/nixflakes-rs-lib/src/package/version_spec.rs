//! Version specifiers as written in recipe declarations.
//!
//! | Text                  | Meaning                                   |
//! |-----------------------|-------------------------------------------|
//! | `*`, `any`            | any version                               |
//! | `==2.31.0`            | exactly that version                      |
//! | `>=2.0`, `<=3.0`      | inclusive bounds, comma separated to join |
//! | `~=2.31`, `^2.31`, `2.31` | compatible release                    |
//!
//! A compatible release accepts any version at or above the given one that
//! keeps every release component except the last. `2.31.0` accepts `2.31.7`
//! but not `2.32.0`, and `2.31` accepts `2.40` but not `3.0`.

use super::version::{PackageVersion, PackageVersionBounds};
use super::version_bounds::VersionBounds;

#[derive(Debug, Clone, PartialEq)]
pub enum VersionSpec {
	Bounds(PackageVersionBounds),
	Compatible(PackageVersion),
}

impl VersionSpec {
	/// # Errors
	/// - [`Parse`](crate::error::Error::Parse) when a version in the spec can't be read or the bounds don't intersect.
	pub fn parse(spec: impl AsRef<str>) -> crate::Result<Self> {
		let spec = spec.as_ref().trim();

		if spec.is_empty() {
			return Err(crate::Error::Parse("empty version spec".to_string()));
		}
		if spec == "*" || spec.eq_ignore_ascii_case("any") {
			return Ok(VersionSpec::Bounds(VersionBounds::Any));
		}
		if let Some(v) = spec.strip_prefix("~=").or_else(|| spec.strip_prefix('^')) {
			return Ok(VersionSpec::Compatible(PackageVersion::new(v)?));
		}
		if spec.starts_with(|c: char| c.is_ascii_digit() || c == 'v') {
			return Ok(VersionSpec::Compatible(PackageVersion::new(spec)?));
		}

		let mut bounds = PackageVersionBounds::Any;
		for clause in spec.split(',').map(str::trim).filter(|c| !c.is_empty()) {
			let clause_bounds = if let Some(v) = clause.strip_prefix("==") {
				VersionBounds::Explicit(PackageVersion::new(v)?)
			} else if let Some(v) = clause.strip_prefix(">=") {
				VersionBounds::MinOnly(PackageVersion::new(v)?)
			} else if let Some(v) = clause.strip_prefix("<=") {
				VersionBounds::MaxOnly(PackageVersion::new(v)?)
			} else {
				return Err(crate::Error::Parse(format!("unsupported version clause `{}`", clause)));
			};

			bounds = bounds.inner_join(&clause_bounds)
				.ok_or_else(|| crate::Error::Parse(format!("version spec `{}` matches no version", spec)))?;
		}

		Ok(VersionSpec::Bounds(bounds))
	}

	/// Checks whether `version` satisfies this spec.
	pub fn is_compatible(&self, version: &PackageVersion) -> bool {
		match self {
			VersionSpec::Bounds(bounds) => bounds.is_version_within(version),
			VersionSpec::Compatible(base) => {
				if version < base || version.epoch() != base.epoch() {
					return false;
				}
				let fixed = base.release().len().saturating_sub(1).max(1);
				(0..fixed).all(|i| base.release().get(i).copied().unwrap_or(0) == version.release().get(i).copied().unwrap_or(0))
			},
		}
	}
}

/// The version text a spec pins exactly, without the leading `==`.
pub fn exact_version_text(spec: &str) -> &str {
	let spec = spec.trim();
	spec.strip_prefix("==").map(str::trim).unwrap_or(spec)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn compatible(spec: &str, version: &str) -> bool {
		VersionSpec::parse(spec).unwrap().is_compatible(&PackageVersion::new(version).unwrap())
	}

	#[test] fn bare_version_accepts_patch_bump() { assert!(compatible("2.31.0", "2.31.7")) }
	#[test] fn bare_version_rejects_minor_bump() { assert!(!compatible("2.31.0", "2.32.0")) }
	#[test] fn two_part_version_accepts_minor_bump() { assert!(compatible("~=2.31", "2.40")) }
	#[test] fn two_part_version_rejects_major_bump() { assert!(!compatible("^2.31", "3.0")) }
	#[test] fn compatible_rejects_older() { assert!(!compatible("2.31.2", "2.31.1")) }
	#[test] fn single_component_keeps_major() { assert!(compatible("2", "2.9") && !compatible("2", "3.0")) }
	#[test] fn star_accepts_anything() { assert!(compatible("*", "0.0.1")) }
	#[test] fn exact_only_accepts_equal() { assert!(compatible("==1.0", "1.0.0") && !compatible("==1.0", "1.0.1")) }
	#[test] fn bounds_are_joined() { assert!(compatible(">=1.0, <=2.0", "1.5") && !compatible(">=1.0, <=2.0", "2.1")) }
	#[test] fn disjoint_bounds_fail_to_parse() { assert!(VersionSpec::parse(">=3.0,<=2.0").is_err()) }
	#[test] fn unknown_operator_fails_to_parse() { assert!(VersionSpec::parse("!=3.0").is_err()) }
	#[test] fn exact_text_strips_operator() { assert_eq!(exact_version_text("== 2.31.0"), "2.31.0") }
}
