use serde::{Serialize, Deserialize};

/// A generic enum to describe an inclusive range of versions.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub enum VersionBounds<T>
where T: std::cmp::PartialEq + std::cmp::Ord + std::clone::Clone,
{
	#[default] Any,
	Explicit(T),
	MinOnly(T),
	MaxOnly(T),
	MinMax(T, T),
}

impl<T> VersionBounds<T>
where T: std::cmp::PartialEq + std::cmp::Ord + std::clone::Clone,
{
	pub fn is_version_within(&self, other: &T) -> bool {
		match self {
			VersionBounds::Any => true,
			VersionBounds::Explicit(v) => other == v,
			VersionBounds::MinOnly(min) => other >= min,
			VersionBounds::MaxOnly(max) => other <= max,
			VersionBounds::MinMax(min, max) => min <= other && other <= max,
		}
	}

	/// Gets the intersection between the bounds, if no intersection exists returns `None`
	pub fn inner_join(&self, other: &Self) -> Option<Self> {
		use VersionBounds::*;

		match (self.clone(), other.clone()) {
			(Any, r) => Some(r),
			(l, Any) => Some(l),

			(Explicit(a), b) | (b, Explicit(a)) => b.is_version_within(&a).then_some(Explicit(a)),

			(MinOnly(a), MinOnly(b)) => Some(MinOnly(std::cmp::max(a, b))),
			(MaxOnly(a), MaxOnly(b)) => Some(MaxOnly(std::cmp::min(a, b))),

			(MinOnly(min), MaxOnly(max)) | (MaxOnly(max), MinOnly(min)) => Self::collapse(min, max),

			(MinOnly(a), MinMax(min, max)) | (MinMax(min, max), MinOnly(a)) => Self::collapse(std::cmp::max(a, min), max),
			(MaxOnly(a), MinMax(min, max)) | (MinMax(min, max), MaxOnly(a)) => Self::collapse(min, std::cmp::min(a, max)),

			(MinMax(a, b), MinMax(c, d)) => Self::collapse(std::cmp::max(a, c), std::cmp::min(b, d)),
		}
	}

	/// A range whose ends meet is a single version, one whose ends cross is empty.
	fn collapse(min: T, max: T) -> Option<Self> {
		match min.cmp(&max) {
			std::cmp::Ordering::Less => Some(VersionBounds::MinMax(min, max)),
			std::cmp::Ordering::Equal => Some(VersionBounds::Explicit(min)),
			std::cmp::Ordering::Greater => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test] fn any_contains_everything() { assert!(VersionBounds::<u32>::Any.is_version_within(&7)) }
	#[test] fn min_max_is_inclusive() { assert!(VersionBounds::MinMax(1, 3).is_version_within(&3)) }
	#[test] fn join_min_and_max() { assert_eq!(VersionBounds::MinOnly(2).inner_join(&VersionBounds::MaxOnly(5)), Some(VersionBounds::MinMax(2, 5))) }
	#[test] fn join_meeting_ends_is_explicit() { assert_eq!(VersionBounds::MinOnly(2).inner_join(&VersionBounds::MaxOnly(2)), Some(VersionBounds::Explicit(2))) }
	#[test] fn join_disjoint_is_none() { assert_eq!(VersionBounds::MinMax(1, 2).inner_join(&VersionBounds::MinMax(3, 4)), None) }
	#[test] fn join_max_narrows_range() { assert_eq!(VersionBounds::MaxOnly(3).inner_join(&VersionBounds::MinMax(1, 5)), Some(VersionBounds::MinMax(1, 3))) }
	#[test] fn join_max_below_range_is_none() { assert_eq!(VersionBounds::MaxOnly(0).inner_join(&VersionBounds::MinMax(1, 5)), None) }
	#[test] fn join_explicit_outside_is_none() { assert_eq!(VersionBounds::Explicit(9).inner_join(&VersionBounds::MinMax(1, 5)), None) }
}
