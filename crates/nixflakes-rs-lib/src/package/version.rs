use serde::{Serialize, Deserialize};

/// The version of a Python package.
///
/// # Format
/// Versions follow a loose `[epoch!]release[suffix]` format.
/// - `epoch` is rarely used and defaults to zero.
/// - `release` is a dotted list of numbers, `2.31.0`. Trailing zeros are not significant.
/// - `suffix` is anything after the release, such as `rc1`, `.post2` or `.dev0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageVersion {
	epoch: u32,
	release: Vec<u64>,
	suffix: String,
	raw: String,
}

impl PackageVersion {
	/// # Errors
	/// - [`Parse`](crate::error::Error::Parse) when the version has no numeric release part.
	pub fn new(version: impl AsRef<str>) -> crate::Result<Self> {
		let raw = version.as_ref().trim();
		let unprefixed = raw.strip_prefix('v').unwrap_or(raw);

		let (epoch, rest) = match unprefixed.split_once('!') {
			Some((e, rest)) => (
				e.parse::<u32>().map_err(|_| crate::Error::Parse(format!("invalid epoch in version `{}`", raw)))?,
				rest,
			),
			None => (0, unprefixed),
		};

		let mut release = Vec::<u64>::new();
		let mut remainder = rest;
		loop {
			let digits = remainder.find(|c: char| !c.is_ascii_digit()).unwrap_or(remainder.len());
			if digits == 0 {
				break;
			}
			let component = remainder[..digits].parse::<u64>()
				.map_err(|_| crate::Error::Parse(format!("release component too large in `{}`", raw)))?;
			release.push(component);
			remainder = &remainder[digits..];

			/* Only continue when a dot is followed by another number, `1.0.post1` keeps `.post1` as the suffix */
			match remainder.strip_prefix('.') {
				Some(next) if next.starts_with(|c: char| c.is_ascii_digit()) => remainder = next,
				_ => break,
			}
		}

		if release.is_empty() {
			return Err(crate::Error::Parse(format!("version `{}` has no release number", raw)));
		}

		Ok(PackageVersion {
			epoch,
			release,
			suffix: remainder.to_string(),
			raw: raw.to_string(),
		})
	}

	pub fn release(&self) -> &[u64] {
		&self.release
	}

	pub fn epoch(&self) -> u32 {
		self.epoch
	}

	pub fn as_str(&self) -> &str {
		&self.raw
	}

	/// Release components without trailing zeros, `2.0.0` and `2` are the same version.
	fn significant_release(&self) -> &[u64] {
		let mut end = self.release.len();
		while end > 1 && self.release[end - 1] == 0 {
			end -= 1;
		}
		&self.release[..end]
	}

	/// Ranks the suffix so pre-releases sort before the final release and post releases after it.
	fn suffix_rank(&self) -> u8 {
		let s = self.suffix.trim_start_matches(['.', '-', '_']).to_ascii_lowercase();
		if s.is_empty() {
			3
		} else if s.starts_with("dev") {
			0
		} else if s.starts_with("post") || s.starts_with('r') && !s.starts_with("rc") || s.starts_with(|c: char| c.is_ascii_digit()) {
			4
		} else if s.starts_with('a') || s.starts_with('b') || s.starts_with('c') || s.starts_with("rc") || s.starts_with("pre") {
			1
		} else {
			2
		}
	}
}

/// Compares two suffixes piecewise, runs of digits numerically and everything else lexically.
fn compare_suffix(lhs: &str, rhs: &str) -> std::cmp::Ordering {
	fn next_token(s: &str) -> (&str, &str) {
		let numeric = s.starts_with(|c: char| c.is_ascii_digit());
		let end = s.find(|c: char| c.is_ascii_digit() != numeric).unwrap_or(s.len());
		s.split_at(end)
	}

	let (mut lhs, mut rhs) = (lhs, rhs);
	while !lhs.is_empty() && !rhs.is_empty() {
		let (l, lrest) = next_token(lhs);
		let (r, rrest) = next_token(rhs);

		let ord = match (l.parse::<u64>(), r.parse::<u64>()) {
			(Ok(a), Ok(b)) => a.cmp(&b),
			_ => l.cmp(r),
		};
		if ord != std::cmp::Ordering::Equal {
			return ord;
		}

		lhs = lrest;
		rhs = rrest;
	}
	lhs.len().cmp(&rhs.len())
}

impl TryFrom<String> for PackageVersion {
	type Error = crate::Error;
	fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<PackageVersion> for String {
	fn from(value: PackageVersion) -> Self { value.raw }
}

impl std::str::FromStr for PackageVersion {
	type Err = crate::Error;
	fn from_str(s: &str) -> Result<Self, Self::Err> { Self::new(s) }
}

impl Ord for PackageVersion {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.epoch.cmp(&other.epoch)
			.then_with(|| {
				let len = std::cmp::max(self.release.len(), other.release.len());
				(0..len)
					.map(|i| self.release.get(i).copied().unwrap_or(0).cmp(&other.release.get(i).copied().unwrap_or(0)))
					.find(|o| *o != std::cmp::Ordering::Equal)
					.unwrap_or(std::cmp::Ordering::Equal)
			})
			.then_with(|| self.suffix_rank().cmp(&other.suffix_rank()))
			.then_with(|| compare_suffix(&self.suffix, &other.suffix))
	}
}

impl PartialOrd for PackageVersion {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl PartialEq for PackageVersion {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other) == std::cmp::Ordering::Equal
	}
}

impl Eq for PackageVersion {}

impl std::hash::Hash for PackageVersion {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		self.epoch.hash(state);
		self.significant_release().hash(state);
		self.suffix.hash(state);
	}
}

impl std::fmt::Display for PackageVersion {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.raw)
	}
}

pub type PackageVersionBounds = super::version_bounds::VersionBounds<PackageVersion>;
