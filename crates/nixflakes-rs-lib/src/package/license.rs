use serde::{Serialize, Deserialize};

/// A license as understood by nixpkgs' `lib.licenses`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum License {
	Mit,
	Asl20,
	Bsd2,
	Bsd3,
	Gpl2Only,
	Gpl3Only,
	Lgpl3Only,
	Mpl20,
	Isc,
	Psfl,
	/// Anything we can't map, nix treats it as not redistributable.
	#[default] Unfree,
}

impl License {
	/// Maps the free-form license string found in upstream package metadata.
	pub fn from_upstream(license: &str) -> Self {
		let normalized: String = license.trim().to_ascii_lowercase().chars().filter(|c| !matches!(c, ' ' | '-' | '_')).collect();

		match normalized.as_str() {
			"mit" | "mitlicense" | "expat" => License::Mit,
			"apache2.0" | "apache2" | "apachelicense2.0" | "apachesoftwarelicense" | "asl2.0" => License::Asl20,
			"bsd2clause" | "simplifiedbsd" => License::Bsd2,
			"bsd" | "bsd3clause" | "bsdlicense" | "newbsd" => License::Bsd3,
			"gplv2" | "gpl2.0" | "gpl2.0only" => License::Gpl2Only,
			"gplv3" | "gpl3.0" | "gpl3.0only" => License::Gpl3Only,
			"lgplv3" | "lgpl3.0" | "lgpl3.0only" => License::Lgpl3Only,
			"mpl2.0" | "mozillapubliclicense2.0" => License::Mpl20,
			"isc" | "isclicense" => License::Isc,
			"psf" | "psfl" | "python" | "pythonsoftwarefoundationlicense" => License::Psfl,
			_ => {
				log::debug!("Unrecognized license `{}`, treating as unfree", license);
				License::Unfree
			}
		}
	}

	/// The attribute name under `lib.licenses`.
	pub fn nix(&self) -> &'static str {
		match self {
			License::Mit => "mit",
			License::Asl20 => "asl20",
			License::Bsd2 => "bsd2",
			License::Bsd3 => "bsd3",
			License::Gpl2Only => "gpl2Only",
			License::Gpl3Only => "gpl3Only",
			License::Lgpl3Only => "lgpl3Only",
			License::Mpl20 => "mpl20",
			License::Isc => "isc",
			License::Psfl => "psfl",
			License::Unfree => "unfree",
		}
	}
}
