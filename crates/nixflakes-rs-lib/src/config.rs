//! Runtime configuration.
//!
//! The config is stored as JSON in the user's config directory and falls back
//! to XDG style defaults when missing.

use std::path::{Path, PathBuf};
use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
	flakes_dir: PathBuf,
	forensic_dir: PathBuf,
	recipes_dir: PathBuf,
	data_dir: PathBuf,
	git_program: String,
	nix_program: String,
}

fn home_dir() -> PathBuf {
	PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".to_string()))
}

fn base_data_dir() -> PathBuf {
	#[cfg(target_os = "windows")]
	let path = PathBuf::from(std::env::var("APPDATA").unwrap_or_else(|_| ".".to_string()));

	#[cfg(not(target_os = "windows"))]
	let path = if let Ok(e) = std::env::var("XDG_DATA_HOME") {
		PathBuf::from(e)
	} else {
		home_dir().join(".local/share")
	};

	path.join("nixflakes-rs")
}

fn base_cache_dir() -> PathBuf {
	#[cfg(target_os = "windows")]
	let path = PathBuf::from(std::env::var("APPDATA").unwrap_or_else(|_| ".".to_string()));

	#[cfg(not(target_os = "windows"))]
	let path = if let Ok(e) = std::env::var("XDG_CACHE_HOME") {
		PathBuf::from(e)
	} else {
		home_dir().join(".cache")
	};

	path.join("nixflakes-rs")
}

fn base_config_dir() -> PathBuf {
	#[cfg(target_os = "windows")]
	let path = PathBuf::from(std::env::var("APPDATA").unwrap_or_else(|_| ".".to_string()));

	#[cfg(not(target_os = "windows"))]
	let path = if let Ok(e) = std::env::var("XDG_CONFIG_HOME") {
		PathBuf::from(e)
	} else {
		home_dir().join(".config")
	};

	path.join("nixflakes-rs")
}

impl Default for Config {
	fn default() -> Self {
		let data = base_data_dir();
		Self {
			flakes_dir: data.join("flakes"),
			forensic_dir: base_cache_dir().join("forensic"),
			recipes_dir: data.join("recipes"),
			data_dir: data.join("packages"),
			git_program: "git".to_string(),
			nix_program: "nix".to_string(),
		}
	}
}

impl Config {
	/// Path of the config file on disk.
	pub fn config_path() -> PathBuf {
		base_config_dir().join("config.json")
	}

	/// Loads the config from the default location.
	///
	/// # Errors
	/// - [`IO`](crate::error::Error::IO) when opening or reading from the file.
	/// - [`SerdeJSON`](crate::error::Error::SerdeJSON) when deserializing the file.
	pub fn load_from_disk() -> crate::Result<Self> {
		Self::load_from_file(Self::config_path())
	}

	pub fn load_from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
		let file = std::fs::File::open(path)?;
		Ok(serde_json::from_reader(file)?)
	}

	/// Saves the config to the default location, creating parent directories as needed.
	///
	/// # Errors
	/// - [`IO`](crate::error::Error::IO) when creating the directory or file.
	/// - [`SerdeJSON`](crate::error::Error::SerdeJSON) when serializing.
	pub fn save_to_disk(&self) -> crate::Result<()> {
		self.save_to_file(Self::config_path())
	}

	pub fn save_to_file(&self, path: impl AsRef<Path>) -> crate::Result<()> {
		let path = path.as_ref();
		std::fs::create_dir_all(path.with_file_name(""))?;
		let file = std::fs::File::create(path)?;
		serde_json::to_writer_pretty(file, self)?;
		Ok(())
	}

	/// Builds a config rooted entirely inside `root`. Used by tests and throwaway runs.
	pub fn rooted_at(root: impl AsRef<Path>) -> Self {
		let root = root.as_ref();
		Self {
			flakes_dir: root.join("flakes"),
			forensic_dir: root.join("forensic"),
			recipes_dir: root.join("recipes"),
			data_dir: root.join("packages"),
			..Default::default()
		}
	}

	pub fn flakes_dir(&self) -> &Path {
		&self.flakes_dir
	}
	/// returns if the directory is valid or not.
	pub fn set_flakes_dir(&mut self, flakes_dir: PathBuf) -> bool {
		if flakes_dir.is_dir() {
			self.flakes_dir = flakes_dir;
			true
		} else {
			false
		}
	}

	pub fn forensic_dir(&self) -> &Path {
		&self.forensic_dir
	}
	/// returns if the directory is valid or not.
	pub fn set_forensic_dir(&mut self, forensic_dir: PathBuf) -> bool {
		if forensic_dir.is_dir() {
			self.forensic_dir = forensic_dir;
			true
		} else {
			false
		}
	}

	pub fn recipes_dir(&self) -> &Path {
		&self.recipes_dir
	}
	/// returns if the directory is valid or not.
	pub fn set_recipes_dir(&mut self, recipes_dir: PathBuf) -> bool {
		if recipes_dir.is_dir() {
			self.recipes_dir = recipes_dir;
			true
		} else {
			false
		}
	}

	pub fn data_dir(&self) -> &Path {
		&self.data_dir
	}
	/// returns if the directory is valid or not.
	pub fn set_data_dir(&mut self, data_dir: PathBuf) -> bool {
		if data_dir.is_dir() {
			self.data_dir = data_dir;
			true
		} else {
			false
		}
	}

	pub fn git_program(&self) -> &str {
		&self.git_program
	}
	pub fn set_git_program(&mut self, git_program: impl Into<String>) {
		self.git_program = git_program.into();
	}

	pub fn nix_program(&self) -> &str {
		&self.nix_program
	}
	pub fn set_nix_program(&mut self, nix_program: impl Into<String>) {
		self.nix_program = nix_program.into();
	}
}
