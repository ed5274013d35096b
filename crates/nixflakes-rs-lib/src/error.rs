//! Library error type.

pub type Result<T> = std::result::Result<T, Error>;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("JSON error: {0}")]
	SerdeJSON(#[from] serde_json::Error),
	#[error("TOML error: {0}")]
	Toml(#[from] toml::de::Error),
	#[error("error walking directory: {0}")]
	WalkDir(#[from] walkdir::Error),
	#[error("copy error: {0}")]
	Copy(#[from] fs_extra::error::Error),
	#[error("regex error: {0}")]
	Regex(#[from] regex::Error),
	#[error("parsing error: {0}")]
	Parse(String),
	#[error("malformed recipes: {}", describe_failures(.0))]
	MalformedRecipes(Vec<(String, crate::recipe::declaration::DeclarationError)>),
	#[error("render error: {0}")]
	Render(#[from] crate::recipe::render::RenderError),
	#[error("tool error: {0}")]
	Tool(#[from] crate::build::tools::ToolError),
	#[error("registry error: {0}")]
	Registry(#[from] crate::in_progress::RegistryError),
	#[error("already exists")]
	AlreadyExists,
}

fn describe_failures(failures: &[(String, crate::recipe::declaration::DeclarationError)]) -> String {
	failures.iter()
		.map(|(recipe, e)| format!("`{}` ({})", recipe, e))
		.collect::<Vec<_>>()
		.join(", ")
}
